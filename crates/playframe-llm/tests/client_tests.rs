#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use playframe_core::{PlayError, Role};
    use playframe_llm::mock::{MockProvider, MockResponse};
    use playframe_llm::{ClientRegistry, ClientSettings};
    use tokio_util::sync::CancellationToken;

    fn registry_with(default: MockProvider, weather: MockProvider) -> ClientRegistry {
        let mut registry = ClientRegistry::new("default");
        registry.register("default", Arc::new(default), ClientSettings::new("main-model"));
        registry.register("weather", Arc::new(weather), ClientSettings::new("small-model"));
        registry
    }

    // ── Session routing ────────────────────────────────────────

    #[tokio::test]
    async fn test_session_runs_on_aliased_client() {
        let weather = MockProvider::new("weather").with_response("from weather client");
        let recorded = weather.recorded_requests();
        let registry = registry_with(MockProvider::new("main"), weather);

        let mut chat = registry.create_session(Some("weather")).unwrap();
        chat.add_user_message("hi");
        let resp = chat.execute(&CancellationToken::new()).await.unwrap();

        assert_eq!(resp.message.text_content(), "from weather client");
        assert_eq!(recorded.lock()[0].model, "small-model");
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_transcripts() {
        let main = MockProvider::new("main")
            .with_response("one")
            .with_response("two");
        let registry = registry_with(main, MockProvider::new("weather"));

        let mut first = registry.create_session(None).unwrap();
        first.add_user_message("a");
        first.execute(&CancellationToken::new()).await.unwrap();

        let second = registry.create_session(None).unwrap();
        assert_eq!(first.messages().len(), 2);
        assert!(second.messages().is_empty());
        assert_eq!(first.messages()[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let main = MockProvider::new("main").with_mock_response(MockResponse::error("HTTP 500"));
        let registry = registry_with(main, MockProvider::new("weather"));
        let mut chat = registry.create_session(None).unwrap();
        let err = chat.execute(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PlayError::LlmProvider(_)));
    }

    #[tokio::test]
    async fn test_health_check_all_clients() {
        let registry = registry_with(MockProvider::new("main"), MockProvider::new("weather"));
        let results = registry.health_check().await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
    }
}
