#[cfg(test)]
mod tests {
    use playframe_config::ConfigLoader;
    use playframe_config::schema::*;
    use std::io::Write;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_play_config_defaults() {
        let config = PlayConfig::default();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.max_tokens, 4096);
        assert!(config.llm.clients.is_empty());
        assert!(config.scenes.is_empty());
    }

    #[test]
    fn test_orchestration_config_defaults() {
        let config = OrchestrationConfig::default();
        assert_eq!(config.planner, PlannerMode::None);
        assert_eq!(config.director, DirectorMode::None);
        assert_eq!(config.max_tool_depth, 8);
        assert_eq!(config.max_passes, 3);
        assert_eq!(config.summarization_threshold, 50);
        assert_eq!(config.http_timeout_secs, 30);
    }

    #[test]
    fn test_cache_config_defaults() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.expiration_secs, 3600);
    }

    #[test]
    fn test_logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "pretty");
    }

    #[test]
    fn test_defaults_validate_cleanly() {
        let warnings = PlayConfig::default().validate().unwrap();
        assert!(warnings.is_empty());
    }

    // ── TOML parsing ───────────────────────────────────────────

    #[test]
    fn test_partial_toml_applies_defaults() {
        let config: PlayConfig = toml::from_str(
            r#"
[orchestration]
planner = "schema"
"#,
        )
        .unwrap();
        assert_eq!(config.orchestration.planner, PlannerMode::Schema);
        assert_eq!(config.orchestration.max_passes, 3);
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn test_scene_config_deserialize() {
        let config: PlayConfig = toml::from_str(
            r#"
[llm.clients.fast]
model = "gpt-4o-mini"
temperature = 0.0

[http_clients.weather]
base_url = "https://weather.example.com"
headers = { "x-api-key" = "secret" }

[[scenes]]
name = "Weather"
description = "Current conditions for a city"
client = "fast"
http_client = "weather"
api_filters = ["/v1/current"]

[[scenes.endpoints]]
name = "current"
description = "Current weather"
method = "GET"
path = "/v1/current/{city}"
params = [
  { name = "city", location = "path", description = "City name" },
  { name = "units", required = false },
]
"#,
        )
        .unwrap();

        assert_eq!(config.llm.clients["fast"].temperature, Some(0.0));
        assert_eq!(config.http_clients["weather"].headers["x-api-key"], "secret");
        let scene = &config.scenes[0];
        assert_eq!(scene.client.as_deref(), Some("fast"));
        assert_eq!(scene.endpoints[0].path, "/v1/current/{city}");
        let params = &scene.endpoints[0].params;
        assert_eq!(params[0].location, "path");
        assert!(params[0].required);
        assert_eq!(params[1].location, "query");
        assert_eq!(params[1].param_type, "string");
        assert!(!params[1].required);
        assert!(config.validate().is_ok());
    }

    // ── Validation ─────────────────────────────────────────────

    #[test]
    fn test_empty_model_is_error() {
        let mut config = PlayConfig::default();
        config.llm.model = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.contains("llm.model"));
        assert!(err.starts_with("Configuration errors:"));
    }

    #[test]
    fn test_temperature_out_of_range_is_error() {
        let mut config = PlayConfig::default();
        config.llm.temperature = 3.5;
        assert!(config.validate().unwrap_err().contains("llm.temperature"));
    }

    #[test]
    fn test_zero_depth_and_passes_are_errors() {
        let mut config = PlayConfig::default();
        config.orchestration.max_tool_depth = 0;
        config.orchestration.max_passes = 0;
        let err = config.validate().unwrap_err();
        assert!(err.contains("max_tool_depth"));
        assert!(err.contains("max_passes"));
    }

    #[test]
    fn test_duplicate_scene_is_error() {
        let mut config = PlayConfig::default();
        for _ in 0..2 {
            config.scenes.push(SceneConfig {
                name: "Weather".into(),
                ..Default::default()
            });
        }
        assert!(config.validate().unwrap_err().contains("duplicate scene"));
    }

    #[test]
    fn test_missing_http_client_is_error() {
        let mut config = PlayConfig::default();
        config.scenes.push(SceneConfig {
            name: "Weather".into(),
            http_client: Some("nowhere".into()),
            ..Default::default()
        });
        assert!(config.validate().unwrap_err().contains("unknown http client"));
    }

    #[test]
    fn test_unknown_client_alias_is_warning() {
        let mut config = PlayConfig::default();
        config.scenes.push(SceneConfig {
            name: "Weather".into(),
            client: Some("ghost".into()),
            ..Default::default()
        });
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, WarningSeverity::Warning);
        assert!(warnings[0].to_string().contains("ghost"));
    }

    #[test]
    fn test_unknown_log_format_is_warning() {
        let mut config = PlayConfig::default();
        config.logging.format = "xml".into();
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.field == "logging.format"));
    }

    // ── ConfigLoader tests ─────────────────────────────────────

    #[test]
    fn test_config_loader_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("playframe.toml");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(
            f,
            r#"
[llm]
provider = "mock"
max_tokens = 1024

[orchestration]
director = "llm"
max_passes = 2

[cache]
enabled = false
"#
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let config = loader.get();
        assert_eq!(config.llm.provider, "mock");
        assert_eq!(config.llm.max_tokens, 1024);
        assert_eq!(config.orchestration.director, DirectorMode::Llm);
        assert_eq!(config.orchestration.max_passes, 2);
        assert!(!config.cache.enabled);
        assert_eq!(loader.path(), config_path.as_path());
    }

    #[test]
    fn test_config_loader_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("playframe.toml");
        std::fs::write(&config_path, "[orchestration]\nmax_tool_depth = 0\n").unwrap();
        assert!(ConfigLoader::load(Some(config_path.as_path())).is_err());
    }

    #[test]
    fn test_config_loader_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("playframe.toml");
        std::fs::write(&config_path, "[llm\nmodel = ").unwrap();
        let err = ConfigLoader::load(Some(config_path.as_path())).err().unwrap();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn test_config_loader_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("playframe.toml");

        std::fs::write(&config_path, "[cache]\nexpiration_secs = 10\n").unwrap();
        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        assert_eq!(loader.get().cache.expiration_secs, 10);

        std::fs::write(&config_path, "[cache]\nexpiration_secs = 20\n").unwrap();
        loader.reload().unwrap();
        assert_eq!(loader.get().cache.expiration_secs, 20);

        // An invalid edit keeps the previous snapshot.
        std::fs::write(&config_path, "[orchestration]\nmax_passes = 0\n").unwrap();
        assert!(loader.reload().is_err());
        assert_eq!(loader.get().cache.expiration_secs, 20);
    }

    #[test]
    fn test_resolve_path_prefers_explicit() {
        let explicit = std::path::Path::new("/tmp/explicit.toml");
        assert_eq!(ConfigLoader::resolve_path(Some(explicit)), explicit);
    }

    // ── JSON roundtrip ─────────────────────────────────────────

    #[test]
    fn test_config_json_roundtrip() {
        let config = PlayConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: PlayConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.llm.model, config.llm.model);
        assert_eq!(restored.orchestration.planner, config.orchestration.planner);
    }
}
