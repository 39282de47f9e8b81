//! Tool dispatcher: resolves a tool call to its registration and runs it.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use playframe_core::{PlayError, Result};

use crate::params::CallArguments;
use crate::registry::SceneRegistry;

/// What happened to one tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The function ran; `response` is its rendered result.
    Completed { function: String, response: String },
    /// The call failed in a way the model can correct (bad arguments, service error).
    Failed { function: String, error: String },
    /// No such function in the scene.
    Unavailable { function: String },
}

/// Runs tool calls against the registry.
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<SceneRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<SceneRegistry>) -> Self {
        Self { registry }
    }

    /// Invoke `function_name` of `scene` with the raw JSON `arguments`.
    ///
    /// Only fatal failures are returned as `Err`: HTTP transport errors, model
    /// transport errors raised by a handler, and cancellation. Everything else
    /// becomes a [`DispatchOutcome`] to report back to the model.
    pub async fn invoke(
        &self,
        scene: &str,
        function_name: &str,
        arguments: &str,
        bearer_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome> {
        let Some(function) = self.registry.function_in_scene(scene, function_name) else {
            warn!(scene, function = function_name, "model called an unavailable function");
            return Ok(DispatchOutcome::Unavailable {
                function: function_name.to_string(),
            });
        };

        let args = match CallArguments::parse(function_name, arguments) {
            Ok(args) => args,
            Err(e) => {
                debug!(function = function_name, error = %e, "rejecting malformed arguments");
                return Ok(DispatchOutcome::Failed {
                    function: function_name.to_string(),
                    error: e.to_string(),
                });
            }
        };

        debug!(scene, function = function_name, args = args.len(), "dispatching tool call");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PlayError::Cancelled),
            result = function.invoke(&args, bearer_token) => result,
        };

        match result {
            Ok(output) => Ok(DispatchOutcome::Completed {
                function: function_name.to_string(),
                response: output.render(),
            }),
            Err(e) if is_fatal(&e) => Err(e),
            Err(e) => {
                warn!(function = function_name, error = %e, "tool call failed");
                Ok(DispatchOutcome::Failed {
                    function: function_name.to_string(),
                    error: e.to_string(),
                })
            }
        }
    }
}

fn is_fatal(error: &PlayError) -> bool {
    matches!(
        error,
        PlayError::Http { .. }
            | PlayError::LlmProvider(_)
            | PlayError::RateLimited { .. }
            | PlayError::Cancelled
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FunctionRegistration;
    use crate::registry::{RegistryBuilder, SceneBuilder};

    async fn add(a: i64, b: i64) -> Result<i64> {
        Ok(a + b)
    }

    async fn broken() -> Result<String> {
        Err(PlayError::ToolExecution {
            tool: "Math_Broken".into(),
            reason: "division by zero".into(),
        })
    }

    async fn upstream_down() -> Result<String> {
        Err(PlayError::Http {
            tool: "Math_Remote".into(),
            reason: "connection refused".into(),
        })
    }

    fn dispatcher() -> ToolDispatcher {
        let registry = RegistryBuilder::new()
            .scene(
                SceneBuilder::new("Math", "Arithmetic")
                    .function(
                        FunctionRegistration::service("Math", "Add", "", &[("a", ""), ("b", "")], add)
                            .unwrap(),
                    )
                    .function(FunctionRegistration::service("Math", "Broken", "", &[], broken).unwrap())
                    .function(
                        FunctionRegistration::service("Math", "Remote", "", &[], upstream_down).unwrap(),
                    ),
            )
            .build()
            .unwrap();
        ToolDispatcher::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_completed() {
        let cancel = CancellationToken::new();
        let outcome = dispatcher()
            .invoke("Math", "Math_Add", r#"{"a": 2, "b": 3}"#, None, &cancel)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Completed {
                function: "Math_Add".into(),
                response: "5".into()
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_arguments_fail_the_call_only() {
        let cancel = CancellationToken::new();
        let d = dispatcher();
        for raw in ["{not json", r#"{"a": "two", "b": 3}"#, r#"{"a": 1}"#] {
            let outcome = d.invoke("Math", "Math_Add", raw, None, &cancel).await.unwrap();
            assert!(matches!(outcome, DispatchOutcome::Failed { .. }), "{raw}");
        }
    }

    #[tokio::test]
    async fn test_service_error_reported() {
        let cancel = CancellationToken::new();
        let outcome = dispatcher()
            .invoke("Math", "Math_Broken", "{}", None, &cancel)
            .await
            .unwrap();
        match outcome {
            DispatchOutcome::Failed { error, .. } => assert!(error.contains("division by zero")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_error_is_fatal() {
        let cancel = CancellationToken::new();
        let result = dispatcher()
            .invoke("Math", "Math_Remote", "{}", None, &cancel)
            .await;
        assert!(matches!(result, Err(PlayError::Http { .. })));
    }

    #[tokio::test]
    async fn test_bad_header_argument_fails_the_call_only() {
        use crate::http::{HttpClientSpec, HttpEndpoint, HttpInvoker, HttpParam, ParamLocation};
        use std::time::Duration;

        let spec = HttpClientSpec::new("api", "http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let invoker = Arc::new(HttpInvoker::new(spec).unwrap());
        let endpoint = HttpEndpoint::new("lookup", "GET", "/lookup").unwrap().with_param(HttpParam::new(
            "X-Tenant",
            ParamLocation::Header,
            serde_json::json!({"type": "string"}),
        ));
        let registry = RegistryBuilder::new()
            .scene(SceneBuilder::new("Api", "").http_client("api").http_endpoint(invoker, endpoint))
            .build()
            .unwrap();

        let cancel = CancellationToken::new();
        let outcome = ToolDispatcher::new(Arc::new(registry))
            .invoke("Api", "Api_lookup", r#"{"X-Tenant": "a\nb"}"#, None, &cancel)
            .await
            .unwrap();
        match outcome {
            DispatchOutcome::Failed { function, error } => {
                assert_eq!(function, "Api_lookup");
                assert!(error.contains("X-Tenant"), "{error}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_function() {
        let cancel = CancellationToken::new();
        let outcome = dispatcher()
            .invoke("Math", "Math_Sqrt", "{}", None, &cancel)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Unavailable {
                function: "Math_Sqrt".into()
            }
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = dispatcher()
            .invoke("Math", "Math_Add", r#"{"a": 1, "b": 1}"#, None, &cancel)
            .await;
        assert!(matches!(result, Err(PlayError::Cancelled)));
    }
}
