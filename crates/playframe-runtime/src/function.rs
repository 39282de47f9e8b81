//! Function registrations: the tools a scene exposes to the model.
//!
//! A service method is registered by handing over an async function whose
//! parameters implement [`ToolParam`]. Its schema is derived from those types
//! and each argument is coerced in declaration order at call time.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use playframe_core::{PlayError, Result, Tool};
use tracing::debug;

use crate::http::{HttpEndpoint, HttpInvoker};
use crate::params::{
    CallArguments, IntoToolOutput, ParamSpec, RawArgument, ToolOutput, ToolParam, object_schema,
};

/// Longest function name model providers accept.
pub const MAX_FUNCTION_NAME_LEN: usize = 64;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<ToolOutput>> + Send>>;

/// Failed coercion: index of the offending parameter and the reason.
pub type ArgumentError = (usize, String);

/// An async function callable as a tool.
///
/// Implemented for `Fn(A, B, ..) -> impl Future<Output = Result<R>>` with up to
/// six [`ToolParam`] arguments.
pub trait ServiceHandler<Args>: Send + Sync + 'static {
    /// Schema and required flag of each positional parameter.
    fn param_schemas() -> Vec<(serde_json::Value, bool)>;

    fn call(&self, args: &[Option<RawArgument>]) -> std::result::Result<HandlerFuture, ArgumentError>;
}

macro_rules! impl_service_handler {
    ($($ty:ident),*) => {
        #[allow(non_snake_case, unused_variables, unused_mut, unused_assignments)]
        impl<F, Fut, R, $($ty,)*> ServiceHandler<($($ty,)*)> for F
        where
            F: Fn($($ty),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<R>> + Send + 'static,
            R: IntoToolOutput,
            $($ty: ToolParam,)*
        {
            fn param_schemas() -> Vec<(serde_json::Value, bool)> {
                vec![$(($ty::schema(), $ty::required())),*]
            }

            fn call(
                &self,
                args: &[Option<RawArgument>],
            ) -> std::result::Result<HandlerFuture, ArgumentError> {
                let mut index = 0usize;
                $(
                    let $ty = $ty::from_raw(args.get(index).and_then(|a| a.as_ref()))
                        .map_err(|e| (index, e))?;
                    index += 1;
                )*
                let fut = (self)($($ty),*);
                Ok(Box::pin(async move { fut.await.map(IntoToolOutput::into_output) }))
            }
        }
    };
}

impl_service_handler!();
impl_service_handler!(A1);
impl_service_handler!(A1, A2);
impl_service_handler!(A1, A2, A3);
impl_service_handler!(A1, A2, A3, A4);
impl_service_handler!(A1, A2, A3, A4, A5);
impl_service_handler!(A1, A2, A3, A4, A5, A6);

trait ErasedHandler: Send + Sync {
    fn call(&self, args: &[Option<RawArgument>]) -> std::result::Result<HandlerFuture, ArgumentError>;
}

struct TypedHandler<H, Args> {
    handler: H,
    _args: PhantomData<fn() -> Args>,
}

impl<H, Args> ErasedHandler for TypedHandler<H, Args>
where
    H: ServiceHandler<Args>,
    Args: 'static,
{
    fn call(&self, args: &[Option<RawArgument>]) -> std::result::Result<HandlerFuture, ArgumentError> {
        self.handler.call(args)
    }
}

enum Backend {
    Service(Arc<dyn ErasedHandler>),
    Http {
        endpoint: Arc<HttpEndpoint>,
        invoker: Arc<HttpInvoker>,
    },
}

/// A tool the model can call, backed by a service handler or an HTTP endpoint.
pub struct FunctionRegistration {
    name: String,
    description: String,
    params: Vec<ParamSpec>,
    backend: Backend,
}

impl FunctionRegistration {
    /// Register a service method. `params` names and describes each handler
    /// argument in order.
    pub fn service<H, Args>(
        service: &str,
        method: &str,
        description: impl Into<String>,
        params: &[(&str, &str)],
        handler: H,
    ) -> Result<Self>
    where
        H: ServiceHandler<Args>,
        Args: 'static,
    {
        let schemas = H::param_schemas();
        if schemas.len() != params.len() {
            return Err(PlayError::Registration(format!(
                "{service}.{method}: handler takes {} parameters but {} were described",
                schemas.len(),
                params.len()
            )));
        }
        let params = params
            .iter()
            .zip(schemas)
            .map(|((name, desc), (schema, required))| ParamSpec::new(*name, *desc, schema, required))
            .collect();

        Ok(Self {
            name: sanitize_function_name(service, method),
            description: description.into(),
            params,
            backend: Backend::Service(Arc::new(TypedHandler {
                handler,
                _args: PhantomData,
            })),
        })
    }

    /// Register an HTTP endpoint as a function of `service`.
    pub fn http(service: &str, endpoint: HttpEndpoint, invoker: Arc<HttpInvoker>) -> Self {
        let params = endpoint
            .params
            .iter()
            .map(|p| ParamSpec::new(&p.name, &p.description, p.schema.clone(), p.required))
            .collect();
        Self {
            name: sanitize_function_name(service, &endpoint.name),
            description: endpoint.description.clone(),
            params,
            backend: Backend::Http {
                endpoint: Arc::new(endpoint),
                invoker,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn is_http(&self) -> bool {
        matches!(self.backend, Backend::Http { .. })
    }

    /// Tool schema handed to the model.
    pub fn tool(&self) -> Tool {
        Tool::new(&self.name, &self.description, object_schema(&self.params))
    }

    /// Run the function with already-parsed arguments.
    pub async fn invoke(&self, args: &CallArguments, bearer_token: Option<&str>) -> Result<ToolOutput> {
        for name in args.names() {
            if !self.params.iter().any(|p| p.name == name) {
                debug!(function = %self.name, argument = name, "ignoring undeclared argument");
            }
        }

        match &self.backend {
            Backend::Service(handler) => {
                let ordered: Vec<Option<RawArgument>> = self
                    .params
                    .iter()
                    .map(|p| args.get(&p.name).cloned())
                    .collect();
                let fut = handler.call(&ordered).map_err(|(index, reason)| {
                    let param = self
                        .params
                        .get(index)
                        .map(|p| p.name.as_str())
                        .unwrap_or("?");
                    PlayError::InvalidArguments {
                        tool: self.name.clone(),
                        reason: format!("parameter '{param}': {reason}"),
                    }
                })?;
                fut.await
            }
            Backend::Http { endpoint, invoker } => {
                let body = invoker.send(&self.name, endpoint, args, bearer_token).await?;
                Ok(ToolOutput::Primitive(body))
            }
        }
    }
}

impl std::fmt::Debug for FunctionRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistration")
            .field("name", &self.name)
            .field("params", &self.params.len())
            .field("http", &self.is_http())
            .finish()
    }
}

/// `service_method` restricted to `[A-Za-z0-9_-]` and at most 64 characters.
pub fn sanitize_function_name(service: &str, method: &str) -> String {
    let joined = if service.is_empty() {
        method.to_string()
    } else {
        format!("{service}_{method}")
    };
    sanitize_name(&joined)
}

/// Restrict an arbitrary name to the characters model providers accept.
pub fn sanitize_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FUNCTION_NAME_LEN)
        .collect();
    if out.is_empty() {
        out.push('_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn forecast(city: String, days: Option<u32>) -> Result<String> {
        Ok(format!("{city}: {} days", days.unwrap_or(1)))
    }

    async fn ping() -> Result<()> {
        Ok(())
    }

    fn args(raw: &str) -> CallArguments {
        CallArguments::parse("t", raw).unwrap()
    }

    #[test]
    fn test_sanitize_function_name() {
        assert_eq!(sanitize_function_name("Weather Service", "get.current"), "Weather_Service_get_current");
        assert_eq!(sanitize_function_name("", "ok-name_1"), "ok-name_1");
        let long = "x".repeat(100);
        assert_eq!(sanitize_function_name(&long, "m").len(), MAX_FUNCTION_NAME_LEN);
    }

    #[test]
    fn test_schema_derived_from_types() {
        let f = FunctionRegistration::service(
            "Weather",
            "Forecast",
            "Forecast for a city",
            &[("city", "City"), ("days", "How many days")],
            forecast,
        )
        .unwrap();
        let tool = f.tool();
        assert_eq!(tool.name, "Weather_Forecast");
        assert_eq!(tool.parameters["properties"]["days"]["type"], "integer");
        assert_eq!(tool.parameters["required"], serde_json::json!(["city"]));
    }

    #[test]
    fn test_param_count_mismatch_rejected() {
        let result = FunctionRegistration::service("Weather", "Forecast", "", &[("city", "")], forecast);
        assert!(matches!(result, Err(PlayError::Registration(_))));
    }

    #[tokio::test]
    async fn test_invoke_in_declaration_order() {
        let f = FunctionRegistration::service("W", "F", "", &[("city", ""), ("days", "")], forecast)
            .unwrap();
        let out = f.invoke(&args(r#"{"days": 3, "city": "Roma"}"#), None).await.unwrap();
        assert_eq!(out, ToolOutput::Primitive("Roma: 3 days".into()));
    }

    #[tokio::test]
    async fn test_invoke_reports_bad_parameter() {
        let f = FunctionRegistration::service("W", "F", "", &[("city", ""), ("days", "")], forecast)
            .unwrap();
        let err = f.invoke(&args(r#"{"city": "Roma", "days": "many"}"#), None).await.unwrap_err();
        assert!(err.is_argument_error());
        assert!(err.to_string().contains("parameter 'days'"));

        let err = f.invoke(&args("{}"), None).await.unwrap_err();
        assert!(err.to_string().contains("parameter 'city'"));
    }

    #[tokio::test]
    async fn test_unit_handler() {
        let f = FunctionRegistration::service("Health", "Ping", "", &[], ping).unwrap();
        assert_eq!(f.invoke(&args(""), None).await.unwrap(), ToolOutput::Unit);
    }
}
