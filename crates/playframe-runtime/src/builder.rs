//! Wiring from a loaded [`PlayConfig`]: model clients, config-declared HTTP
//! scenes and the manager itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info};

use playframe_config::{
    DirectorMode, EndpointConfig, LlmConfig, PlannerMode, PlayConfig, SceneConfig,
};
use playframe_core::{PlayError, Result};
use playframe_llm::{ClientRegistry, ClientSettings, LlmProvider, MockProvider, OpenAiProvider};

use crate::actor::static_actor;
use crate::director::{LlmDirector, PlanDirector, StopDirector};
use crate::http::{HttpClientSpec, HttpEndpoint, HttpInvoker, HttpParam};
use crate::manager::{ManagerOptions, SceneManager};
use crate::openapi::load_openapi;
use crate::planner::{FreeFormPlanner, SchemaPlanner};
use crate::registry::{RegistryBuilder, SceneBuilder, SceneRegistry};
use crate::summarizer::LlmSummarizer;

fn make_provider(
    alias: &str,
    provider: &str,
    base_url: Option<&str>,
    api_key: Option<&str>,
) -> Result<Arc<dyn LlmProvider>> {
    match provider {
        "mock" => Ok(Arc::new(MockProvider::new("mock"))),
        "openai" => {
            let api_key = api_key.ok_or_else(|| {
                PlayError::Config(format!(
                    "model client '{alias}' has no API key (set llm.api_key or OPENAI_API_KEY)"
                ))
            })?;
            let mut openai = OpenAiProvider::new(api_key.to_string());
            if let Some(url) = base_url {
                openai = openai.with_base_url(url.to_string(), "openai".into());
            }
            Ok(Arc::new(openai))
        }
        other => Err(PlayError::Config(format!("unknown provider '{other}'"))),
    }
}

/// The default client plus every named client. Named clients inherit the
/// provider, base URL and key of the default one unless they set their own.
pub fn build_clients(config: &PlayConfig) -> Result<ClientRegistry> {
    let llm: &LlmConfig = &config.llm;
    let mut registry = ClientRegistry::new("default");

    let provider = make_provider("default", &llm.provider, llm.base_url.as_deref(), llm.api_key.as_deref())?;
    registry.register(
        "default",
        provider,
        ClientSettings {
            model: llm.model.clone(),
            max_tokens: llm.max_tokens,
            temperature: llm.temperature,
        },
    );

    let mut aliases: Vec<&String> = llm.clients.keys().collect();
    aliases.sort();
    for alias in aliases {
        let client = &llm.clients[alias];
        let provider = make_provider(
            alias,
            &llm.provider,
            client.base_url.as_deref().or(llm.base_url.as_deref()),
            client.api_key.as_deref().or(llm.api_key.as_deref()),
        )?;
        registry.register(
            alias.as_str(),
            provider,
            ClientSettings {
                model: client.model.clone(),
                max_tokens: client.max_tokens.unwrap_or(llm.max_tokens),
                temperature: client.temperature.unwrap_or(llm.temperature),
            },
        );
    }
    Ok(registry)
}

fn endpoint_from_config(config: &EndpointConfig) -> Result<HttpEndpoint> {
    let mut endpoint =
        HttpEndpoint::new(&config.name, &config.method, &config.path)?.with_description(&config.description);
    for p in &config.params {
        let mut param = HttpParam::new(&p.name, p.location.parse()?, json!({ "type": p.param_type }))
            .with_description(&p.description);
        if !p.required {
            param = param.optional();
        }
        endpoint = endpoint.with_param(param);
    }
    Ok(endpoint)
}

fn scene_from_config(
    scene: &SceneConfig,
    invokers: &HashMap<String, Arc<HttpInvoker>>,
) -> Result<SceneBuilder> {
    let mut builder = SceneBuilder::new(&scene.name, &scene.description);
    if let Some(ref client) = scene.client {
        builder = builder.client(client);
    }
    for filter in &scene.api_filters {
        builder = builder.api_filter(filter);
    }
    if let Some(ref instructions) = scene.instructions {
        builder = builder.actor(static_actor(instructions));
    }

    let Some(ref alias) = scene.http_client else {
        if !scene.endpoints.is_empty() || scene.openapi.is_some() {
            return Err(PlayError::Registration(format!(
                "scene '{}' declares endpoints without an http_client",
                scene.name
            )));
        }
        return Ok(builder);
    };
    let invoker = invokers.get(alias).ok_or_else(|| {
        PlayError::Registration(format!(
            "scene '{}' uses unknown http_client '{alias}'",
            scene.name
        ))
    })?;
    builder = builder.http_client(alias);

    let mut endpoints = Vec::new();
    if let Some(ref path) = scene.openapi {
        endpoints.extend(load_openapi(path)?);
    }
    for endpoint in &scene.endpoints {
        endpoints.push(endpoint_from_config(endpoint)?);
    }
    debug!(scene = %scene.name, endpoints = endpoints.len(), "HTTP scene configured");
    for endpoint in endpoints {
        builder = builder.http_endpoint(Arc::clone(invoker), endpoint);
    }
    Ok(builder)
}

/// Add the scenes declared in `config` to `base` and build the registry.
///
/// `base` carries the scenes registered in code; config scenes come after them.
pub fn build_registry(config: &PlayConfig, base: RegistryBuilder) -> Result<SceneRegistry> {
    let default_timeout = Duration::from_secs(config.orchestration.http_timeout_secs);
    let mut invokers = HashMap::new();
    for (alias, client) in &config.http_clients {
        let timeout = client.timeout_secs.map(Duration::from_secs).unwrap_or(default_timeout);
        let mut spec = HttpClientSpec::new(alias.as_str(), &client.base_url, timeout)?;
        for (name, value) in &client.headers {
            spec = spec.with_header(name, value);
        }
        invokers.insert(alias.clone(), Arc::new(HttpInvoker::new(spec)?));
    }

    let mut builder = base;
    for scene in &config.scenes {
        builder = builder.scene(scene_from_config(scene, &invokers)?);
    }
    let registry = builder.build()?;
    info!(
        scenes = registry.len(),
        functions = registry.function_count(),
        "scene registry built"
    );
    Ok(registry)
}

impl ManagerOptions {
    pub fn from_config(config: &PlayConfig) -> Self {
        let o = &config.orchestration;
        Self {
            max_tool_depth: o.max_tool_depth,
            max_passes: o.max_passes,
            summarization_threshold: o.summarization_threshold,
            event_buffer: o.event_buffer,
            cache_expiration: Some(Duration::from_secs(config.cache.expiration_secs)),
        }
    }
}

impl SceneManager {
    /// A manager with the planner, director, store and limits `config` asks for.
    pub fn from_config(
        config: &PlayConfig,
        registry: Arc<SceneRegistry>,
        clients: Arc<ClientRegistry>,
    ) -> SceneManager {
        let mut builder = SceneManager::builder(registry, clients)
            .options(ManagerOptions::from_config(config))
            .summarizer(Arc::new(LlmSummarizer::new(None)));

        if !config.cache.enabled {
            builder = builder.without_store();
        }
        builder = match config.orchestration.planner {
            PlannerMode::None => builder,
            PlannerMode::FreeForm => builder.planner(Arc::new(FreeFormPlanner::new(None))),
            PlannerMode::Schema => builder.planner(Arc::new(SchemaPlanner::new(None))),
        };
        builder = match config.orchestration.director {
            DirectorMode::None => builder.director(Arc::new(StopDirector)),
            DirectorMode::Llm => builder.director(Arc::new(LlmDirector::new(None))),
            DirectorMode::Plan => builder.director(Arc::new(PlanDirector::new(None))),
        };
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playframe_config::{
        ClientConfig, EndpointParamConfig, HttpClientConfig,
    };

    fn mock_config() -> PlayConfig {
        let mut config = PlayConfig::default();
        config.llm.provider = "mock".into();
        config
    }

    #[test]
    fn test_build_clients_with_named_client() {
        let mut config = mock_config();
        config.llm.clients.insert(
            "fast".into(),
            ClientConfig {
                model: "small-model".into(),
                base_url: None,
                api_key: None,
                max_tokens: Some(256),
                temperature: None,
            },
        );
        let clients = build_clients(&config).unwrap();
        assert_eq!(clients.aliases(), vec!["default".to_string(), "fast".to_string()]);
        assert_eq!(clients.create_session(Some("fast")).unwrap().alias(), "fast");
    }

    #[test]
    fn test_openai_requires_key() {
        let mut config = PlayConfig::default();
        config.llm.api_key = None;
        assert!(matches!(build_clients(&config), Err(PlayError::Config(_))));
    }

    fn weather_scene() -> SceneConfig {
        SceneConfig {
            name: "Weather".into(),
            description: "Weather lookups".into(),
            http_client: Some("weather".into()),
            instructions: Some("Always answer in Celsius.".into()),
            endpoints: vec![EndpointConfig {
                name: "Current".into(),
                description: "Current weather".into(),
                method: "GET".into(),
                path: "/v1/current/{city}".into(),
                params: vec![EndpointParamConfig {
                    name: "city".into(),
                    location: "path".into(),
                    param_type: "string".into(),
                    required: true,
                    description: String::new(),
                }],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_build_registry_with_http_scene() {
        let mut config = mock_config();
        config.http_clients.insert(
            "weather".into(),
            HttpClientConfig {
                base_url: "https://weather.example.com/api".into(),
                ..Default::default()
            },
        );
        config.scenes.push(weather_scene());

        let registry = build_registry(&config, RegistryBuilder::new()).unwrap();
        let scene = registry.scene("Weather").unwrap();
        assert_eq!(scene.actors().len(), 1);
        assert_eq!(scene.function_names(), ["Weather_Current".to_string()]);
        assert!(registry.function("Weather_Current").unwrap().is_http());
    }

    #[test]
    fn test_unknown_http_client_rejected() {
        let mut config = mock_config();
        config.scenes.push(weather_scene());
        assert!(matches!(
            build_registry(&config, RegistryBuilder::new()),
            Err(PlayError::Registration(_))
        ));
    }

    #[test]
    fn test_manager_from_config() {
        let mut config = mock_config();
        config.orchestration.planner = PlannerMode::Schema;
        config.orchestration.max_passes = 2;
        config.cache.enabled = false;

        let clients = Arc::new(build_clients(&config).unwrap());
        let registry = Arc::new(build_registry(&config, RegistryBuilder::new()).unwrap());
        let manager = SceneManager::from_config(&config, registry, clients);
        assert_eq!(manager.options().max_passes, 2);
        assert!(manager.store().is_none());
    }
}
