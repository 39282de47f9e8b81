//! Capability registry: scenes, their functions and actors.
//!
//! Built once with [`RegistryBuilder`] and shared read-only by `Arc` across
//! every request.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use playframe_core::{PlayError, Result, Tool};
use tracing::debug;

use crate::actor::Actor;
use crate::function::{FunctionRegistration, sanitize_name};
use crate::http::{HttpEndpoint, HttpInvoker};

/// A bounded group of capabilities the model can enter.
pub struct Scene {
    name: String,
    description: String,
    client: Option<String>,
    http_client: Option<String>,
    api_filters: Vec<Regex>,
    actors: Vec<Arc<dyn Actor>>,
    functions: Vec<String>,
    trigger: String,
}

impl Scene {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Model client alias, `None` for the default client.
    pub fn client(&self) -> Option<&str> {
        self.client.as_deref()
    }

    pub fn http_client(&self) -> Option<&str> {
        self.http_client.as_deref()
    }

    pub fn api_filters(&self) -> impl Iterator<Item = &str> {
        self.api_filters.iter().map(Regex::as_str)
    }

    pub fn actors(&self) -> &[Arc<dyn Actor>] {
        &self.actors
    }

    pub fn function_names(&self) -> &[String] {
        &self.functions
    }

    /// Name of the root-level tool that enters this scene.
    pub fn trigger_name(&self) -> &str {
        &self.trigger
    }

    pub fn trigger_tool(&self) -> Tool {
        Tool::new(
            &self.trigger,
            &self.description,
            serde_json::json!({ "type": "object", "properties": {}, "required": [] }),
        )
    }

    /// Whether an API path passes this scene's filters. No filters admit everything.
    pub fn allows_path(&self, path: &str) -> bool {
        self.api_filters.is_empty() || self.api_filters.iter().any(|re| re.is_match(path))
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("client", &self.client)
            .field("functions", &self.functions)
            .field("actors", &self.actors.len())
            .finish()
    }
}

/// Declares one scene before the registry is built.
pub struct SceneBuilder {
    name: String,
    description: String,
    client: Option<String>,
    http_client: Option<String>,
    api_filters: Vec<String>,
    actors: Vec<Arc<dyn Actor>>,
    functions: Vec<FunctionRegistration>,
    shared: Vec<String>,
    endpoints: Vec<(Arc<HttpInvoker>, HttpEndpoint)>,
}

impl SceneBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            client: None,
            http_client: None,
            api_filters: Vec::new(),
            actors: Vec::new(),
            functions: Vec::new(),
            shared: Vec::new(),
            endpoints: Vec::new(),
        }
    }

    pub fn client(mut self, alias: impl Into<String>) -> Self {
        self.client = Some(alias.into());
        self
    }

    pub fn http_client(mut self, alias: impl Into<String>) -> Self {
        self.http_client = Some(alias.into());
        self
    }

    /// Regular expression an HTTP endpoint path must match to be exposed.
    pub fn api_filter(mut self, pattern: impl Into<String>) -> Self {
        self.api_filters.push(pattern.into());
        self
    }

    pub fn actor(mut self, actor: Arc<dyn Actor>) -> Self {
        self.actors.push(actor);
        self
    }

    pub fn function(mut self, function: FunctionRegistration) -> Self {
        self.functions.push(function);
        self
    }

    /// Expose a function owned by another scene.
    pub fn shares(mut self, function_name: impl Into<String>) -> Self {
        self.shared.push(function_name.into());
        self
    }

    /// Expose an HTTP endpoint, subject to the scene's API filters.
    pub fn http_endpoint(mut self, invoker: Arc<HttpInvoker>, endpoint: HttpEndpoint) -> Self {
        self.endpoints.push((invoker, endpoint));
        self
    }
}

/// Builds an immutable [`SceneRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    scenes: Vec<SceneBuilder>,
    global_actors: Vec<Arc<dyn Actor>>,
    request_actors: Vec<Arc<dyn Actor>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scene(mut self, scene: SceneBuilder) -> Self {
        self.scenes.push(scene);
        self
    }

    /// Actor that plays at the start of the request and on every fresh scene session.
    pub fn global_actor(mut self, actor: Arc<dyn Actor>) -> Self {
        self.global_actors.push(actor);
        self
    }

    /// Actor that plays once at the start of the request, after the global ones.
    pub fn request_actor(mut self, actor: Arc<dyn Actor>) -> Self {
        self.request_actors.push(actor);
        self
    }

    pub fn build(self) -> Result<SceneRegistry> {
        let mut scenes: Vec<Scene> = Vec::with_capacity(self.scenes.len());
        let mut by_name = HashMap::new();
        let mut by_trigger = HashMap::new();
        let mut functions: HashMap<String, Arc<FunctionRegistration>> = HashMap::new();
        let mut owners: HashMap<String, Vec<String>> = HashMap::new();
        let mut pending_shares = Vec::new();

        for builder in self.scenes {
            if builder.name.trim().is_empty() {
                return Err(PlayError::Registration("scene name is empty".into()));
            }
            if by_name.contains_key(&builder.name) {
                return Err(PlayError::Registration(format!(
                    "duplicate scene '{}'",
                    builder.name
                )));
            }
            let trigger = sanitize_name(&builder.name);
            if by_trigger.contains_key(&trigger) {
                return Err(PlayError::Registration(format!(
                    "scene '{}' collides with another scene as tool '{trigger}'",
                    builder.name
                )));
            }

            let api_filters = builder
                .api_filters
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| {
                        PlayError::Registration(format!(
                            "scene '{}': invalid API filter '{p}': {e}",
                            builder.name
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let mut scene = Scene {
                name: builder.name,
                description: builder.description,
                client: builder.client,
                http_client: builder.http_client,
                api_filters,
                actors: builder.actors,
                functions: Vec::new(),
                trigger,
            };

            let mut registrations = builder.functions;
            for (invoker, endpoint) in builder.endpoints {
                if scene.allows_path(&endpoint.path) {
                    registrations.push(FunctionRegistration::http(&scene.name, endpoint, invoker));
                } else {
                    debug!(scene = %scene.name, path = %endpoint.path, "endpoint filtered out");
                }
            }

            for registration in registrations {
                let name = registration.name().to_string();
                if functions.contains_key(&name) {
                    return Err(PlayError::Registration(format!(
                        "duplicate function '{name}' in scene '{}'",
                        scene.name
                    )));
                }
                functions.insert(name.clone(), Arc::new(registration));
                owners.entry(name.clone()).or_default().push(scene.name.clone());
                scene.functions.push(name);
            }

            for shared in builder.shared {
                pending_shares.push((scenes.len(), shared));
            }

            by_name.insert(scene.name.clone(), scenes.len());
            by_trigger.insert(scene.trigger.clone(), scenes.len());
            scenes.push(scene);
        }

        for (index, function) in pending_shares {
            if !functions.contains_key(&function) {
                return Err(PlayError::Registration(format!(
                    "scene '{}' shares unknown function '{function}'",
                    scenes[index].name
                )));
            }
            let scene = &mut scenes[index];
            if !scene.functions.contains(&function) {
                owners.entry(function.clone()).or_default().push(scene.name.clone());
                scene.functions.push(function);
            }
        }

        Ok(SceneRegistry {
            scenes: scenes.into_iter().map(Arc::new).collect(),
            by_name,
            by_trigger,
            functions,
            owners,
            global_actors: self.global_actors,
            request_actors: self.request_actors,
        })
    }
}

/// Read-only map of scene name → scene, functions and actors.
pub struct SceneRegistry {
    scenes: Vec<Arc<Scene>>,
    by_name: HashMap<String, usize>,
    by_trigger: HashMap<String, usize>,
    functions: HashMap<String, Arc<FunctionRegistration>>,
    owners: HashMap<String, Vec<String>>,
    global_actors: Vec<Arc<dyn Actor>>,
    request_actors: Vec<Arc<dyn Actor>>,
}

impl SceneRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn empty() -> Self {
        Self {
            scenes: Vec::new(),
            by_name: HashMap::new(),
            by_trigger: HashMap::new(),
            functions: HashMap::new(),
            owners: HashMap::new(),
            global_actors: Vec::new(),
            request_actors: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    /// Scenes in registration order.
    pub fn scenes(&self) -> impl Iterator<Item = &Arc<Scene>> {
        self.scenes.iter()
    }

    pub fn scene(&self, name: &str) -> Option<&Arc<Scene>> {
        self.by_name.get(name).map(|&i| &self.scenes[i])
    }

    /// Resolve a root-level tool call to the scene it enters.
    pub fn scene_by_trigger(&self, tool_name: &str) -> Option<&Arc<Scene>> {
        self.by_trigger.get(tool_name).map(|&i| &self.scenes[i])
    }

    pub fn function(&self, name: &str) -> Option<&Arc<FunctionRegistration>> {
        self.functions.get(name)
    }

    /// A function, only if `scene` exposes it.
    pub fn function_in_scene(&self, scene: &str, name: &str) -> Option<&Arc<FunctionRegistration>> {
        let owned = self.owners.get(name)?.iter().any(|s| s == scene);
        if owned { self.functions.get(name) } else { None }
    }

    pub fn owners_of(&self, function: &str) -> &[String] {
        self.owners.get(function).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn functions_of(&self, scene: &str) -> Vec<&Arc<FunctionRegistration>> {
        self.scene(scene)
            .map(|s| {
                s.functions
                    .iter()
                    .filter_map(|f| self.functions.get(f))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn tools_of(&self, scene: &str) -> Vec<Tool> {
        self.functions_of(scene).into_iter().map(|f| f.tool()).collect()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn global_actors(&self) -> &[Arc<dyn Actor>] {
        &self.global_actors
    }

    pub fn request_actors(&self) -> &[Arc<dyn Actor>] {
        &self.request_actors
    }

    /// Plain-text catalogue of scenes and their tools, skipping `avoid`.
    pub fn describe(&self, avoid: &HashSet<String>) -> String {
        let mut out = String::new();
        for scene in self.scenes.iter().filter(|s| !avoid.contains(&s.name)) {
            out.push_str(&format!("- {}: {}\n", scene.name, scene.description));
            for f in self.functions_of(&scene.name) {
                out.push_str(&format!("    - {}: {}\n", f.name(), f.description()));
            }
        }
        out
    }
}

impl std::fmt::Debug for SceneRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneRegistry")
            .field("scenes", &self.scenes)
            .field("functions", &self.functions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::static_actor;
    use crate::http::{HttpClientSpec, HttpParam, ParamLocation};
    use std::time::Duration;

    async fn current(city: String) -> Result<String> {
        Ok(format!("sunny in {city}"))
    }

    fn weather_fn() -> FunctionRegistration {
        FunctionRegistration::service("Weather", "Current", "Current weather", &[("city", "")], current)
            .unwrap()
    }

    #[test]
    fn test_build_and_lookup() {
        let registry = RegistryBuilder::new()
            .scene(
                SceneBuilder::new("Weather", "Weather information")
                    .actor(static_actor("Answer in Celsius."))
                    .function(weather_fn()),
            )
            .scene(SceneBuilder::new("Travel Desk", "Trips").shares("Weather_Current"))
            .build()
            .unwrap();

        assert_eq!(registry.len(), 2);
        let names: Vec<&str> = registry.scenes().map(|s| s.name()).collect();
        assert_eq!(names, vec!["Weather", "Travel Desk"]);
        assert_eq!(registry.scene_by_trigger("Travel_Desk").unwrap().name(), "Travel Desk");
        assert_eq!(registry.owners_of("Weather_Current"), &["Weather", "Travel Desk"]);
        assert!(registry.function_in_scene("Travel Desk", "Weather_Current").is_some());
        assert_eq!(registry.tools_of("Weather")[0].name, "Weather_Current");
        assert!(registry.describe(&HashSet::new()).contains("Weather_Current"));
    }

    #[test]
    fn test_duplicate_scene_rejected() {
        let result = RegistryBuilder::new()
            .scene(SceneBuilder::new("Weather", ""))
            .scene(SceneBuilder::new("Weather", ""))
            .build();
        assert!(matches!(result, Err(PlayError::Registration(_))));
    }

    #[test]
    fn test_duplicate_function_rejected() {
        let result = RegistryBuilder::new()
            .scene(SceneBuilder::new("A", "").function(weather_fn()))
            .scene(SceneBuilder::new("B", "").function(weather_fn()))
            .build();
        let err = result.err().unwrap();
        assert!(err.to_string().contains("duplicate function"));
    }

    #[test]
    fn test_unknown_share_rejected() {
        let result = RegistryBuilder::new()
            .scene(SceneBuilder::new("A", "").shares("Nope"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_function_not_in_scene() {
        let registry = RegistryBuilder::new()
            .scene(SceneBuilder::new("Weather", "").function(weather_fn()))
            .scene(SceneBuilder::new("Other", ""))
            .build()
            .unwrap();
        assert!(registry.function_in_scene("Other", "Weather_Current").is_none());
    }

    #[test]
    fn test_api_filters_select_endpoints() {
        let spec = HttpClientSpec::new("api", "https://api.example.com", Duration::from_secs(5)).unwrap();
        let invoker = Arc::new(HttpInvoker::new(spec).unwrap());
        let endpoint = |name: &str, path: &str| {
            HttpEndpoint::new(name, "GET", path)
                .unwrap()
                .with_param(HttpParam::new("q", ParamLocation::Query, serde_json::json!({"type": "string"})))
        };
        let registry = RegistryBuilder::new()
            .scene(
                SceneBuilder::new("Weather", "")
                    .api_filter("^/v1/weather")
                    .http_endpoint(Arc::clone(&invoker), endpoint("current", "/v1/weather/current"))
                    .http_endpoint(Arc::clone(&invoker), endpoint("orders", "/v1/orders")),
            )
            .build()
            .unwrap();
        let weather = registry.scene("Weather").unwrap();
        assert_eq!(weather.function_names(), &["Weather_current".to_string()]);
        assert!(registry.function("Weather_current").unwrap().is_http());
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let result = RegistryBuilder::new()
            .scene(SceneBuilder::new("Weather", "").api_filter("(unclosed"))
            .build();
        assert!(matches!(result, Err(PlayError::Registration(_))));
    }
}
