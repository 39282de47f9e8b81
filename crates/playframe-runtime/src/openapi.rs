//! Imports HTTP endpoints from an OpenAPI 3 document (JSON).

use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

use playframe_core::{PlayError, Result};

use crate::http::{HttpEndpoint, HttpParam, ParamLocation};

const METHODS: [&str; 7] = ["get", "post", "put", "patch", "delete", "head", "options"];
const MAX_REF_DEPTH: usize = 8;

/// Read and import an OpenAPI document from disk.
pub fn load_openapi(path: &Path) -> Result<Vec<HttpEndpoint>> {
    let raw = std::fs::read_to_string(path)?;
    let doc: Value = serde_json::from_str(&raw).map_err(|e| {
        PlayError::Config(format!("failed to parse OpenAPI document {}: {e}", path.display()))
    })?;
    let endpoints = import_endpoints(&doc)?;
    debug!(path = %path.display(), endpoints = endpoints.len(), "OpenAPI document imported");
    Ok(endpoints)
}

/// One endpoint per operation under `paths`.
pub fn import_endpoints(doc: &Value) -> Result<Vec<HttpEndpoint>> {
    let paths = doc
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| PlayError::Config("OpenAPI document has no paths".into()))?;

    let mut endpoints = Vec::new();
    for (path, item) in paths {
        let item = resolve(doc, item);
        let shared = item.get("parameters").and_then(Value::as_array);

        for method in METHODS {
            let Some(operation) = item.get(method) else {
                continue;
            };
            let name = operation
                .get("operationId")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| operation_name(method, path));
            let description = operation
                .get("summary")
                .or_else(|| operation.get("description"))
                .and_then(Value::as_str)
                .unwrap_or_default();

            let mut endpoint = HttpEndpoint::new(&name, method, path.as_str())?.with_description(description);

            let own = operation.get("parameters").and_then(Value::as_array);
            for raw in shared.into_iter().flatten().chain(own.into_iter().flatten()) {
                if let Some(param) = parameter(doc, raw) {
                    endpoint.params.retain(|p| p.name != param.name);
                    endpoint.params.push(param);
                }
            }
            endpoint.params.extend(body_params(doc, operation));
            endpoints.push(endpoint);
        }
    }
    Ok(endpoints)
}

/// `get /v1/current/{city}` becomes `get_v1_current_city`.
fn operation_name(method: &str, path: &str) -> String {
    let mut name = method.to_string();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        name.push('_');
        name.push_str(segment.trim_start_matches('{').trim_end_matches('}'));
    }
    name
}

fn resolve<'a>(doc: &'a Value, mut value: &'a Value) -> &'a Value {
    for _ in 0..MAX_REF_DEPTH {
        let Some(reference) = value.get("$ref").and_then(Value::as_str) else {
            return value;
        };
        match reference.strip_prefix('#').and_then(|pointer| doc.pointer(pointer)) {
            Some(target) => value = target,
            None => {
                warn!(reference, "unresolvable OpenAPI reference");
                return value;
            }
        }
    }
    value
}

fn parameter(doc: &Value, raw: &Value) -> Option<HttpParam> {
    let raw = resolve(doc, raw);
    let name = raw.get("name")?.as_str()?;
    let location = match raw.get("in")?.as_str()? {
        "path" => ParamLocation::Path,
        "query" => ParamLocation::Query,
        "header" => ParamLocation::Header,
        other => {
            debug!(name, location = other, "skipping unsupported parameter location");
            return None;
        }
    };
    let schema = raw
        .get("schema")
        .map(|s| resolve(doc, s).clone())
        .unwrap_or_else(|| serde_json::json!({ "type": "string" }));
    let description = raw.get("description").and_then(Value::as_str).unwrap_or_default();

    let mut param = HttpParam::new(name, location, schema).with_description(description);
    if !raw.get("required").and_then(Value::as_bool).unwrap_or(false) {
        param = param.optional();
    }
    Some(param)
}

/// Top-level properties of a JSON request body, one parameter each.
fn body_params(doc: &Value, operation: &Value) -> Vec<HttpParam> {
    let Some(body) = operation.get("requestBody").map(|b| resolve(doc, b)) else {
        return Vec::new();
    };
    let Some(schema) = body.pointer("/content/application~1json/schema").map(|s| resolve(doc, s)) else {
        return Vec::new();
    };
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    properties
        .iter()
        .map(|(name, prop)| {
            let prop = resolve(doc, prop);
            let description = prop.get("description").and_then(Value::as_str).unwrap_or_default();
            let param = HttpParam::new(name, ParamLocation::Body, prop.clone()).with_description(description);
            if required.contains(&name.as_str()) { param } else { param.optional() }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "openapi": "3.0.0",
            "paths": {
                "/v1/current/{city}": {
                    "parameters": [
                        { "name": "city", "in": "path", "required": true, "schema": { "type": "string" } }
                    ],
                    "get": {
                        "operationId": "CurrentWeather",
                        "summary": "Current conditions",
                        "parameters": [
                            { "$ref": "#/components/parameters/Units" },
                            { "name": "session", "in": "cookie" }
                        ]
                    }
                },
                "/v1/alerts": {
                    "post": {
                        "requestBody": {
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/Alert" }
                                }
                            }
                        }
                    }
                }
            },
            "components": {
                "parameters": {
                    "Units": { "name": "units", "in": "query", "schema": { "type": "string" } }
                },
                "schemas": {
                    "Alert": {
                        "type": "object",
                        "required": ["city"],
                        "properties": {
                            "city": { "type": "string" },
                            "threshold": { "type": "number", "description": "degrees" }
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn test_import_operations() {
        let endpoints = import_endpoints(&doc()).unwrap();
        assert_eq!(endpoints.len(), 2);

        let current = endpoints.iter().find(|e| e.name == "CurrentWeather").unwrap();
        assert_eq!(current.method, reqwest::Method::GET);
        assert_eq!(current.description, "Current conditions");
        let names: Vec<&str> = current.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["city", "units"]);
        assert!(current.params[0].required);
        assert!(!current.params[1].required);
    }

    #[test]
    fn test_request_body_properties() {
        let endpoints = import_endpoints(&doc()).unwrap();
        let alerts = endpoints.iter().find(|e| e.name == "post_v1_alerts").unwrap();
        assert_eq!(alerts.params.len(), 2);
        let city = alerts.params.iter().find(|p| p.name == "city").unwrap();
        assert_eq!(city.location, ParamLocation::Body);
        assert!(city.required);
        let threshold = alerts.params.iter().find(|p| p.name == "threshold").unwrap();
        assert!(!threshold.required);
        assert_eq!(threshold.description, "degrees");
    }

    #[test]
    fn test_missing_paths_rejected() {
        assert!(import_endpoints(&json!({ "openapi": "3.0.0" })).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.json");
        std::fs::write(&path, doc().to_string()).unwrap();
        assert_eq!(load_openapi(&path).unwrap().len(), 2);

        std::fs::write(&path, "openapi: 3.0.0").unwrap();
        assert!(matches!(load_openapi(&path), Err(PlayError::Config(_))));
    }
}
