//! HTTP-backed functions: request templates and the outbound invoker.

use std::str::FromStr;
use std::time::Duration;

use playframe_core::{PlayError, Result};
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::params::CallArguments;

/// Where an endpoint parameter goes in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Body,
}

impl FromStr for ParamLocation {
    type Err = PlayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "path" => Ok(Self::Path),
            "query" => Ok(Self::Query),
            "header" => Ok(Self::Header),
            "body" => Ok(Self::Body),
            other => Err(PlayError::Registration(format!(
                "unknown parameter location '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpParam {
    pub name: String,
    pub location: ParamLocation,
    pub schema: Value,
    pub required: bool,
    pub description: String,
}

impl HttpParam {
    pub fn new(name: impl Into<String>, location: ParamLocation, schema: Value) -> Self {
        Self {
            name: name.into(),
            required: true,
            location,
            schema,
            description: String::new(),
        }
    }

    /// Path placeholders can never be omitted and stay required.
    pub fn optional(mut self) -> Self {
        self.required = self.location == ParamLocation::Path;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// One operation of an HTTP API: method, path template and parameters.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    pub name: String,
    pub description: String,
    pub method: Method,
    /// Path relative to the client's base URL, with `{param}` placeholders.
    pub path: String,
    pub params: Vec<HttpParam>,
}

/// A fully resolved outbound request.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl HttpEndpoint {
    pub fn new(name: impl Into<String>, method: &str, path: impl Into<String>) -> Result<Self> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| PlayError::Registration(format!("invalid HTTP method '{method}'")))?;
        Ok(Self {
            name: name.into(),
            description: String::new(),
            method,
            path: path.into(),
            params: Vec::new(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_param(mut self, param: HttpParam) -> Self {
        self.params.push(param);
        self
    }

    /// Fill the template from the call arguments.
    ///
    /// Fails with a reason when a required parameter is missing, a path
    /// placeholder has no value or a header argument is not a valid header.
    pub fn resolve(
        &self,
        base: &Url,
        args: &CallArguments,
    ) -> std::result::Result<ResolvedRequest, String> {
        let mut path = self.path.clone();
        let mut query = Vec::new();
        let mut headers = HeaderMap::new();
        let mut body = serde_json::Map::new();

        for param in &self.params {
            let value = match args.get(&param.name) {
                Some(v) if !v.is_null() => v,
                _ if param.required => {
                    return Err(format!("missing required parameter '{}'", param.name));
                }
                _ => continue,
            };
            match param.location {
                ParamLocation::Path => {
                    let placeholder = format!("{{{}}}", param.name);
                    let text = value.as_plain_text();
                    path = path.replace(&placeholder, &urlencoding::encode(&text));
                }
                ParamLocation::Query => query.push((param.name.clone(), value.as_plain_text())),
                ParamLocation::Header => {
                    let (name, value) = header(&param.name, &value.as_plain_text())?;
                    headers.insert(name, value);
                }
                ParamLocation::Body => {
                    body.insert(param.name.clone(), value.to_value());
                }
            }
        }

        if let (Some(open), Some(close)) = (path.find('{'), path.rfind('}')) {
            if open < close {
                return Err(format!("unresolved path placeholder in '{path}'"));
            }
        }

        let joined = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let mut url = Url::parse(&joined).map_err(|e| format!("invalid URL '{joined}': {e}"))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }

        let body = if body.is_empty() && !self.params.iter().any(|p| p.location == ParamLocation::Body) {
            None
        } else {
            Some(Value::Object(body))
        };

        Ok(ResolvedRequest {
            method: self.method.clone(),
            url,
            headers,
            body,
        })
    }
}

fn header(name: &str, value: &str) -> std::result::Result<(HeaderName, HeaderValue), String> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| format!("'{name}' is not a valid header name"))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|_| format!("invalid value for header '{name}': control characters are not allowed"))?;
    Ok((header_name, header_value))
}

/// Connection settings of one HTTP client alias.
#[derive(Debug, Clone)]
pub struct HttpClientSpec {
    pub alias: String,
    pub base_url: Url,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl HttpClientSpec {
    pub fn new(alias: impl Into<String>, base_url: &str, timeout: Duration) -> Result<Self> {
        let alias = alias.into();
        let base_url = Url::parse(base_url).map_err(|e| PlayError::ConfigValidation {
            field: format!("http_clients.{alias}.base_url"),
            reason: e.to_string(),
        })?;
        Ok(Self {
            alias,
            base_url,
            headers: Vec::new(),
            timeout,
        })
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Sends resolved endpoint requests for one HTTP client alias.
pub struct HttpInvoker {
    client: reqwest::Client,
    spec: HttpClientSpec,
}

impl HttpInvoker {
    /// Fails when a default header of `spec` is not a valid HTTP header.
    pub fn new(spec: HttpClientSpec) -> Result<Self> {
        let mut defaults = HeaderMap::new();
        for (name, value) in &spec.headers {
            let (name, value) = header(name, value).map_err(|reason| PlayError::ConfigValidation {
                field: format!("http_clients.{}.headers", spec.alias),
                reason,
            })?;
            defaults.insert(name, value);
        }
        let client = reqwest::Client::builder()
            .timeout(spec.timeout)
            .default_headers(defaults)
            .build()
            .map_err(|e| PlayError::Http {
                tool: spec.alias.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, spec })
    }

    pub fn spec(&self) -> &HttpClientSpec {
        &self.spec
    }

    /// Call the endpoint and return the response body verbatim.
    ///
    /// Template failures are argument errors. Transport failures and timeouts
    /// are [`PlayError::Http`]. Non-2xx responses are returned like any other body.
    pub async fn send(
        &self,
        function: &str,
        endpoint: &HttpEndpoint,
        args: &CallArguments,
        bearer_token: Option<&str>,
    ) -> Result<String> {
        let request = endpoint
            .resolve(&self.spec.base_url, args)
            .map_err(|reason| PlayError::InvalidArguments {
                tool: function.to_string(),
                reason,
            })?;

        debug!(function, method = %request.method, url = %request.url, "sending HTTP tool request");

        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(token) = bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body {
            builder = builder.json(&body);
        }

        let resp = builder.send().await.map_err(|e| PlayError::Http {
            tool: function.to_string(),
            reason: e.to_string(),
        })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| PlayError::Http {
            tool: function.to_string(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            warn!(function, status = %status, "HTTP tool returned an error status");
        }
        Ok(body)
    }
}
