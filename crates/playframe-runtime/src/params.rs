//! Typed tool parameters.
//!
//! Every Rust type a service method accepts implements [`ToolParam`], which
//! supplies its JSON schema and coerces a [`RawArgument`] from the model into
//! the typed value. `Option<T>` marks a parameter as optional.

use schemars::JsonSchema;
use schemars::generate::SchemaSettings;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;

use playframe_core::{PlayError, Result};

/// One argument value as the model sent it.
///
/// Nested objects and arrays are kept as JSON text until a parameter asks for them.
#[derive(Debug, Clone, PartialEq)]
pub enum RawArgument {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    Json(String),
}

impl RawArgument {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::Text(s),
            nested @ (Value::Array(_) | Value::Object(_)) => Self::Json(nested.to_string()),
        }
    }

    /// Back to a JSON value (nested text is re-parsed).
    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::Text(s) => Value::String(s.clone()),
            Self::Json(s) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
        }
    }

    /// Rendering used for URL paths, query strings and headers.
    pub fn as_plain_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::Text(s) | Self::Json(s) => s.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "a boolean",
            Self::Number(_) => "a number",
            Self::Text(_) => "a string",
            Self::Json(_) => "an object or array",
        }
    }
}

/// The flat argument object of one tool call: name → raw value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArguments {
    values: HashMap<String, RawArgument>,
}

impl CallArguments {
    /// Parse the raw argument string of a tool call.
    ///
    /// An empty string is an empty argument object. Anything that is not a JSON
    /// object fails with [`PlayError::InvalidArguments`].
    pub fn parse(tool: &str, raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_str(raw).map_err(|e| PlayError::InvalidArguments {
            tool: tool.to_string(),
            reason: format!("arguments are not valid JSON: {e}"),
        })?;
        match value {
            Value::Object(map) => Ok(Self {
                values: map
                    .into_iter()
                    .map(|(k, v)| (k, RawArgument::from_value(v)))
                    .collect(),
            }),
            Value::Null => Ok(Self::default()),
            other => Err(PlayError::InvalidArguments {
                tool: tool.to_string(),
                reason: format!("arguments must be a JSON object, got {other}"),
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&RawArgument> {
        self.values.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: RawArgument) {
        self.values.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// A Rust type usable as a tool parameter.
pub trait ToolParam: Sized + Send + 'static {
    /// JSON schema of the parameter value.
    fn schema() -> Value;

    /// Whether the model must supply the parameter.
    fn required() -> bool {
        true
    }

    /// Coerce the raw value. `None` means the argument was absent.
    fn from_raw(raw: Option<&RawArgument>) -> std::result::Result<Self, String>;
}

fn present(raw: Option<&RawArgument>) -> std::result::Result<&RawArgument, String> {
    match raw {
        None | Some(RawArgument::Null) => Err("missing required value".into()),
        Some(r) => Ok(r),
    }
}

impl ToolParam for String {
    fn schema() -> Value {
        json!({ "type": "string" })
    }

    fn from_raw(raw: Option<&RawArgument>) -> std::result::Result<Self, String> {
        match present(raw)? {
            RawArgument::Text(s) => Ok(s.clone()),
            other => Err(format!("expected a string, got {}", other.kind())),
        }
    }
}

impl ToolParam for bool {
    fn schema() -> Value {
        json!({ "type": "boolean" })
    }

    fn from_raw(raw: Option<&RawArgument>) -> std::result::Result<Self, String> {
        match present(raw)? {
            RawArgument::Bool(b) => Ok(*b),
            RawArgument::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| format!("expected a boolean, got \"{s}\"")),
            other => Err(format!("expected a boolean, got {}", other.kind())),
        }
    }
}

macro_rules! integer_param {
    ($($ty:ty),*) => {
        $(
            impl ToolParam for $ty {
                fn schema() -> Value {
                    json!({ "type": "integer" })
                }

                fn from_raw(raw: Option<&RawArgument>) -> std::result::Result<Self, String> {
                    match present(raw)? {
                        RawArgument::Number(n) => {
                            let wide = n
                                .as_i64()
                                .map(i128::from)
                                .or_else(|| n.as_u64().map(i128::from))
                                .ok_or_else(|| format!("expected an integer, got {n}"))?;
                            <$ty>::try_from(wide)
                                .map_err(|_| format!("{n} is out of range for {}", stringify!($ty)))
                        }
                        RawArgument::Text(s) => s
                            .trim()
                            .parse()
                            .map_err(|_| format!("expected an integer, got \"{s}\"")),
                        other => Err(format!("expected an integer, got {}", other.kind())),
                    }
                }
            }
        )*
    };
}

integer_param!(i32, i64, u32, u64, usize);

macro_rules! float_param {
    ($($ty:ty),*) => {
        $(
            impl ToolParam for $ty {
                fn schema() -> Value {
                    json!({ "type": "number" })
                }

                fn from_raw(raw: Option<&RawArgument>) -> std::result::Result<Self, String> {
                    match present(raw)? {
                        RawArgument::Number(n) => n
                            .as_f64()
                            .map(|f| f as $ty)
                            .ok_or_else(|| format!("expected a number, got {n}")),
                        RawArgument::Text(s) => s
                            .trim()
                            .parse()
                            .map_err(|_| format!("expected a number, got \"{s}\"")),
                        other => Err(format!("expected a number, got {}", other.kind())),
                    }
                }
            }
        )*
    };
}

float_param!(f32, f64);

impl<T: ToolParam> ToolParam for Option<T> {
    fn schema() -> Value {
        T::schema()
    }

    fn required() -> bool {
        false
    }

    fn from_raw(raw: Option<&RawArgument>) -> std::result::Result<Self, String> {
        match raw {
            None | Some(RawArgument::Null) => Ok(None),
            Some(r) => T::from_raw(Some(r)).map(Some),
        }
    }
}

impl<T: ToolParam> ToolParam for Vec<T> {
    fn schema() -> Value {
        json!({ "type": "array", "items": T::schema() })
    }

    fn from_raw(raw: Option<&RawArgument>) -> std::result::Result<Self, String> {
        let items = match present(raw)? {
            RawArgument::Json(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Array(items)) => items,
                _ => return Err("expected an array".into()),
            },
            other => return Err(format!("expected an array, got {}", other.kind())),
        };
        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                let raw = RawArgument::from_value(item);
                T::from_raw(Some(&raw)).map_err(|e| format!("item {i}: {e}"))
            })
            .collect()
    }
}

impl ToolParam for Value {
    fn schema() -> Value {
        json!({ "type": "object" })
    }

    fn from_raw(raw: Option<&RawArgument>) -> std::result::Result<Self, String> {
        Ok(present(raw)?.to_value())
    }
}

/// A structured parameter or result carried as JSON.
///
/// As a parameter, the model's object is deserialized into `T`. As a handler
/// result, `T` is serialized and reported as a JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T: DeserializeOwned + JsonSchema + Send + 'static> ToolParam for Json<T> {
    /// The derived schema of `T`, nested definitions inlined.
    fn schema() -> Value {
        let schema = SchemaSettings::draft2020_12()
            .with(|s| {
                s.inline_subschemas = true;
                s.meta_schema = None;
            })
            .into_generator()
            .into_root_schema_for::<T>();
        serde_json::to_value(schema).unwrap_or_else(|_| json!({ "type": "object" }))
    }

    fn from_raw(raw: Option<&RawArgument>) -> std::result::Result<Self, String> {
        match present(raw)? {
            RawArgument::Json(text) => serde_json::from_str(text)
                .map(Json)
                .map_err(|e| format!("invalid object: {e}")),
            other => serde_json::from_value(other.to_value())
                .map(Json)
                .map_err(|e| format!("invalid value: {e}")),
        }
    }
}

/// Result of one function invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// The handler returned nothing.
    Unit,
    /// Scalar result, already stringified.
    Primitive(String),
    /// Complex result.
    Json(Value),
}

impl ToolOutput {
    /// Text fed back to the model and recorded on the event.
    pub fn render(&self) -> String {
        match self {
            Self::Unit => String::new(),
            Self::Primitive(s) => s.clone(),
            Self::Json(v) => v.to_string(),
        }
    }
}

/// Conversion from a handler's return value to a [`ToolOutput`].
pub trait IntoToolOutput {
    fn into_output(self) -> ToolOutput;
}

impl IntoToolOutput for ToolOutput {
    fn into_output(self) -> ToolOutput {
        self
    }
}

impl IntoToolOutput for () {
    fn into_output(self) -> ToolOutput {
        ToolOutput::Unit
    }
}

impl IntoToolOutput for String {
    fn into_output(self) -> ToolOutput {
        ToolOutput::Primitive(self)
    }
}

impl IntoToolOutput for &'static str {
    fn into_output(self) -> ToolOutput {
        ToolOutput::Primitive(self.to_string())
    }
}

macro_rules! primitive_output {
    ($($ty:ty),*) => {
        $(
            impl IntoToolOutput for $ty {
                fn into_output(self) -> ToolOutput {
                    ToolOutput::Primitive(self.to_string())
                }
            }
        )*
    };
}

primitive_output!(bool, i32, i64, u32, u64, usize, f32, f64);

impl IntoToolOutput for Value {
    fn into_output(self) -> ToolOutput {
        ToolOutput::Json(self)
    }
}

impl<T: Serialize> IntoToolOutput for Json<T> {
    fn into_output(self) -> ToolOutput {
        match serde_json::to_value(&self.0) {
            Ok(v) => ToolOutput::Json(v),
            Err(e) => ToolOutput::Primitive(format!("unserializable result: {e}")),
        }
    }
}

/// A declared parameter of a registered function.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub description: String,
    pub schema: Value,
    pub required: bool,
}

impl ParamSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        required: bool,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            required,
        }
    }

    /// Spec for a typed parameter.
    pub fn of<T: ToolParam>(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, T::schema(), T::required())
    }
}

/// Object schema for a parameter list, in declaration order.
pub fn object_schema(params: &[ParamSpec]) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for p in params {
        let mut schema = p.schema.clone();
        if !p.description.is_empty() {
            if let Value::Object(ref mut obj) = schema {
                obj.insert("description".into(), Value::String(p.description.clone()));
            }
        }
        properties.insert(p.name.clone(), schema);
        if p.required {
            required.push(Value::String(p.name.clone()));
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(v: Value) -> RawArgument {
        RawArgument::from_value(v)
    }

    #[test]
    fn test_nested_values_kept_as_text() {
        let args = CallArguments::parse("t", r#"{"city":"Milano","filter":{"days":3}}"#).unwrap();
        assert_eq!(args.get("city"), Some(&RawArgument::Text("Milano".into())));
        assert_eq!(
            args.get("filter"),
            Some(&RawArgument::Json(r#"{"days":3}"#.into()))
        );
    }

    #[test]
    fn test_parse_rejects_non_object() {
        let err = CallArguments::parse("weather", "[1,2]").unwrap_err();
        assert!(err.is_argument_error());
        let err = CallArguments::parse("weather", "{oops").unwrap_err();
        assert!(err.is_argument_error());
        assert!(CallArguments::parse("weather", "  ").unwrap().is_empty());
    }

    #[test]
    fn test_required_and_optional() {
        assert!(String::required());
        assert!(!Option::<String>::required());
        assert_eq!(Option::<String>::from_raw(None), Ok(None));
        assert_eq!(Option::<String>::from_raw(Some(&RawArgument::Null)), Ok(None));
        assert!(String::from_raw(None).is_err());
    }

    #[test]
    fn test_integer_coercion() {
        assert_eq!(i64::from_raw(Some(&raw(json!(42)))), Ok(42));
        assert_eq!(u32::from_raw(Some(&raw(json!("7")))), Ok(7));
        assert!(u32::from_raw(Some(&raw(json!(-1)))).is_err());
        assert!(i32::from_raw(Some(&raw(json!(1.5)))).is_err());
        assert!(i64::from_raw(Some(&raw(json!(true)))).is_err());
    }

    #[test]
    fn test_type_mismatch_message() {
        let err = String::from_raw(Some(&raw(json!(3)))).unwrap_err();
        assert_eq!(err, "expected a string, got a number");
    }

    #[test]
    fn test_vec_and_json_params() {
        let tags = Vec::<String>::from_raw(Some(&raw(json!(["a", "b"])))).unwrap();
        assert_eq!(tags, vec!["a".to_string(), "b".to_string()]);
        assert!(Vec::<u32>::from_raw(Some(&raw(json!(["x"])))).is_err());

        #[derive(serde::Deserialize, schemars::JsonSchema, Debug, PartialEq)]
        struct Range {
            from: u32,
            to: u32,
        }
        let Json(range) = Json::<Range>::from_raw(Some(&raw(json!({"from": 1, "to": 5})))).unwrap();
        assert_eq!(range, Range { from: 1, to: 5 });
    }

    #[test]
    fn test_json_param_schema_lists_fields() {
        #[derive(serde::Deserialize, schemars::JsonSchema)]
        #[allow(dead_code)]
        struct Window {
            from: u32,
            to: Option<u32>,
        }
        #[derive(serde::Deserialize, schemars::JsonSchema)]
        #[allow(dead_code)]
        struct Query {
            city: String,
            window: Window,
        }

        let schema = object_schema(&[ParamSpec::of::<Json<Query>>("query", "What to look up")]);
        let query = &schema["properties"]["query"];
        assert_eq!(query["type"], "object");
        assert_eq!(query["description"], "What to look up");
        assert_eq!(query["properties"]["city"]["type"], "string");
        assert_eq!(query["properties"]["window"]["properties"]["from"]["type"], "integer");
        assert!(query.get("$schema").is_none());
        assert!(query.get("$defs").is_none());

        let required = query["required"].as_array().unwrap();
        assert!(required.contains(&json!("city")));
        assert!(required.contains(&json!("window")));
    }

    #[test]
    fn test_object_schema_marks_required() {
        let schema = object_schema(&[
            ParamSpec::of::<String>("city", "City name"),
            ParamSpec::of::<Option<u32>>("days", ""),
        ]);
        assert_eq!(schema["properties"]["city"]["type"], "string");
        assert_eq!(schema["properties"]["city"]["description"], "City name");
        assert_eq!(schema["properties"]["days"]["type"], "integer");
        assert_eq!(schema["required"], json!(["city"]));
    }

    #[test]
    fn test_outputs_render() {
        assert_eq!(().into_output().render(), "");
        assert_eq!(21.5f64.into_output().render(), "21.5");
        assert_eq!(json!({"ok": true}).into_output().render(), r#"{"ok":true}"#);
    }
}
