//! Per-tool argument schemas and validation.
//!
//! Tool arguments arrive from the model as a JSON string. They are parsed
//! against the tool's [`ArgumentSchema`] before anything reaches a backend:
//! unknown fields, missing required fields, wrong types and pattern
//! mismatches are all reported back as [`ToolError::InvalidInput`].

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::{Map, Value, json};

use super::ToolError;

/// Scalar type of an argument field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl FieldKind {
    fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

/// One named argument.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub description: String,
    pub required: bool,
    pattern: Option<Regex>,
}

impl FieldSpec {
    /// An optional field.
    pub fn new(name: impl Into<String>, kind: FieldKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
            pattern: None,
        }
    }

    /// An optional string field.
    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String, description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Constrain a string field to values fully matching `pattern`.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.pattern = Some(Regex::new(&format!("^(?:{pattern})$"))?);
        Ok(self)
    }

    /// The anchored pattern, if any.
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_ref().map(Regex::as_str)
    }

    fn check(&self, value: &Value) -> Result<(), String> {
        if !self.kind.accepts(value) {
            return Err(format!(
                "field `{}` must be {} {}",
                self.name,
                article(self.kind.json_type()),
                self.kind.json_type()
            ));
        }

        if let Some(text) = value.as_str() {
            if self.required && text.trim().is_empty() {
                return Err(format!("field `{}` must not be empty", self.name));
            }
            if let Some(pattern) = &self.pattern {
                if !pattern.is_match(text) {
                    return Err(format!(
                        "field `{}` value {text:?} does not match {}",
                        self.name,
                        pattern.as_str()
                    ));
                }
            }
        }

        Ok(())
    }
}

fn article(word: &str) -> &'static str {
    if word.starts_with(['a', 'e', 'i', 'o', 'u']) {
        "an"
    } else {
        "a"
    }
}

/// The declared argument shape of a tool.
#[derive(Debug, Clone, Default)]
pub struct ArgumentSchema {
    fields: Vec<FieldSpec>,
}

impl ArgumentSchema {
    /// A schema with no arguments.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Render as a JSON Schema object for the model's tool catalog.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut property = json!({
                "type": field.kind.json_type(),
                "description": field.description,
            });
            if let (Some(pattern), Some(obj)) = (field.pattern(), property.as_object_mut()) {
                obj.insert("pattern".into(), Value::String(pattern.to_string()));
            }
            properties.insert(field.name.clone(), property);
        }

        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Parse a raw argument payload.
    ///
    /// Keys listed in `reserved` are dropped without complaint: their values
    /// come from the caller context, never from the model.
    pub fn validate(&self, raw: &str, reserved: &[&str]) -> Result<ToolArguments, ToolError> {
        let object = parse_object(raw)?;
        let mut problems = Vec::new();

        for key in object.keys() {
            if reserved.contains(&key.as_str()) {
                continue;
            }
            if !self.fields.iter().any(|f| &f.name == key) {
                problems.push(format!("unexpected field `{key}`"));
            }
        }

        let mut values = BTreeMap::new();
        for field in &self.fields {
            if reserved.contains(&field.name.as_str()) {
                continue;
            }
            match object.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        problems.push(format!("missing required field `{}`", field.name));
                    }
                }
                Some(value) => match field.check(value) {
                    Ok(()) => {
                        values.insert(field.name.clone(), value.clone());
                    }
                    Err(problem) => problems.push(problem),
                },
            }
        }

        if problems.is_empty() {
            Ok(ToolArguments(values))
        } else {
            Err(ToolError::InvalidInput(problems.join("; ")))
        }
    }
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, ToolError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }

    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ToolError::InvalidInput(format!("arguments are not valid JSON: {e}")))?;

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(ToolError::InvalidInput(
            "arguments must be a JSON object".into(),
        )),
    }
}

/// Validated arguments for one call, plus any injected context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments(BTreeMap<String, Value>);

impl ToolArguments {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a context value, replacing anything already there.
    pub fn inject(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), Value::String(value.into()));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as query parameters.
    pub fn to_query(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), text)
            })
            .collect()
    }
}
