use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::ValidationError;
use crate::parser::ResultParser;

/// Severity classification of an action. Ordered from least to most harmful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Read-only, no side effects.
    Safe,
    /// Creates or modifies data.
    Moderate,
    /// Deletes data.
    Dangerous,
    /// System-level operations.
    Critical,
}

impl RiskLevel {
    pub const ALL: [Self; 4] = [Self::Safe, Self::Moderate, Self::Dangerous, Self::Critical];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Moderate => "moderate",
            Self::Dangerous => "dangerous",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "safe" => Ok(Self::Safe),
            "moderate" => Ok(Self::Moderate),
            "dangerous" => Ok(Self::Dangerous),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown risk level: {other}")),
        }
    }
}

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Argument value supplied by a caller.
///
/// Nested objects and arrays keep their JSON shape; only the top level is
/// checked against the declared parameter type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Boolean(bool),
    Integer(i64),
    String(String),
    Array(Vec<Value>),
    Object(Map<String, Value>),
}

impl ArgValue {
    #[must_use]
    pub fn param_type(&self) -> ParamType {
        match self {
            Self::String(_) => ParamType::String,
            Self::Integer(_) => ParamType::Integer,
            Self::Boolean(_) => ParamType::Boolean,
            Self::Object(_) => ParamType::Object,
            Self::Array(_) => ParamType::Array,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Jinja-style truthiness used by `{% if %}` blocks.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::String(s) => !s.is_empty(),
            Self::Integer(n) => *n != 0,
            Self::Boolean(b) => *b,
            Self::Object(m) => !m.is_empty(),
            Self::Array(a) => !a.is_empty(),
        }
    }

    /// Text form substituted into templates.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Integer(n) => n.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Object(_) | Self::Array(_) => self.to_json().to_string(),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Integer(n) => Value::from(*n),
            Self::Boolean(b) => Value::Bool(*b),
            Self::Object(m) => Value::Object(m.clone()),
            Self::Array(a) => Value::Array(a.clone()),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for ArgValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl TryFrom<Value> for ArgValue {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(Self::String(s)),
            Value::Bool(b) => Ok(Self::Boolean(b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .ok_or_else(|| format!("unsupported number {n}: only integers are accepted")),
            Value::Array(a) => Ok(Self::Array(a)),
            Value::Object(m) => Ok(Self::Object(m)),
            Value::Null => Err("null is not a valid argument value".to_owned()),
        }
    }
}

/// Flat argument mapping, ordered by name so error snapshots are stable.
pub type Arguments = BTreeMap<String, ArgValue>;

/// Convert a JSON object into [`Arguments`].
///
/// # Errors
///
/// Returns a message naming the offending key when the value is not an object
/// or one of its members cannot be represented as an [`ArgValue`].
pub fn arguments_from_json(value: Value) -> Result<Arguments, String> {
    let Value::Object(map) = value else {
        return Err("arguments must be a JSON object".to_owned());
    };
    map.into_iter()
        .map(|(k, v)| {
            ArgValue::try_from(v)
                .map(|v| (k.clone(), v))
                .map_err(|e| format!("argument '{k}': {e}"))
        })
        .collect()
}

/// Schema of a single action parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ArgValue>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<ArgValue>>,
}

fn default_required() -> bool {
    true
}

impl ParameterSpec {
    /// Required parameter without default.
    #[must_use]
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_owned(),
            param_type,
            description: description.to_owned(),
            required: true,
            default: None,
            allowed: None,
        }
    }

    /// Optional parameter, with or without a default.
    #[must_use]
    pub fn optional(
        name: &str,
        param_type: ParamType,
        description: &str,
        default: Option<ArgValue>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            param_type,
            description: description.to_owned(),
            required: false,
            default,
            allowed: None,
        }
    }

    #[must_use]
    pub fn with_enum(mut self, allowed: Vec<ArgValue>) -> Self {
        self.allowed = Some(allowed);
        self
    }

    fn check_value(&self, value: &ArgValue) -> Result<(), ValidationError> {
        if value.param_type() != self.param_type {
            return Err(ValidationError::WrongType {
                parameter: self.name.clone(),
                expected: self.param_type,
                actual: value.param_type(),
            });
        }
        if let Some(allowed) = &self.allowed
            && !allowed.contains(value)
        {
            return Err(ValidationError::NotInEnum {
                parameter: self.name.clone(),
                value: value.render(),
                allowed: allowed.iter().map(ArgValue::render).collect(),
            });
        }
        Ok(())
    }

    fn to_property(&self) -> Value {
        let mut prop = Map::new();
        prop.insert("type".into(), Value::String(self.param_type.as_str().into()));
        prop.insert("description".into(), Value::String(self.description.clone()));
        if let Some(default) = &self.default {
            prop.insert("default".into(), default.to_json());
        }
        if let Some(allowed) = &self.allowed {
            prop.insert(
                "enum".into(),
                Value::Array(allowed.iter().map(ArgValue::to_json).collect()),
            );
        }
        Value::Object(prop)
    }
}

/// Documented input/output pair shipped with an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionExample {
    pub input: Value,
    pub output: Value,
}

/// Static description of one invocable action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDescriptor {
    pub name: String,
    pub description: String,
    pub category: String,
    pub parameters: Vec<ParameterSpec>,
    pub risk_level: RiskLevel,
    pub script_template: String,
    pub result_parser: Option<ResultParser>,
    pub examples: Vec<ActionExample>,
    pub version: String,
    pub author: String,
}

impl ActionDescriptor {
    #[must_use]
    pub fn new(
        name: &str,
        description: &str,
        category: &str,
        risk_level: RiskLevel,
        script_template: &str,
    ) -> Self {
        Self {
            name: name.to_owned(),
            description: description.to_owned(),
            category: category.to_owned(),
            parameters: Vec::new(),
            risk_level,
            script_template: script_template.to_owned(),
            result_parser: None,
            examples: Vec::new(),
            version: "1.0.0".to_owned(),
            author: String::new(),
        }
    }

    #[must_use]
    pub fn with_parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    #[must_use]
    pub fn with_parser(mut self, parser: ResultParser) -> Self {
        self.result_parser = Some(parser);
        self
    }

    #[must_use]
    pub fn with_example(mut self, input: Value, output: Value) -> Self {
        self.examples.push(ActionExample { input, output });
        self
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Check the descriptor's own invariants.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message for the first violated invariant.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_owned());
        }
        let mut seen = HashSet::new();
        for param in &self.parameters {
            if !seen.insert(param.name.as_str()) {
                return Err(format!("duplicate parameter '{}'", param.name));
            }
            if param.required && param.default.is_some() {
                return Err(format!(
                    "required parameter '{}' must not declare a default",
                    param.name
                ));
            }
            if let Some(default) = &param.default {
                param
                    .check_value(default)
                    .map_err(|e| format!("default of '{}' is invalid: {e}", param.name))?;
            }
        }
        Ok(())
    }

    /// Validate caller arguments against the parameter schema.
    ///
    /// Arguments without a matching parameter are passed through untouched.
    ///
    /// # Errors
    ///
    /// Returns the first missing required parameter, type mismatch, or enum violation.
    pub fn validate_arguments(&self, args: &Arguments) -> Result<(), ValidationError> {
        for param in &self.parameters {
            match args.get(&param.name) {
                Some(value) => param.check_value(value)?,
                None if param.required => {
                    return Err(ValidationError::MissingParameter {
                        parameter: param.name.clone(),
                    });
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Supplied arguments overlaid on parameter defaults.
    #[must_use]
    pub fn effective_arguments(&self, args: &Arguments) -> Arguments {
        let mut merged: Arguments = self
            .parameters
            .iter()
            .filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d)))
            .collect();
        merged.extend(args.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// OpenAI function-calling representation.
    #[must_use]
    pub fn to_function_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.to_property()))
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }

    /// Catalog summary used by the JSON export.
    #[must_use]
    pub fn to_summary(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "category": self.category,
            "risk_level": self.risk_level,
            "version": self.version,
            "parameters": self.parameters,
            "examples": self.examples,
        })
    }
}
