use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ParseError;

type ParseFn = dyn Fn(&str) -> Result<Value, ParseError> + Send + Sync;

/// Strict JSON decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonParser;

impl JsonParser {
    /// # Errors
    ///
    /// Returns [`ParseError`] carrying the original text if it is not valid JSON.
    pub fn parse(self, text: &str) -> Result<Value, ParseError> {
        serde_json::from_str(text).map_err(|e| ParseError::new("json", e.to_string(), text))
    }
}

/// Splits on a delimiter, optionally zipping the parts with field names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedParser {
    delimiter: String,
    fields: Option<Vec<String>>,
}

impl Default for DelimitedParser {
    fn default() -> Self {
        Self {
            delimiter: "|".to_owned(),
            fields: None,
        }
    }
}

impl DelimitedParser {
    /// # Errors
    ///
    /// Returns an error message if `delimiter` is empty.
    pub fn new(delimiter: impl Into<String>, fields: Option<Vec<String>>) -> Result<Self, String> {
        let delimiter = delimiter.into();
        if delimiter.is_empty() {
            return Err("delimiter must not be empty".into());
        }
        Ok(Self { delimiter, fields })
    }

    #[must_use]
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    #[must_use]
    pub fn fields(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }

    #[must_use]
    pub fn parse(&self, text: &str) -> Value {
        let parts = text.split(self.delimiter.as_str());
        match &self.fields {
            Some(fields) => Value::Object(
                fields
                    .iter()
                    .zip(parts)
                    .map(|(name, part)| (name.clone(), Value::String(part.to_owned())))
                    .collect(),
            ),
            None => Value::Array(parts.map(|p| Value::String(p.to_owned())).collect()),
        }
    }
}

/// Extracts capture groups from the first match.
#[derive(Debug, Clone)]
pub struct RegexParser {
    regex: Regex,
    group_names: Option<Vec<String>>,
}

impl PartialEq for RegexParser {
    fn eq(&self, other: &Self) -> bool {
        self.regex.as_str() == other.regex.as_str() && self.group_names == other.group_names
    }
}

impl RegexParser {
    /// # Errors
    ///
    /// Returns the compiler's message if `pattern` is not a valid regex.
    pub fn new(pattern: &str, group_names: Option<Vec<String>>) -> Result<Self, String> {
        let regex = Regex::new(pattern).map_err(|e| e.to_string())?;
        Ok(Self { regex, group_names })
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    #[must_use]
    pub fn group_names(&self) -> Option<&[String]> {
        self.group_names.as_deref()
    }

    /// # Errors
    ///
    /// Returns [`ParseError`] when the pattern does not match `text`.
    pub fn parse(&self, text: &str) -> Result<Value, ParseError> {
        let caps = self.regex.captures(text).ok_or_else(|| {
            ParseError::new(
                "regex",
                format!("pattern {:?} did not match", self.regex.as_str()),
                text,
            )
        })?;

        let group = |i: usize| {
            caps.get(i)
                .map_or(Value::Null, |m| Value::String(m.as_str().to_owned()))
        };

        if let Some(names) = &self.group_names {
            let map: Map<String, Value> = names
                .iter()
                .enumerate()
                .take(caps.len().saturating_sub(1))
                .map(|(i, name)| (name.clone(), group(i + 1)))
                .collect();
            return Ok(Value::Object(map));
        }

        let named: Vec<(usize, &str)> = self
            .regex
            .capture_names()
            .enumerate()
            .filter_map(|(i, n)| n.map(|n| (i, n)))
            .collect();
        if !named.is_empty() {
            return Ok(Value::Object(
                named
                    .into_iter()
                    .map(|(i, name)| (name.to_owned(), group(i)))
                    .collect(),
            ));
        }

        Ok(Value::Array((1..caps.len()).map(group).collect()))
    }
}

/// `true`, `yes` or `1` (case-insensitive) map to `true`; everything else to `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BooleanParser;

impl BooleanParser {
    #[must_use]
    pub fn parse(self, text: &str) -> bool {
        matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "1"
        )
    }
}

/// Named caller-supplied parse function.
#[derive(Clone)]
pub struct CustomParser {
    name: String,
    func: Arc<ParseFn>,
}

impl CustomParser {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> Result<Value, ParseError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// # Errors
    ///
    /// Propagates whatever the wrapped function returns.
    pub fn parse(&self, text: &str) -> Result<Value, ParseError> {
        (self.func)(text)
    }
}

impl fmt::Debug for CustomParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomParser")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for CustomParser {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.func, &other.func)
    }
}

/// Strategy that turns a script's trimmed stdout into a structured value.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultParser {
    Json(JsonParser),
    Delimited(DelimitedParser),
    Regex(RegexParser),
    Boolean(BooleanParser),
    Custom(CustomParser),
}

impl ResultParser {
    #[must_use]
    pub fn json() -> Self {
        Self::Json(JsonParser)
    }

    #[must_use]
    pub fn boolean() -> Self {
        Self::Boolean(BooleanParser)
    }

    /// # Errors
    ///
    /// Returns an error message if `delimiter` is empty.
    pub fn delimited(delimiter: &str, fields: Option<Vec<String>>) -> Result<Self, String> {
        DelimitedParser::new(delimiter, fields).map(Self::Delimited)
    }

    /// # Errors
    ///
    /// Returns the compiler's message if `pattern` is invalid.
    pub fn regex(pattern: &str, group_names: Option<Vec<String>>) -> Result<Self, String> {
        RegexParser::new(pattern, group_names).map(Self::Regex)
    }

    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> Result<Value, ParseError> + Send + Sync + 'static,
    {
        Self::Custom(CustomParser::new(name, func))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Json(_) => "json",
            Self::Delimited(_) => "delimited",
            Self::Regex(_) => "regex",
            Self::Boolean(_) => "boolean",
            Self::Custom(c) => c.name(),
        }
    }

    /// # Errors
    ///
    /// Returns [`ParseError`] if the text does not have the expected shape.
    pub fn parse(&self, text: &str) -> Result<Value, ParseError> {
        match self {
            Self::Json(p) => p.parse(text),
            Self::Delimited(p) => Ok(p.parse(text)),
            Self::Regex(p) => p.parse(text),
            Self::Boolean(p) => Ok(Value::Bool(p.parse(text))),
            Self::Custom(p) => p.parse(text),
        }
    }
}

fn default_delimiter() -> String {
    "|".to_owned()
}

/// Serializable parser description used in catalog files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParserConfig {
    Json,
    Delimited {
        #[serde(default = "default_delimiter")]
        delimiter: String,
        #[serde(default)]
        fields: Option<Vec<String>>,
    },
    Regex {
        pattern: String,
        #[serde(default)]
        groups: Option<Vec<String>>,
    },
    Boolean,
}

impl TryFrom<ParserConfig> for ResultParser {
    type Error = String;

    fn try_from(config: ParserConfig) -> Result<Self, Self::Error> {
        match config {
            ParserConfig::Json => Ok(Self::json()),
            ParserConfig::Boolean => Ok(Self::boolean()),
            ParserConfig::Delimited { delimiter, fields } => Self::delimited(&delimiter, fields),
            ParserConfig::Regex { pattern, groups } => Self::regex(&pattern, groups),
        }
    }
}

impl ResultParser {
    /// Catalog description of this parser. Custom parsers have none.
    #[must_use]
    pub fn to_config(&self) -> Option<ParserConfig> {
        match self {
            Self::Json(_) => Some(ParserConfig::Json),
            Self::Boolean(_) => Some(ParserConfig::Boolean),
            Self::Delimited(p) => Some(ParserConfig::Delimited {
                delimiter: p.delimiter.clone(),
                fields: p.fields.clone(),
            }),
            Self::Regex(p) => Some(ParserConfig::Regex {
                pattern: p.pattern().to_owned(),
                groups: p.group_names.clone(),
            }),
            Self::Custom(_) => None,
        }
    }
}
