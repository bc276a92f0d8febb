//! Builtin decorators.
//!
//! Exported from the `builtin` package of [`builtin_resolver`], so a plugin
//! spec can refer to them as `builtin.upper`, `builtin.redact`, and so on.
//!
//! Text decorators accept either a string message or an object message; for
//! objects the step config `field` (default `message`) names the string
//! field to transform.

use chrono::{DateTime, Utc};
use convert_case::{Case, Casing};
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::decorator::{value_kind, CallOptions, Decorator, DecoratorError};
use crate::locator::FactoryResolver;

/// Package name builtin decorators are exported under.
pub const BUILTIN_PACKAGE: &str = "builtin";

/// Resolver preloaded with every builtin decorator.
pub fn builtin_resolver() -> FactoryResolver {
    let mut resolver = FactoryResolver::new();
    register_builtins(&mut resolver);
    resolver
}

/// Add the builtin package to an existing resolver.
pub fn register_builtins(resolver: &mut FactoryResolver) {
    resolver
        .register_export(BUILTIN_PACKAGE, "upper", || Box::new(UpperCase))
        .register_export(BUILTIN_PACKAGE, "lower", || Box::new(LowerCase))
        .register_export(BUILTIN_PACKAGE, "trim", || Box::new(Trim))
        .register_export(BUILTIN_PACKAGE, "prefix", || Box::new(Prefix::default()))
        .register_export(BUILTIN_PACKAGE, "case", || Box::new(ConvertCase))
        .register_export(BUILTIN_PACKAGE, "redact", || Box::new(Redact::default()))
        .register_export(BUILTIN_PACKAGE, "timestamp", || Box::new(Timestamp::default()))
        .register_export(BUILTIN_PACKAGE, "fields", || Box::new(Fields))
        .register_export(BUILTIN_PACKAGE, "message_id", || Box::new(MessageId::default()));
}

const DEFAULT_FIELD: &str = "message";

fn str_option<'a>(config: &'a JsonValue, key: &str) -> Result<Option<&'a str>, DecoratorError> {
    match config.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s)),
        Some(other) => Err(DecoratorError::InvalidConfig(format!(
            "'{}' must be a string, found {}",
            key,
            value_kind(other)
        ))),
    }
}

/// Apply `f` to a string message, or to the configured field of an object.
fn map_text<F>(message: JsonValue, config: &JsonValue, f: F) -> Result<JsonValue, DecoratorError>
where
    F: FnOnce(&str) -> String,
{
    match message {
        JsonValue::String(s) => Ok(JsonValue::String(f(&s))),
        JsonValue::Object(mut map) => {
            let field = str_option(config, "field")?.unwrap_or(DEFAULT_FIELD);
            match map.get_mut(field) {
                Some(JsonValue::String(s)) => {
                    *s = f(s);
                    Ok(JsonValue::Object(map))
                }
                Some(other) => Err(DecoratorError::InvalidMessage(format!(
                    "field '{}' must be a string, found {}",
                    field,
                    value_kind(other)
                ))),
                None => Err(DecoratorError::InvalidMessage(format!(
                    "field '{}' is missing",
                    field
                ))),
            }
        }
        other => Err(DecoratorError::InvalidMessage(format!(
            "expected a string or object, found {}",
            value_kind(&other)
        ))),
    }
}

fn expect_object(message: JsonValue) -> Result<Map<String, JsonValue>, DecoratorError> {
    match message {
        JsonValue::Object(map) => Ok(map),
        other => Err(DecoratorError::InvalidMessage(format!(
            "expected an object, found {}",
            value_kind(&other)
        ))),
    }
}

/// Uppercases text.
#[derive(Debug, Default)]
pub struct UpperCase;

impl Decorator for UpperCase {
    fn configure(&mut self, _config: &JsonValue) -> Result<(), DecoratorError> {
        Ok(())
    }

    fn decorate(&self, message: JsonValue, config: &JsonValue, _options: &CallOptions) -> Result<JsonValue, DecoratorError> {
        map_text(message, config, str::to_uppercase)
    }
}

/// Lowercases text.
#[derive(Debug, Default)]
pub struct LowerCase;

impl Decorator for LowerCase {
    fn configure(&mut self, _config: &JsonValue) -> Result<(), DecoratorError> {
        Ok(())
    }

    fn decorate(&self, message: JsonValue, config: &JsonValue, _options: &CallOptions) -> Result<JsonValue, DecoratorError> {
        map_text(message, config, str::to_lowercase)
    }
}

/// Strips leading and trailing whitespace.
#[derive(Debug, Default)]
pub struct Trim;

impl Decorator for Trim {
    fn configure(&mut self, _config: &JsonValue) -> Result<(), DecoratorError> {
        Ok(())
    }

    fn decorate(&self, message: JsonValue, config: &JsonValue, _options: &CallOptions) -> Result<JsonValue, DecoratorError> {
        map_text(message, config, |s| s.trim().to_string())
    }
}

/// Prepends `text`. The step config's `text` overrides the configured one.
#[derive(Debug, Default)]
pub struct Prefix {
    text: String,
}

impl Decorator for Prefix {
    fn configure(&mut self, config: &JsonValue) -> Result<(), DecoratorError> {
        self.text = str_option(config, "text")?.unwrap_or_default().to_string();
        Ok(())
    }

    fn decorate(&self, message: JsonValue, config: &JsonValue, _options: &CallOptions) -> Result<JsonValue, DecoratorError> {
        let text = str_option(config, "text")?.unwrap_or(self.text.as_str());
        map_text(message, config, |s| format!("{}{}", text, s))
    }
}

/// Converts text to the case named by the step config's `case`.
#[derive(Debug, Default)]
pub struct ConvertCase;

fn parse_case(name: &str) -> Result<Case, DecoratorError> {
    let case = match name {
        "snake" => Case::Snake,
        "kebab" => Case::Kebab,
        "camel" => Case::Camel,
        "pascal" => Case::Pascal,
        "title" => Case::Title,
        "upper" => Case::Upper,
        "lower" => Case::Lower,
        "constant" => Case::UpperSnake,
        other => {
            return Err(DecoratorError::InvalidConfig(format!(
                "unknown case '{}'",
                other
            )))
        }
    };
    Ok(case)
}

impl Decorator for ConvertCase {
    fn configure(&mut self, _config: &JsonValue) -> Result<(), DecoratorError> {
        Ok(())
    }

    fn decorate(&self, message: JsonValue, config: &JsonValue, _options: &CallOptions) -> Result<JsonValue, DecoratorError> {
        let name = str_option(config, "case")?
            .ok_or_else(|| DecoratorError::InvalidConfig("'case' is required".to_string()))?;
        let case = parse_case(name)?;
        map_text(message, config, |s| s.to_case(case))
    }
}

/// Replaces every match of a pattern in every string of the message.
///
/// The pattern is compiled once, at configure time.
#[derive(Debug, Default)]
pub struct Redact {
    pattern: Option<Regex>,
    replacement: String,
}

const DEFAULT_REDACTION: &str = "[REDACTED]";

impl Redact {
    fn redact(&self, pattern: &Regex, value: JsonValue) -> JsonValue {
        match value {
            JsonValue::String(s) => {
                JsonValue::String(pattern.replace_all(&s, self.replacement.as_str()).into_owned())
            }
            JsonValue::Array(items) => {
                JsonValue::Array(items.into_iter().map(|v| self.redact(pattern, v)).collect())
            }
            JsonValue::Object(map) => JsonValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, self.redact(pattern, v)))
                    .collect(),
            ),
            other => other,
        }
    }
}

impl Decorator for Redact {
    fn configure(&mut self, config: &JsonValue) -> Result<(), DecoratorError> {
        let pattern = str_option(config, "pattern")?
            .ok_or_else(|| DecoratorError::InvalidConfig("'pattern' is required".to_string()))?;
        let regex = Regex::new(pattern)
            .map_err(|e| DecoratorError::InvalidConfig(format!("invalid pattern: {}", e)))?;

        self.pattern = Some(regex);
        self.replacement = str_option(config, "replacement")?
            .unwrap_or(DEFAULT_REDACTION)
            .to_string();
        Ok(())
    }

    fn decorate(&self, message: JsonValue, _config: &JsonValue, _options: &CallOptions) -> Result<JsonValue, DecoratorError> {
        let pattern = self
            .pattern
            .as_ref()
            .ok_or_else(|| DecoratorError::ExecutionError("redact used before configure".to_string()))?;
        Ok(self.redact(pattern, message))
    }
}

/// Stamps messages with the write time.
///
/// Uses the `timestamp` call option (RFC 3339) when present, otherwise the
/// current UTC time. Strings become `"[ts] message"`; objects get the time
/// under `field` (default `timestamp`).
#[derive(Debug, Default)]
pub struct Timestamp {
    format: Option<String>,
}

impl Timestamp {
    fn now(options: &CallOptions) -> Result<DateTime<Utc>, DecoratorError> {
        match options.get("timestamp").and_then(|v| v.as_str()) {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| DecoratorError::InvalidMessage(format!("invalid timestamp option: {}", e))),
            None => Ok(Utc::now()),
        }
    }

    fn render(&self, time: DateTime<Utc>) -> String {
        match &self.format {
            Some(format) => time.format(format).to_string(),
            None => time.to_rfc3339(),
        }
    }
}

impl Decorator for Timestamp {
    fn configure(&mut self, config: &JsonValue) -> Result<(), DecoratorError> {
        self.format = str_option(config, "format")?.map(str::to_string);
        Ok(())
    }

    fn decorate(&self, message: JsonValue, config: &JsonValue, options: &CallOptions) -> Result<JsonValue, DecoratorError> {
        let stamp = self.render(Self::now(options)?);

        match message {
            JsonValue::String(s) => Ok(JsonValue::String(format!("[{}] {}", stamp, s))),
            JsonValue::Object(mut map) => {
                let field = str_option(config, "field")?.unwrap_or("timestamp");
                map.insert(field.to_string(), JsonValue::String(stamp));
                Ok(JsonValue::Object(map))
            }
            other => Err(DecoratorError::InvalidMessage(format!(
                "expected a string or object, found {}",
                value_kind(&other)
            ))),
        }
    }
}

/// Merges the step config's `fields` object into object messages.
///
/// Existing keys are overwritten.
#[derive(Debug, Default)]
pub struct Fields;

impl Decorator for Fields {
    fn configure(&mut self, _config: &JsonValue) -> Result<(), DecoratorError> {
        Ok(())
    }

    fn decorate(&self, message: JsonValue, config: &JsonValue, _options: &CallOptions) -> Result<JsonValue, DecoratorError> {
        let mut map = expect_object(message)?;
        match config.get("fields") {
            None => {}
            Some(JsonValue::Object(fields)) => {
                for (key, value) in fields {
                    map.insert(key.clone(), value.clone());
                }
            }
            Some(other) => {
                return Err(DecoratorError::InvalidConfig(format!(
                    "'fields' must be an object, found {}",
                    value_kind(other)
                )))
            }
        }
        Ok(JsonValue::Object(map))
    }
}

/// Assigns a random UUID to object messages that lack one.
#[derive(Debug)]
pub struct MessageId {
    field: String,
}

impl Default for MessageId {
    fn default() -> Self {
        Self {
            field: "id".to_string(),
        }
    }
}

impl Decorator for MessageId {
    fn configure(&mut self, config: &JsonValue) -> Result<(), DecoratorError> {
        if let Some(field) = str_option(config, "field")? {
            self.field = field.to_string();
        }
        Ok(())
    }

    fn decorate(&self, message: JsonValue, _config: &JsonValue, _options: &CallOptions) -> Result<JsonValue, DecoratorError> {
        let mut map = expect_object(message)?;
        map.entry(self.field.clone())
            .or_insert_with(|| JsonValue::String(Uuid::new_v4().to_string()));
        Ok(JsonValue::Object(map))
    }
}
