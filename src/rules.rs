//! Decoration rules and the rule compiler.
//!
//! Rules are declared per transport identifier as an ordered list of
//! `{ decoratorName, config? }` entries. Every rule of an identifier is
//! validated against the registered plugins before the identifier's rules are
//! stored and its pipeline is compiled.

use std::fmt;
use std::sync::Arc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::decorator::{value_kind, Plugin};
use crate::pipeline::Pipeline;

/// One step of a pipeline: which decorator to apply and with what config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecorationRule {
    /// Name of a registered plugin
    #[serde(rename = "decoratorName", alias = "decorator_name", default)]
    pub decorator_name: String,

    /// Step-level config handed to `decorate` on every write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<JsonValue>,
}

impl DecorationRule {
    pub fn new(decorator_name: impl Into<String>) -> Self {
        Self {
            decorator_name: decorator_name.into(),
            config: None,
        }
    }

    pub fn with_config(mut self, config: JsonValue) -> Self {
        self.config = Some(config);
        self
    }
}

/// Error type for rule loading
#[derive(Debug, Clone, PartialEq)]
pub enum RuleError {
    NotASequence {
        identifier: String,
        found: &'static str,
    },
    InvalidRule {
        identifier: String,
        index: usize,
        reason: String,
    },
    EmptyDecoratorName {
        identifier: String,
        index: usize,
    },
    UnknownDecorator {
        identifier: String,
        decorator: String,
    },
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::NotASequence { identifier, found } => write!(
                f,
                "Rules for '{}' must be a list, found {}",
                identifier, found
            ),
            RuleError::InvalidRule { identifier, index, reason } => {
                write!(f, "Rule {} for '{}' is invalid: {}", index, identifier, reason)
            }
            RuleError::EmptyDecoratorName { identifier, index } => write!(
                f,
                "Rule {} for '{}' has an empty 'decoratorName'",
                index, identifier
            ),
            RuleError::UnknownDecorator { identifier, decorator } => write!(
                f,
                "Rules for '{}' reference undefined decorator '{}'",
                identifier, decorator
            ),
        }
    }
}

impl std::error::Error for RuleError {}

/// Validate the raw rule value of one identifier.
///
/// # Returns
/// The parsed rules paired with the plugin each one references
pub fn validate_rules(
    identifier: &str,
    value: &JsonValue,
    plugins: &IndexMap<String, Arc<Plugin>>,
) -> Result<Vec<(DecorationRule, Arc<Plugin>)>, RuleError> {
    let entries = value.as_array().ok_or_else(|| RuleError::NotASequence {
        identifier: identifier.to_string(),
        found: value_kind(value),
    })?;

    let mut validated = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let rule: DecorationRule =
            serde_json::from_value(entry.clone()).map_err(|e| RuleError::InvalidRule {
                identifier: identifier.to_string(),
                index,
                reason: e.to_string(),
            })?;

        if let Some(config) = rule.config.as_ref().filter(|c| !c.is_object()) {
            return Err(RuleError::InvalidRule {
                identifier: identifier.to_string(),
                index,
                reason: format!("'config' must be an object, found {}", value_kind(config)),
            });
        }

        if rule.decorator_name.is_empty() {
            return Err(RuleError::EmptyDecoratorName {
                identifier: identifier.to_string(),
                index,
            });
        }

        let plugin = plugins
            .get(&rule.decorator_name)
            .cloned()
            .ok_or_else(|| RuleError::UnknownDecorator {
                identifier: identifier.to_string(),
                decorator: rule.decorator_name.clone(),
            })?;

        validated.push((rule, plugin));
    }

    Ok(validated)
}

/// Validate and compile rule specs, one identifier at a time, in order.
///
/// An identifier's rules and pipeline are replaced only after all of its
/// rules validate. Identifiers processed before a failing one stay loaded.
pub(crate) fn load_rules(
    rules: &mut IndexMap<String, Vec<DecorationRule>>,
    pipelines: &mut IndexMap<String, Arc<Pipeline>>,
    plugins: &IndexMap<String, Arc<Plugin>>,
    specs: &IndexMap<String, JsonValue>,
) -> Result<usize, RuleError> {
    let mut count = 0;

    for (identifier, value) in specs {
        let validated = validate_rules(identifier, value, plugins)?;

        let steps = validated
            .iter()
            .map(|(rule, plugin)| (Arc::clone(plugin), rule.config.clone()))
            .collect();
        let pipeline = Pipeline::compile(identifier.clone(), steps);

        tracing::info!(
            "Compiled pipeline for '{}': [{}]",
            identifier,
            pipeline.steps().join(", ")
        );

        rules.insert(
            identifier.clone(),
            validated.into_iter().map(|(rule, _)| rule).collect(),
        );
        if pipelines.insert(identifier.clone(), Arc::new(pipeline)).is_some() {
            tracing::warn!("Pipeline for '{}' replaced an existing one", identifier);
        }
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorator::ClosureDecorator;
    use serde_json::json;

    fn plugins(names: &[&str]) -> IndexMap<String, Arc<Plugin>> {
        names
            .iter()
            .map(|name| {
                let decorator = ClosureDecorator::new()
                    .on_configure(|_| Ok(()))
                    .on_decorate(|m, _, _| Ok(m));
                (name.to_string(), Arc::new(Plugin::new(*name, Box::new(decorator))))
            })
            .collect()
    }

    #[test]
    fn test_rule_accepts_both_key_styles() {
        let camel: DecorationRule = serde_json::from_value(json!({"decoratorName": "upper"})).unwrap();
        let snake: DecorationRule =
            serde_json::from_value(json!({"decorator_name": "upper", "config": {"x": 1}})).unwrap();

        assert_eq!(camel, DecorationRule::new("upper"));
        assert_eq!(snake, DecorationRule::new("upper").with_config(json!({"x": 1})));
    }

    #[test]
    fn test_validate_rejects_non_sequence() {
        let err = validate_rules("console", &json!({"decoratorName": "upper"}), &plugins(&["upper"]))
            .unwrap_err();

        assert_eq!(
            err,
            RuleError::NotASequence {
                identifier: "console".to_string(),
                found: "object",
            }
        );
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let err = validate_rules("console", &json!([{"config": {}}]), &plugins(&["upper"])).unwrap_err();

        assert!(matches!(err, RuleError::EmptyDecoratorName { index: 0, .. }));
    }

    #[test]
    fn test_validate_rejects_unknown_decorator() {
        let err = validate_rules(
            "console",
            &json!([{"decoratorName": "upper"}, {"decoratorName": "missing"}]),
            &plugins(&["upper"]),
        )
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("console"));
        assert!(message.contains("missing"));
    }

    #[test]
    fn test_validate_rejects_malformed_entry() {
        let err = validate_rules("console", &json!(["upper"]), &plugins(&["upper"])).unwrap_err();

        assert!(matches!(err, RuleError::InvalidRule { index: 0, .. }));
    }

    #[test]
    fn test_validate_rejects_non_object_config() {
        let err = validate_rules(
            "console",
            &json!([{"decoratorName": "upper", "config": 5}]),
            &plugins(&["upper"]),
        )
        .unwrap_err();

        assert!(matches!(err, RuleError::InvalidRule { index: 0, .. }));
        assert!(err.to_string().contains("console"));
        assert!(err.to_string().contains("must be an object"));
    }

    #[test]
    fn test_load_rules_replaces_pipeline_on_reload() {
        let plugins = plugins(&["upper", "lower"]);
        let mut rules = IndexMap::new();
        let mut pipelines = IndexMap::new();

        let mut first = IndexMap::new();
        first.insert("console".to_string(), json!([{"decoratorName": "upper"}]));
        load_rules(&mut rules, &mut pipelines, &plugins, &first).unwrap();
        let before = Arc::clone(&pipelines["console"]);

        let mut second = IndexMap::new();
        second.insert("console".to_string(), json!([{"decoratorName": "lower"}]));
        load_rules(&mut rules, &mut pipelines, &plugins, &second).unwrap();

        assert_eq!(rules["console"], vec![DecorationRule::new("lower")]);
        assert_eq!(pipelines["console"].steps(), &["lower".to_string()]);
        assert!(!Arc::ptr_eq(&before, &pipelines["console"]));
        assert_eq!(before.steps(), &["upper".to_string()]);
    }

    #[test]
    fn test_load_rules_keeps_previous_pipeline_on_failure() {
        let plugins = plugins(&["upper"]);
        let mut rules = IndexMap::new();
        let mut pipelines = IndexMap::new();

        let mut good = IndexMap::new();
        good.insert("console".to_string(), json!([{"decoratorName": "upper"}]));
        load_rules(&mut rules, &mut pipelines, &plugins, &good).unwrap();

        let mut bad = IndexMap::new();
        bad.insert("console".to_string(), json!([{"decoratorName": "missing"}]));
        assert!(load_rules(&mut rules, &mut pipelines, &plugins, &bad).is_err());

        assert_eq!(rules["console"], vec![DecorationRule::new("upper")]);
        assert_eq!(pipelines["console"].steps(), &["upper".to_string()]);
    }
}
