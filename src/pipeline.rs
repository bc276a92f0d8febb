//! Compiled decoration pipelines.
//!
//! A pipeline is the left-to-right composition of the decoration rules of one
//! transport identifier. Each step is bound to its plugin instance and its
//! step config when the pipeline is compiled; nothing is looked up per write.

use std::fmt;
use std::sync::Arc;
use serde_json::{Map, Value as JsonValue};

use crate::decorator::{value_kind, CallOptions, DecoratorError, Plugin};

/// Error raised while running a message through a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A step returned an error
    Step {
        decorator: String,
        source: DecoratorError,
    },

    /// A step returned a value of a different JSON kind than it received
    KindMismatch {
        decorator: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Step { decorator, source } => {
                write!(f, "Decorator '{}' failed: {}", decorator, source)
            }
            PipelineError::KindMismatch { decorator, expected, found } => write!(
                f,
                "Decorator '{}' returned {} for {} input",
                decorator, found, expected
            ),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Step { source, .. } => Some(source),
            PipelineError::KindMismatch { .. } => None,
        }
    }
}

/// A step bound to its plugin instance and step config at compile time.
struct BoundStep {
    plugin: Arc<Plugin>,
    config: JsonValue,
}

/// Composed `(message, options) -> message` function for one identifier.
pub struct Pipeline {
    identifier: String,
    steps: Vec<String>,
    bound: Vec<BoundStep>,
}

impl Pipeline {
    /// Compose `steps` left to right.
    ///
    /// Step `i` receives the output of step `i - 1`; the first step receives
    /// the original message. A missing step config is bound as `{}`.
    pub fn compile(
        identifier: impl Into<String>,
        steps: Vec<(Arc<Plugin>, Option<JsonValue>)>,
    ) -> Self {
        let identifier = identifier.into();
        let names = steps.iter().map(|(plugin, _)| plugin.name().to_string()).collect();

        let bound = steps
            .into_iter()
            .map(|(plugin, config)| BoundStep {
                plugin,
                config: config.unwrap_or_else(|| JsonValue::Object(Map::new())),
            })
            .collect();

        Self {
            identifier,
            steps: names,
            bound,
        }
    }

    /// Run a message through every step.
    pub fn apply(&self, message: JsonValue, options: &CallOptions) -> Result<JsonValue, PipelineError> {
        self.bound.iter().try_fold(message, |input, step| {
            run_step(&step.plugin, &step.config, input, options)
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Decorator names in application order.
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("identifier", &self.identifier)
            .field("steps", &self.steps)
            .finish()
    }
}

fn run_step(
    plugin: &Plugin,
    config: &JsonValue,
    input: JsonValue,
    options: &CallOptions,
) -> Result<JsonValue, PipelineError> {
    let expected = value_kind(&input);

    let output = plugin
        .decorate(input, config, options)
        .map_err(|source| PipelineError::Step {
            decorator: plugin.name().to_string(),
            source,
        })?;

    let found = value_kind(&output);
    if found != expected {
        return Err(PipelineError::KindMismatch {
            decorator: plugin.name().to_string(),
            expected,
            found,
        });
    }

    tracing::trace!("Decorator '{}' applied", plugin.name());
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorator::ClosureDecorator;
    use serde_json::json;

    /// Appends `config.tag` to string messages.
    fn tagger(name: &str) -> Arc<Plugin> {
        let decorator = ClosureDecorator::new()
            .on_configure(|_| Ok(()))
            .on_decorate(|m, cfg, _| {
                let tag = cfg.get("tag").and_then(|v| v.as_str()).unwrap_or("?");
                Ok(json!(format!("{}{}", m.as_str().unwrap_or_default(), tag)))
            });
        Arc::new(Plugin::new(name, Box::new(decorator)))
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let pipeline = Pipeline::compile("console", vec![]);

        assert!(pipeline.is_empty());
        let out = pipeline.apply(json!({"a": 1}), &CallOptions::new()).unwrap();
        assert_eq!(out, json!({"a": 1}));
    }

    #[test]
    fn test_composition_is_left_to_right() {
        let pipeline = Pipeline::compile(
            "file",
            vec![
                (tagger("a"), Some(json!({"tag": "A"}))),
                (tagger("b"), Some(json!({"tag": "B"}))),
            ],
        );

        let out = pipeline.apply(json!("m"), &CallOptions::new()).unwrap();

        assert_eq!(out, json!("mAB"));
        assert_eq!(pipeline.steps(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_missing_step_config_is_empty_object() {
        let plugin = Arc::new(Plugin::new(
            "echo_config",
            Box::new(
                ClosureDecorator::new()
                    .on_configure(|_| Ok(()))
                    .on_decorate(|_, cfg, _| Ok(json!(cfg.to_string()))),
            ),
        ));
        let pipeline = Pipeline::compile("x", vec![(plugin, None)]);

        assert_eq!(pipeline.apply(json!(""), &CallOptions::new()).unwrap(), json!("{}"));
    }

    #[test]
    fn test_options_reach_every_step() {
        let plugin = Arc::new(Plugin::new(
            "opt",
            Box::new(
                ClosureDecorator::new()
                    .on_configure(|_| Ok(()))
                    .on_decorate(|m, _, opts| {
                        let n = opts.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
                        Ok(json!(m.as_i64().unwrap_or(0) + n))
                    }),
            ),
        ));
        let pipeline = Pipeline::compile("x", vec![(Arc::clone(&plugin), None), (plugin, None)]);

        let mut options = CallOptions::new();
        options.insert("n".to_string(), json!(5));

        assert_eq!(pipeline.apply(json!(1), &options).unwrap(), json!(11));
    }

    #[test]
    fn test_long_pipeline_runs_every_step() {
        let plugin = Arc::new(Plugin::new(
            "inc",
            Box::new(
                ClosureDecorator::new()
                    .on_configure(|_| Ok(()))
                    .on_decorate(|m, _, _| Ok(json!(m.as_i64().unwrap_or(0) + 1))),
            ),
        ));
        let steps = (0..100_000).map(|_| (Arc::clone(&plugin), None)).collect();
        let pipeline = Pipeline::compile("x", steps);

        assert_eq!(pipeline.len(), 100_000);
        assert_eq!(pipeline.apply(json!(0), &CallOptions::new()).unwrap(), json!(100_000));
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let plugin = Arc::new(Plugin::new(
            "to_number",
            Box::new(
                ClosureDecorator::new()
                    .on_configure(|_| Ok(()))
                    .on_decorate(|_, _, _| Ok(json!(1))),
            ),
        ));
        let pipeline = Pipeline::compile("x", vec![(plugin, None)]);

        let err = pipeline.apply(json!("text"), &CallOptions::new()).unwrap_err();

        assert_eq!(
            err,
            PipelineError::KindMismatch {
                decorator: "to_number".to_string(),
                expected: "string",
                found: "number",
            }
        );
    }

    #[test]
    fn test_step_error_names_decorator() {
        let plugin = Arc::new(Plugin::new(
            "boom",
            Box::new(
                ClosureDecorator::new()
                    .on_configure(|_| Ok(()))
                    .on_decorate(|_, _, _| Err(DecoratorError::ExecutionError("bad".to_string()))),
            ),
        ));
        let pipeline = Pipeline::compile("x", vec![(plugin, None)]);

        let err = pipeline.apply(json!("text"), &CallOptions::new()).unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(err.to_string().contains("bad"));
    }
}
