//! Decorator contract for transformer plugins.
//!
//! A decorator is configured once when it is loaded and is then called for
//! every message written through a transport whose pipeline references it.

use std::fmt;
use serde_json::{Map, Value};

/// Per-write options passed alongside a message.
///
/// Forwarded unmodified to the underlying transport after decoration.
pub type CallOptions = Map<String, Value>;

/// Error type for decorator operations
#[derive(Debug, Clone, PartialEq)]
pub enum DecoratorError {
    InvalidConfig(String),
    InvalidMessage(String),
    ExecutionError(String),
    NotSupported(&'static str),
}

impl fmt::Display for DecoratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecoratorError::InvalidConfig(msg) => write!(f, "Invalid config: {}", msg),
            DecoratorError::InvalidMessage(msg) => write!(f, "Invalid message: {}", msg),
            DecoratorError::ExecutionError(msg) => write!(f, "Execution error: {}", msg),
            DecoratorError::NotSupported(capability) => {
                write!(f, "Decorator does not provide '{}'", capability)
            }
        }
    }
}

impl std::error::Error for DecoratorError {}

/// Capabilities a loaded instance actually provides.
///
/// Decorators compiled into the program always provide both. Decorators
/// assembled at run time (see [`ClosureDecorator`]) may not, and the loader
/// rejects those before they are registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub configure: bool,
    pub decorate: bool,
}

impl Capabilities {
    pub const fn full() -> Self {
        Self {
            configure: true,
            decorate: true,
        }
    }

    /// Name of the first capability that is missing, if any.
    pub fn missing(&self) -> Option<&'static str> {
        if !self.decorate {
            Some("decorate")
        } else if !self.configure {
            Some("configure")
        } else {
            None
        }
    }
}

/// Trait for transformer plugins
///
/// Implementations must return a message of the same JSON kind they
/// received; the pipeline rejects anything else.
///
/// # Example
///
/// ```
/// use plumage::{CallOptions, Decorator, DecoratorError};
/// use serde_json::Value;
///
/// struct Shout;
///
/// impl Decorator for Shout {
///     fn configure(&mut self, _config: &Value) -> Result<(), DecoratorError> {
///         Ok(())
///     }
///
///     fn decorate(
///         &self,
///         message: Value,
///         _config: &Value,
///         _options: &CallOptions,
///     ) -> Result<Value, DecoratorError> {
///         match message {
///             Value::String(s) => Ok(Value::String(format!("{}!", s))),
///             other => Ok(other),
///         }
///     }
/// }
/// ```
pub trait Decorator: Send + Sync {
    /// Establish internal state from the plugin-level config.
    ///
    /// Called exactly once, before the instance is shared.
    fn configure(&mut self, config: &Value) -> Result<(), DecoratorError>;

    /// Transform one message.
    ///
    /// # Arguments
    ///
    /// * `message` - Output of the previous step, or the original message
    /// * `config` - Step-level config from the decoration rule (`{}` when absent)
    /// * `options` - Options of the write call being decorated
    fn decorate(
        &self,
        message: Value,
        config: &Value,
        options: &CallOptions,
    ) -> Result<Value, DecoratorError>;

    fn capabilities(&self) -> Capabilities {
        Capabilities::full()
    }
}

type ConfigureFn = Box<dyn FnMut(&Value) -> Result<(), DecoratorError> + Send + Sync>;
type DecorateFn =
    Box<dyn Fn(Value, &Value, &CallOptions) -> Result<Value, DecoratorError> + Send + Sync>;

/// Decorator assembled from closures at run time.
///
/// Reports only the capabilities it was given, so a partially built
/// instance is caught by the loader's capability check.
///
/// # Example
///
/// ```
/// use plumage::ClosureDecorator;
/// use serde_json::Value;
///
/// let upper = ClosureDecorator::new()
///     .on_configure(|_config| Ok(()))
///     .on_decorate(|message, _config, _options| {
///         Ok(match message {
///             Value::String(s) => Value::String(s.to_uppercase()),
///             other => other,
///         })
///     });
/// ```
#[derive(Default)]
pub struct ClosureDecorator {
    configure: Option<ConfigureFn>,
    decorate: Option<DecorateFn>,
}

impl ClosureDecorator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_configure<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Value) -> Result<(), DecoratorError> + Send + Sync + 'static,
    {
        self.configure = Some(Box::new(f));
        self
    }

    pub fn on_decorate<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, &Value, &CallOptions) -> Result<Value, DecoratorError> + Send + Sync + 'static,
    {
        self.decorate = Some(Box::new(f));
        self
    }
}

impl Decorator for ClosureDecorator {
    fn configure(&mut self, config: &Value) -> Result<(), DecoratorError> {
        match self.configure.as_mut() {
            Some(f) => f(config),
            None => Err(DecoratorError::NotSupported("configure")),
        }
    }

    fn decorate(
        &self,
        message: Value,
        config: &Value,
        options: &CallOptions,
    ) -> Result<Value, DecoratorError> {
        match self.decorate.as_ref() {
            Some(f) => f(message, config, options),
            None => Err(DecoratorError::NotSupported("decorate")),
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            configure: self.configure.is_some(),
            decorate: self.decorate.is_some(),
        }
    }
}

/// A configured decorator tagged with the name it was registered under.
pub struct Plugin {
    name: String,
    decorator: Box<dyn Decorator>,
}

impl Plugin {
    pub(crate) fn new(name: impl Into<String>, decorator: Box<dyn Decorator>) -> Self {
        Self {
            name: name.into(),
            decorator,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn decorate(
        &self,
        message: Value,
        config: &Value,
        options: &CallOptions,
    ) -> Result<Value, DecoratorError> {
        self.decorator.decorate(message, config, options)
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin").field("name", &self.name).finish_non_exhaustive()
    }
}

/// JSON kind of a value, used for type-compatibility checks and error text.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
