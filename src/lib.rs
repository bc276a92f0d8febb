//! # Plumage: decorator pipelines for log and event transports
//!
//! Plumage applies ordered, pluggable transformations to outbound messages
//! before a transport writes them to its sink.
//!
//! ## Features
//!
//! - **Plugin loading**: decorators are located through an injected resolver, checked for the
//!   `configure`/`decorate` contract and configured exactly once
//! - **Rule compilation**: per transport identifier, an ordered rule list is validated and
//!   folded into a single precompiled pipeline
//! - **Write interception**: a decorated transport owns the original one and runs every write
//!   through its identifier's pipeline before forwarding it
//! - **Two phases**: a mutable [`RegistryBuilder`] is frozen into a read-only [`Registry`]
//!
//! ## Example configuration
//!
//! ```yaml
//! decorators:
//!   trim:
//!     locate: builtin.trim
//!   upper:
//!     locate: builtin.upper
//!   scrub:
//!     locate: builtin.redact
//!     config:
//!       pattern: "\\d{16}"
//! rules:
//!   file:
//!     - decoratorName: trim
//!     - decoratorName: scrub
//!   console:
//!     - decoratorName: upper
//! ```
//!
//! ## Example
//!
//! ```
//! use plumage::{builtin_resolver, CallOptions, Registry, RegistryConfig, Transport, TransportError};
//! use serde_json::{json, Value};
//!
//! struct Memory(Vec<Value>);
//!
//! impl Transport for Memory {
//!     const IDENTIFIER: &'static str = "console";
//!
//!     fn write(&mut self, message: Value, _options: &CallOptions) -> Result<(), TransportError> {
//!         self.0.push(message);
//!         Ok(())
//!     }
//! }
//!
//! let config = RegistryConfig::from_yaml_str(r#"
//! decorators:
//!   upper: { locate: builtin.upper }
//! rules:
//!   console: [{ decoratorName: upper }]
//! "#).unwrap();
//!
//! let registry = Registry::from_config(&builtin_resolver(), &config).unwrap();
//! let mut console = registry.wrap(Memory(Vec::new())).unwrap();
//! console.write(json!("hello"), &CallOptions::new()).unwrap();
//!
//! assert_eq!(console.inner().0, vec![json!("HELLO")]);
//! ```

// Decorator contract and plugin loading
pub mod decorator;
pub mod locator;
pub mod loader;

// Rules and pipelines
pub mod rules;
pub mod pipeline;

// Transports and interception
pub mod transport;
pub mod sinks;

pub mod registry;
pub mod config;
pub mod builtin;

// Re-export key types
pub use decorator::{value_kind, Capabilities, CallOptions, ClosureDecorator, Decorator, DecoratorError, Plugin};
pub use locator::{DecoratorFactory, FactoryResolver, Locator, Resolver, DEFAULT_EXPORT};
pub use loader::{load_plugin, LoadError, PluginSpec};
pub use rules::{validate_rules, DecorationRule, RuleError};
pub use pipeline::{Pipeline, PipelineError};
pub use transport::{DecoratedTransport, DecoratedType, InterceptError, Transport, TransportError};
pub use sinks::{ConsoleTransport, FileTransport, LineSink};
pub use registry::{Registry, RegistryBuilder};
pub use config::{ConfigError, RegistryConfig};
pub use builtin::{builtin_resolver, register_builtins, BUILTIN_PACKAGE};
