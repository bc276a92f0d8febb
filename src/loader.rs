//! Plugin loader.
//!
//! Resolves plugin specs into decorator instances, checks the capability
//! contract, configures each instance once and registers it by name.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::decorator::{value_kind, DecoratorError, Plugin};
use crate::locator::{Locator, Resolver};

/// Declarative plugin spec: `name -> { locate, config? }`.
///
/// Fields are kept as raw JSON so that a missing or mistyped `locate`
/// produces a loader error naming the plugin rather than a parse error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    #[serde(default)]
    pub locate: Option<JsonValue>,

    #[serde(default)]
    pub config: Option<JsonValue>,
}

impl PluginSpec {
    pub fn new(locate: impl Into<String>) -> Self {
        Self {
            locate: Some(JsonValue::String(locate.into())),
            config: None,
        }
    }

    pub fn with_config(mut self, config: JsonValue) -> Self {
        self.config = Some(config);
        self
    }
}

/// Error type for plugin loading
#[derive(Debug)]
pub enum LoadError {
    MissingLocate {
        plugin: String,
    },
    InvalidLocate {
        plugin: String,
        reason: String,
    },
    Unresolved {
        plugin: String,
        locator: String,
        reason: String,
    },
    InvalidConfig {
        plugin: String,
        found: &'static str,
    },
    MissingCapability {
        plugin: String,
        capability: &'static str,
    },
    Configure {
        plugin: String,
        source: DecoratorError,
    },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::MissingLocate { plugin } => {
                write!(f, "Plugin '{}' is missing 'locate'", plugin)
            }
            LoadError::InvalidLocate { plugin, reason } => {
                write!(f, "Plugin '{}' has an invalid 'locate': {}", plugin, reason)
            }
            LoadError::Unresolved { plugin, locator, reason } => {
                write!(f, "Plugin '{}' could not be resolved from '{}': {}", plugin, locator, reason)
            }
            LoadError::InvalidConfig { plugin, found } => {
                write!(f, "Plugin '{}' config must be an object, found {}", plugin, found)
            }
            LoadError::MissingCapability { plugin, capability } => {
                write!(f, "Plugin '{}' does not implement '{}'", plugin, capability)
            }
            LoadError::Configure { plugin, source } => {
                write!(f, "Plugin '{}' failed to configure: {}", plugin, source)
            }
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Configure { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Load a single plugin.
///
/// # Arguments
/// * `name` - Registered name of the plugin
/// * `spec` - Plugin spec
/// * `resolver` - Maps the parsed locator to a factory
/// * `base_path` - Directory relative locators are resolved against
///
/// # Returns
/// The configured plugin, tagged with `name`
pub fn load_plugin<R>(
    name: &str,
    spec: &PluginSpec,
    resolver: &R,
    base_path: &Path,
) -> Result<Plugin, LoadError>
where
    R: Resolver + ?Sized,
{
    let locate = match &spec.locate {
        None | Some(JsonValue::Null) => {
            return Err(LoadError::MissingLocate {
                plugin: name.to_string(),
            })
        }
        Some(JsonValue::String(s)) => s,
        Some(other) => {
            return Err(LoadError::InvalidLocate {
                plugin: name.to_string(),
                reason: format!("expected a string, found {}", value_kind(other)),
            })
        }
    };

    let locator = Locator::parse(locate, base_path).map_err(|reason| LoadError::InvalidLocate {
        plugin: name.to_string(),
        reason,
    })?;

    let config = match &spec.config {
        None | Some(JsonValue::Null) => JsonValue::Object(Map::new()),
        Some(config @ JsonValue::Object(_)) => config.clone(),
        Some(other) => {
            return Err(LoadError::InvalidConfig {
                plugin: name.to_string(),
                found: value_kind(other),
            })
        }
    };

    let factory = resolver
        .resolve(&locator)
        .map_err(|reason| LoadError::Unresolved {
            plugin: name.to_string(),
            locator: locator.to_string(),
            reason,
        })?;

    let mut decorator = factory();

    if let Some(capability) = decorator.capabilities().missing() {
        return Err(LoadError::MissingCapability {
            plugin: name.to_string(),
            capability,
        });
    }

    decorator
        .configure(&config)
        .map_err(|source| LoadError::Configure {
            plugin: name.to_string(),
            source,
        })?;

    tracing::debug!("Configured plugin '{}' from {}", name, locator);

    Ok(Plugin::new(name, decorator))
}

/// Load every spec in declaration order into `plugins`.
///
/// Stops at the first failure. Plugins registered before the failing entry
/// stay registered; the load is not transactional across entries.
pub(crate) fn load_plugins<R>(
    plugins: &mut IndexMap<String, Arc<Plugin>>,
    resolver: &R,
    base_path: &Path,
    specs: &IndexMap<String, PluginSpec>,
) -> Result<usize, LoadError>
where
    R: Resolver + ?Sized,
{
    let mut count = 0;

    for (name, spec) in specs {
        let plugin = load_plugin(name, spec, resolver, base_path)?;

        if plugins.insert(name.clone(), Arc::new(plugin)).is_some() {
            tracing::warn!("Plugin '{}' replaced an existing registration", name);
        } else {
            tracing::info!("Registered plugin '{}'", name);
        }
        count += 1;
    }

    Ok(count)
}
