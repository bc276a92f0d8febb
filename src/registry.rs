//! Decorator registry.
//!
//! [`RegistryBuilder`] is the configuring phase: plugins and rules are loaded
//! into it, possibly over several calls. [`RegistryBuilder::build`] freezes
//! it into a [`Registry`], which only offers lookups and transport
//! decoration.

use std::path::Path;
use std::sync::Arc;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::config::{ConfigError, RegistryConfig};
use crate::decorator::Plugin;
use crate::loader::{self, LoadError, PluginSpec};
use crate::locator::Resolver;
use crate::pipeline::Pipeline;
use crate::rules::{self, DecorationRule, RuleError};
use crate::transport::{self, DecoratedTransport, DecoratedType, InterceptError, Transport};

/// Registry state shared by both phases.
#[derive(Debug, Default)]
struct State {
    decorators: IndexMap<String, Arc<Plugin>>,
    rules: IndexMap<String, Vec<DecorationRule>>,
    pipelines: IndexMap<String, Arc<Pipeline>>,
}

impl State {
    fn get_plugin(&self, name: &str) -> Option<&Arc<Plugin>> {
        self.decorators.get(name)
    }

    fn get_rules(&self, identifier: &str) -> &[DecorationRule] {
        self.rules.get(identifier).map(Vec::as_slice).unwrap_or(&[])
    }

    fn get_pipeline(&self, identifier: &str) -> Option<&Arc<Pipeline>> {
        self.pipelines.get(identifier)
    }
}

/// Mutable registry used while configuring.
///
/// Repeated loads mutate in place; the last load wins per plugin name and
/// per transport identifier.
///
/// # Example
///
/// ```
/// use indexmap::IndexMap;
/// use plumage::{builtin_resolver, PluginSpec, RegistryBuilder};
/// use serde_json::json;
/// use std::path::Path;
///
/// let mut plugins = IndexMap::new();
/// plugins.insert("upper".to_string(), PluginSpec::new("builtin.upper"));
///
/// let mut rules = IndexMap::new();
/// rules.insert("console".to_string(), json!([{"decoratorName": "upper"}]));
///
/// let mut builder = RegistryBuilder::new();
/// builder.load_plugins(&builtin_resolver(), Path::new("."), &plugins).unwrap();
/// builder.load_rules(&rules).unwrap();
///
/// let registry = builder.build();
/// assert!(registry.get_pipeline("console").is_some());
/// ```
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    state: State,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and configure plugins.
    ///
    /// # Returns
    /// Number of plugins registered by this call
    ///
    /// # Errors
    /// Stops at the first invalid spec. Entries before it stay registered.
    pub fn load_plugins<R>(
        &mut self,
        resolver: &R,
        base_path: &Path,
        specs: &IndexMap<String, PluginSpec>,
    ) -> Result<usize, LoadError>
    where
        R: Resolver + ?Sized,
    {
        loader::load_plugins(&mut self.state.decorators, resolver, base_path, specs)
    }

    /// Validate rules against the registered plugins and compile pipelines.
    ///
    /// # Returns
    /// Number of identifiers compiled by this call
    ///
    /// # Errors
    /// Stops at the first invalid identifier, whose previous rules and
    /// pipeline are left as they were.
    pub fn load_rules(&mut self, specs: &IndexMap<String, JsonValue>) -> Result<usize, RuleError> {
        let State {
            decorators,
            rules,
            pipelines,
        } = &mut self.state;
        rules::load_rules(rules, pipelines, decorators, specs)
    }

    /// Load the plugins then the rules of a parsed config.
    pub fn apply_config<R>(&mut self, resolver: &R, config: &RegistryConfig) -> Result<(), ConfigError>
    where
        R: Resolver + ?Sized,
    {
        self.load_plugins(resolver, &config.base_path(), &config.decorators)?;
        self.load_rules(&config.rules)?;
        Ok(())
    }

    pub fn get_plugin(&self, name: &str) -> Option<&Arc<Plugin>> {
        self.state.get_plugin(name)
    }

    pub fn get_rules(&self, identifier: &str) -> &[DecorationRule] {
        self.state.get_rules(identifier)
    }

    pub fn get_pipeline(&self, identifier: &str) -> Option<&Arc<Pipeline>> {
        self.state.get_pipeline(identifier)
    }

    /// Freeze into an operating registry.
    pub fn build(self) -> Registry {
        tracing::info!(
            "Registry ready: {} plugins, {} pipelines",
            self.state.decorators.len(),
            self.state.pipelines.len()
        );
        Registry { state: self.state }
    }
}

/// Frozen registry used while operating.
#[derive(Debug)]
pub struct Registry {
    state: State,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Build a registry straight from a parsed config.
    pub fn from_config<R>(resolver: &R, config: &RegistryConfig) -> Result<Self, ConfigError>
    where
        R: Resolver + ?Sized,
    {
        let mut builder = RegistryBuilder::new();
        builder.apply_config(resolver, config)?;
        Ok(builder.build())
    }

    /// Decorated counterpart of transport type `T`.
    ///
    /// # Errors
    /// Fails when `T` declares no identifier or when no pipeline is compiled
    /// for it. Undecorated transports are never handed out.
    pub fn decorate<T: Transport>(&self) -> Result<DecoratedType<T>, InterceptError> {
        transport::intercept::<T>(&self.state.pipelines)
    }

    /// Decorate a single transport instance.
    pub fn wrap<T: Transport>(&self, inner: T) -> Result<DecoratedTransport<T>, InterceptError> {
        Ok(self.decorate::<T>()?.wrap(inner))
    }

    pub fn get_plugin(&self, name: &str) -> Option<&Arc<Plugin>> {
        self.state.get_plugin(name)
    }

    /// Rules of an identifier; empty when none were loaded.
    pub fn get_rules(&self, identifier: &str) -> &[DecorationRule] {
        self.state.get_rules(identifier)
    }

    pub fn get_pipeline(&self, identifier: &str) -> Option<&Arc<Pipeline>> {
        self.state.get_pipeline(identifier)
    }

    /// Registered plugin names, in registration order.
    pub fn plugin_names(&self) -> Vec<&str> {
        self.state.decorators.keys().map(|s| s.as_str()).collect()
    }

    /// Identifiers with a compiled pipeline, in load order.
    pub fn identifiers(&self) -> Vec<&str> {
        self.state.pipelines.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorator::{ClosureDecorator, Decorator};
    use crate::locator::FactoryResolver;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_resolver(created: Arc<AtomicUsize>) -> FactoryResolver {
        let mut resolver = FactoryResolver::new();
        resolver.register_export("test", "mark", move || {
            let n = created.fetch_add(1, Ordering::SeqCst);
            Box::new(
                ClosureDecorator::new()
                    .on_configure(|_| Ok(()))
                    .on_decorate(move |m, _, _| {
                        Ok(json!(format!("{}#{}", m.as_str().unwrap_or_default(), n)))
                    }),
            ) as Box<dyn Decorator>
        });
        resolver
    }

    fn specs(entries: &[(&str, &str)]) -> IndexMap<String, PluginSpec> {
        entries
            .iter()
            .map(|(name, locate)| (name.to_string(), PluginSpec::new(*locate)))
            .collect()
    }

    #[test]
    fn test_last_registration_wins() {
        let resolver = counting_resolver(Arc::new(AtomicUsize::new(0)));
        let mut builder = RegistryBuilder::new();

        builder
            .load_plugins(&resolver, Path::new("."), &specs(&[("mark", "test.mark")]))
            .unwrap();
        let first = Arc::clone(builder.get_plugin("mark").unwrap());
        builder
            .load_plugins(&resolver, Path::new("."), &specs(&[("mark", "test.mark")]))
            .unwrap();
        let second = builder.get_plugin("mark").unwrap();

        assert!(!Arc::ptr_eq(&first, second));
    }

    #[test]
    fn test_pipeline_keeps_instance_captured_at_compile_time() {
        let resolver = counting_resolver(Arc::new(AtomicUsize::new(0)));
        let mut builder = RegistryBuilder::new();
        builder
            .load_plugins(&resolver, Path::new("."), &specs(&[("mark", "test.mark")]))
            .unwrap();

        let mut rules = IndexMap::new();
        rules.insert("console".to_string(), json!([{"decoratorName": "mark"}]));
        builder.load_rules(&rules).unwrap();

        builder
            .load_plugins(&resolver, Path::new("."), &specs(&[("mark", "test.mark")]))
            .unwrap();

        let registry = builder.build();
        let out = registry
            .get_pipeline("console")
            .unwrap()
            .apply(json!("m"), &Default::default())
            .unwrap();
        assert_eq!(out, json!("m#0"));
    }

    #[test]
    fn test_get_rules_defaults_to_empty() {
        let registry = RegistryBuilder::new().build();

        assert!(registry.get_rules("console").is_empty());
        assert!(registry.get_pipeline("console").is_none());
        assert!(registry.get_plugin("upper").is_none());
    }

    #[test]
    fn test_listing_preserves_load_order() {
        let resolver = counting_resolver(Arc::new(AtomicUsize::new(0)));
        let mut builder = Registry::builder();
        builder
            .load_plugins(
                &resolver,
                Path::new("."),
                &specs(&[("b", "test.mark"), ("a", "test.mark")]),
            )
            .unwrap();

        let mut rules = IndexMap::new();
        rules.insert("file".to_string(), json!([{"decoratorName": "a"}]));
        rules.insert("console".to_string(), json!([]));
        assert_eq!(builder.load_rules(&rules).unwrap(), 2);

        let registry = builder.build();
        assert_eq!(registry.plugin_names(), vec!["b", "a"]);
        assert_eq!(registry.identifiers(), vec!["file", "console"]);
        assert!(registry.get_pipeline("console").unwrap().is_empty());
    }
}
