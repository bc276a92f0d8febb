//! Plugin locators and the resolver capability that turns them into factories.
//!
//! A `locate` string from a plugin spec is parsed into one of three locator
//! kinds at load time. Resolution is delegated to an injected [`Resolver`],
//! so the registry never loads code on its own.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use indexmap::IndexMap;

use crate::decorator::Decorator;

/// Zero-argument constructor for a decorator instance.
pub type DecoratorFactory = Arc<dyn Fn() -> Box<dyn Decorator> + Send + Sync>;

/// Where a plugin's code lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// `./path`, `../path` or `/path`, already joined to the base path
    Relative(PathBuf),

    /// Bare package reference, resolved to the package's default export
    Package(String),

    /// `package.symbol`
    Export { package: String, symbol: String },
}

impl Locator {
    /// Parse a `locate` string.
    ///
    /// Relative forms are joined to `base_path` and normalised lexically.
    /// Dotted references split at the first `.`.
    pub fn parse(locate: &str, base_path: &Path) -> Result<Self, String> {
        let locate = locate.trim();
        if locate.is_empty() {
            return Err("locator is empty".to_string());
        }

        if locate.starts_with("./") || locate.starts_with("../") || locate.starts_with('/') {
            return Ok(Locator::Relative(normalize(&base_path.join(locate))));
        }

        match locate.split_once('.') {
            Some((package, symbol)) => {
                if package.is_empty() || symbol.is_empty() {
                    return Err(format!("malformed export reference '{}'", locate));
                }
                Ok(Locator::Export {
                    package: package.to_string(),
                    symbol: symbol.to_string(),
                })
            }
            None => Ok(Locator::Package(locate.to_string())),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Relative(path) => write!(f, "{}", path.display()),
            Locator::Package(name) => write!(f, "{}", name),
            Locator::Export { package, symbol } => write!(f, "{}.{}", package, symbol),
        }
    }
}

/// Resolves a locator to a decorator factory.
pub trait Resolver {
    fn resolve(&self, locator: &Locator) -> Result<DecoratorFactory, String>;
}

/// Name of the export a bare package reference resolves to.
pub const DEFAULT_EXPORT: &str = "default";

/// Resolver backed by explicitly registered factories.
///
/// Packages expose named exports; relative locators match factories
/// registered under a file path.
#[derive(Clone, Default)]
pub struct FactoryResolver {
    packages: HashMap<String, IndexMap<String, DecoratorFactory>>,
    paths: HashMap<PathBuf, DecoratorFactory>,
}

impl FactoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an export of a package.
    ///
    /// Register under [`DEFAULT_EXPORT`] to make the bare package name resolvable.
    pub fn register_export<F>(&mut self, package: &str, symbol: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Decorator> + Send + Sync + 'static,
    {
        self.packages
            .entry(package.to_string())
            .or_default()
            .insert(symbol.to_string(), Arc::new(factory));
        self
    }

    /// Register a factory for a plugin file.
    pub fn register_path<P, F>(&mut self, path: P, factory: F) -> &mut Self
    where
        P: AsRef<Path>,
        F: Fn() -> Box<dyn Decorator> + Send + Sync + 'static,
    {
        self.paths.insert(normalize(path.as_ref()), Arc::new(factory));
        self
    }

    /// Exported symbol names of a package, in registration order.
    pub fn exports(&self, package: &str) -> Vec<&str> {
        self.packages
            .get(package)
            .map(|exports| exports.keys().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    fn lookup_export(&self, package: &str, symbol: &str) -> Result<DecoratorFactory, String> {
        let exports = self
            .packages
            .get(package)
            .ok_or_else(|| format!("package '{}' is not registered", package))?;

        exports
            .get(symbol)
            .cloned()
            .ok_or_else(|| format!("package '{}' has no export '{}'", package, symbol))
    }
}

impl Resolver for FactoryResolver {
    fn resolve(&self, locator: &Locator) -> Result<DecoratorFactory, String> {
        match locator {
            Locator::Relative(path) => self
                .paths
                .get(path)
                .cloned()
                .ok_or_else(|| format!("no plugin registered at {}", path.display())),
            Locator::Package(package) => self.lookup_export(package, DEFAULT_EXPORT),
            Locator::Export { package, symbol } => self.lookup_export(package, symbol),
        }
    }
}

/// Lexically normalise a path: drop `.` components and fold `..`.
///
/// A `..` only cancels a preceding normal component. Leading `..` are kept,
/// and `..` directly after the root is dropped.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let (cancels, at_root) = match out.components().next_back() {
                    Some(Component::Normal(_)) => (true, false),
                    Some(Component::RootDir) | Some(Component::Prefix(_)) => (false, true),
                    _ => (false, false),
                };
                if cancels {
                    out.pop();
                } else if !at_root {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
