//! Main Config type for exargs
//!
//! `Config` orchestrates the full pipeline: load -> flatten -> extract
//! dependencies -> order -> resolve -> unflatten. Variables can be added or
//! overridden after construction; doing so rebuilds the dependency graph
//! and re-runs the whole resolution (no incremental update).

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::deps::{self, DependencyGraph};
use crate::error::{Error, Result};
use crate::flat::{self, FlatMap, KeyPath};
use crate::resolver::{EnvProvider, ProcessEnv, Resolution, ResolvedMap};
use crate::value::Value;

/// The main configuration container.
///
/// Not safe for concurrent mutation: the flat map, dependency graph, and
/// resolved map are mutated in place. Callers sharing an instance across
/// threads must serialize access.
pub struct Config {
    /// The raw (unresolved) document
    raw: Value,
    /// Flattened leaf values, in document order
    flat: FlatMap,
    /// Dependency graph over the flattened key space
    dependencies: DependencyGraph,
    /// Resolved flat map from the last successful parse
    resolved: Option<ResolvedMap>,
    /// Environment lookup source (last-resort identifier tier)
    env: Arc<dyn EnvProvider>,
}

// Manual impl: the environment provider trait object is not Debug
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("raw", &self.raw)
            .field("flat", &self.flat)
            .field("dependencies", &self.dependencies)
            .field("resolved", &self.resolved)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load a configuration document from a file.
    ///
    /// The encoding is selected by extension: `.yaml`/`.yml` or `.json`.
    /// Any other extension, an unreadable file, or malformed content is a
    /// load error. The flat map and dependency graph are built eagerly.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !matches!(extension, "yaml" | "yml" | "json") {
            return Err(
                Error::load(format!("unsupported file extension for '{}'", path.display()))
                    .with_help("Only .yaml, .yml, or .json files are supported"),
            );
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::load(format!("failed to read '{}': {}", path.display(), e)))?;

        match extension {
            "json" => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Load a configuration document from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(yaml).map_err(|e| Error::load(e.to_string()))?;
        Self::new(value)
    }

    /// Load a configuration document from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json).map_err(|e| Error::load(e.to_string()))?;
        Self::new(value)
    }

    fn new(raw: Value) -> Result<Self> {
        let flat = flat::flatten(&raw)?;
        let dependencies = deps::extract(&flat);
        log::debug!("loaded configuration with {} flat keys", flat.len());
        Ok(Self {
            raw,
            flat,
            dependencies,
            resolved: None,
            env: Arc::new(ProcessEnv),
        })
    }

    /// Replace the environment lookup source.
    ///
    /// Defaults to the process environment; tests and embedders can inject
    /// a [`crate::resolver::StaticEnv`] instead.
    pub fn with_env(mut self, env: impl EnvProvider + 'static) -> Self {
        self.env = Arc::new(env);
        self
    }

    /// Run the full pipeline and return the resolved nested document.
    ///
    /// Fails with the first cycle or unresolved-variable error. The
    /// resolved map is only published after the whole pass succeeds, so a
    /// failure leaves any previously resolved state untouched.
    pub fn parse(&mut self) -> Result<Value> {
        let order = deps::topological_order(&self.dependencies)?;
        let resolved = Resolution::new(&self.flat, self.env.as_ref()).run(&order)?;
        let document = flat::unflatten(&resolved);
        self.resolved = Some(resolved);
        Ok(document)
    }

    /// Insert or override a variable and re-resolve the whole document.
    ///
    /// The value may reference existing variables. The new flat map and
    /// dependency graph are resolved as scratch state and committed only on
    /// success, so a failed re-resolution leaves the instance exactly as it
    /// was. The result is equivalent to a fresh resolver over the original
    /// document merged with every variable added so far.
    pub fn add_variable(&mut self, key: &str, value: impl Into<Value>) -> Result<Value> {
        if key.is_empty() {
            return Err(Error::invalid_argument("variable key must not be empty"));
        }

        let mut flat = self.flat.clone();
        flat.insert(KeyPath::new(key), value.into());
        let dependencies = deps::extract(&flat);

        let order = deps::topological_order(&dependencies)?;
        let resolved = Resolution::new(&flat, self.env.as_ref()).run(&order)?;
        let document = flat::unflatten(&resolved);

        log::debug!("added variable '{}', re-resolved {} keys", key, resolved.len());
        self.flat = flat;
        self.dependencies = dependencies;
        self.resolved = Some(resolved);
        Ok(document)
    }

    /// The resolved flat map, available after a successful [`parse`](Self::parse)
    pub fn resolved(&self) -> Option<&ResolvedMap> {
        self.resolved.as_ref()
    }

    /// The raw (unresolved) document as loaded
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}
