//! Value resolution in dependency order
//!
//! A [`Resolution`] walks the topological order produced by the dependency
//! sorter, substituting simple `${name}` references and evaluating
//! `${{ expr }}` blocks. Identifiers resolve through three tiers, in order:
//! the already-resolved map for this pass, the flat map (resolved
//! recursively and memoized), and finally the environment provider.

use indexmap::IndexMap;
use std::collections::HashMap;

use crate::deps::{expr_pattern, var_pattern};
use crate::error::{Error, Result};
use crate::expr::{self, Scope};
use crate::flat::{FlatMap, KeyPath};
use crate::value::Value;

/// Read-only source of environment bindings.
///
/// Injected rather than read ambiently so resolution is testable without
/// touching process environment variables.
pub trait EnvProvider: Send + Sync {
    /// Look up a binding by name
    fn get(&self, name: &str) -> Option<String>;
}

/// Environment provider backed by the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvProvider for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Environment provider backed by a fixed map, for tests and embedders
#[derive(Debug, Clone, Default)]
pub struct StaticEnv {
    vars: HashMap<String, String>,
}

impl StaticEnv {
    /// Create a provider from name/value pairs
    pub fn new<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl EnvProvider for StaticEnv {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Mapping from flat key to its fully resolved value.
///
/// A key present here is final for the current pass and contains no
/// placeholder patterns.
pub type ResolvedMap = IndexMap<KeyPath, Value>;

/// One full resolution pass over a flattened document
pub struct Resolution<'a> {
    flat: &'a FlatMap,
    env: &'a dyn EnvProvider,
    resolved: ResolvedMap,
}

impl<'a> Resolution<'a> {
    /// Start a pass over the given flat map and environment source
    pub fn new(flat: &'a FlatMap, env: &'a dyn EnvProvider) -> Self {
        Self {
            flat,
            env,
            resolved: ResolvedMap::new(),
        }
    }

    /// Resolve every key in the given topological order.
    ///
    /// Order entries without a leaf value (identifiers that only appear as
    /// dependency nodes, e.g. environment names) are skipped. Returns the
    /// resolved map; on any failure the whole pass is abandoned.
    pub fn run(mut self, order: &[String]) -> Result<ResolvedMap> {
        for name in order {
            let path = KeyPath::new(name);
            let Some(value) = self.flat.get(&path) else {
                continue;
            };
            if self.resolved.contains_key(&path) {
                // Already memoized by an earlier recursive lookup
                continue;
            }
            log::trace!("resolving '{}'", name);
            let value = value.clone();
            let resolved = self.resolve_value(&value).map_err(|e| {
                if e.path.is_none() {
                    e.with_path(name.clone())
                } else {
                    e
                }
            })?;
            self.resolved.insert(path, resolved);
        }
        Ok(self.resolved)
    }

    /// Resolve one leaf value, recursing into composites element-wise
    fn resolve_value(&mut self, value: &Value) -> Result<Value> {
        match value {
            Value::String(s) => self.resolve_string(s),
            Value::Sequence(seq) => {
                let items: Vec<Value> = seq
                    .iter()
                    .map(|item| self.resolve_value(item))
                    .collect::<Result<_>>()?;
                Ok(Value::Sequence(items))
            }
            Value::Mapping(map) => {
                let mut out = IndexMap::with_capacity(map.len());
                for (key, item) in map {
                    out.insert(key.clone(), self.resolve_value(item)?);
                }
                Ok(Value::Mapping(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(&mut self, s: &str) -> Result<Value> {
        // Expression blocks first; their substitution never reintroduces
        // placeholder syntax, so one evaluation per block suffices.
        let mut current = self.substitute_expressions(s)?;

        let mut previous: Option<String> = None;
        while var_pattern().is_match(&current) {
            if previous.as_deref() == Some(current.as_str()) {
                // No progress across a full pass: the remaining pattern
                // can never resolve
                return Err(Error::stalled(current));
            }
            previous = Some(current.clone());

            let names: Vec<String> = var_pattern()
                .captures_iter(&current)
                .map(|c| c[1].to_string())
                .collect();
            for name in names {
                let value = self.lookup(&name)?;
                let placeholder = format!("${{{}}}", name);
                current = current.replace(&placeholder, &value.render());
            }
        }

        Ok(Value::String(current))
    }

    fn substitute_expressions(&mut self, s: &str) -> Result<String> {
        if !expr_pattern().is_match(s) {
            return Ok(s.to_string());
        }

        let blocks: Vec<(usize, usize, String)> = expr_pattern()
            .captures_iter(s)
            .map(|c| {
                let m = c.get(0).expect("match 0 always present");
                (m.start(), m.end(), c[1].to_string())
            })
            .collect();

        let mut out = String::with_capacity(s.len());
        let mut last = 0;
        for (start, end, expr_src) in blocks {
            out.push_str(&s[last..start]);
            let value = expr::evaluate(&expr_src, self)?;
            out.push_str(&value.render());
            last = end;
        }
        out.push_str(&s[last..]);
        Ok(out)
    }

    /// Three-tier identifier lookup: resolved map, flat map (recursive,
    /// memoized), then the environment as last resort.
    fn lookup(&mut self, name: &str) -> Result<Value> {
        let path = KeyPath::new(name);

        if let Some(value) = self.resolved.get(&path) {
            return Ok(value.clone());
        }

        if let Some(value) = self.flat.get(&path) {
            let value = value.clone();
            let resolved = self.resolve_value(&value)?;
            self.resolved.insert(path, resolved.clone());
            return Ok(resolved);
        }

        if let Some(text) = self.env.get(name) {
            log::trace!("resolved '{}' from the environment", name);
            return Ok(Value::String(text));
        }

        Err(Error::unresolved_variable(name))
    }
}

impl Scope for Resolution<'_> {
    fn lookup(&mut self, name: &str) -> Result<Value> {
        Resolution::lookup(self, name)
    }
}
