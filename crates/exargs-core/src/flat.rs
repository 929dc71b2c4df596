//! Flatten/unflatten transform between nested documents and dot-joined keys
//!
//! Flattening recurses into mappings only: sequences (and every other
//! non-mapping value) stay intact as leaf values. Unflattening rebuilds the
//! nesting from the path segments, so the two transforms are inverses for
//! mapping-rooted documents.

use indexmap::IndexMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::value::Value;

/// A flat key: the ordered segments of a dot-joined path identifying one
/// leaf in a nested configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// Parse a dot-joined path into its segments
    pub fn new(path: &str) -> Self {
        Self {
            segments: path.split('.').map(str::to_string).collect(),
        }
    }

    /// Extend this path with a child key.
    ///
    /// A key that itself contains dots is split into segments, matching how
    /// dot-joined keys round-trip through unflattening.
    pub fn child(&self, key: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(key.split('.').map(str::to_string));
        Self { segments }
    }

    /// The path segments, in order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        KeyPath::new(path)
    }
}

impl From<String> for KeyPath {
    fn from(path: String) -> Self {
        KeyPath::new(&path)
    }
}

/// Mapping from flat key to leaf value, in document order
pub type FlatMap = IndexMap<KeyPath, Value>;

/// Flatten a nested document into a map from dot-joined key to leaf value.
///
/// The root must be a mapping. Non-empty mappings are recursed into; empty
/// mappings are kept as leaves so the transform stays invertible.
pub fn flatten(root: &Value) -> Result<FlatMap> {
    let map = root.as_mapping().ok_or_else(|| {
        Error::load(format!(
            "document root must be a mapping, got {}",
            root.type_name()
        ))
    })?;

    let mut flat = FlatMap::new();
    let parent = KeyPath { segments: vec![] };
    flatten_into(map, &parent, &mut flat);
    Ok(flat)
}

fn flatten_into(map: &IndexMap<String, Value>, parent: &KeyPath, flat: &mut FlatMap) {
    for (key, value) in map {
        let path = parent.child(key);
        match value {
            Value::Mapping(inner) if !inner.is_empty() => {
                flatten_into(inner, &path, flat);
            }
            other => {
                flat.insert(path, other.clone());
            }
        }
    }
}

/// Rebuild a nested document from a flat map.
///
/// Intermediate segments create nested mappings as needed. If a scalar sits
/// where a later key needs a mapping, the mapping wins (last writer).
pub fn unflatten(flat: &FlatMap) -> Value {
    let mut root: IndexMap<String, Value> = IndexMap::new();

    for (path, value) in flat {
        let segments = path.segments();
        let mut target = &mut root;

        for segment in &segments[..segments.len() - 1] {
            let entry = target
                .entry(segment.clone())
                .or_insert_with(|| Value::Mapping(IndexMap::new()));
            if !entry.is_mapping() {
                *entry = Value::Mapping(IndexMap::new());
            }
            target = match entry {
                Value::Mapping(m) => m,
                _ => unreachable!("entry was just replaced with a mapping"),
            };
        }

        let last = segments[segments.len() - 1].clone();
        target.insert(last, value.clone());
    }

    Value::Mapping(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_key_path_display() {
        assert_eq!(KeyPath::new("base.dir").to_string(), "base.dir");
        assert_eq!(KeyPath::new("a").segments(), &["a".to_string()]);
    }

    #[test]
    fn test_key_path_child_splits_dots() {
        let path = KeyPath::new("a").child("b.c");
        assert_eq!(path, KeyPath::new("a.b.c"));
    }

    #[test]
    fn test_flatten_nested() {
        let value = doc("base:\n  dir: /data\npath: file.txt");
        let flat = flatten(&value).unwrap();

        assert_eq!(flat.len(), 2);
        assert_eq!(
            flat[&KeyPath::new("base.dir")],
            Value::String("/data".into())
        );
        assert_eq!(
            flat[&KeyPath::new("path")],
            Value::String("file.txt".into())
        );
    }

    #[test]
    fn test_flatten_keeps_sequences_as_leaves() {
        let value = doc("servers: [a, b]");
        let flat = flatten(&value).unwrap();

        assert_eq!(flat.len(), 1);
        assert!(flat[&KeyPath::new("servers")].is_sequence());
    }

    #[test]
    fn test_flatten_rejects_scalar_root() {
        let err = flatten(&Value::Integer(1)).unwrap_err();
        assert!(err.to_string().contains("must be a mapping"));
    }

    #[test]
    fn test_unflatten_rebuilds_nesting() {
        let mut flat = FlatMap::new();
        flat.insert(KeyPath::new("log.dir"), Value::String("/log".into()));
        flat.insert(KeyPath::new("log.level"), Value::String("info".into()));
        flat.insert(KeyPath::new("port"), Value::Integer(8080));

        let value = unflatten(&flat);
        let log = value.as_mapping().unwrap()["log"].as_mapping().unwrap();
        assert_eq!(log["dir"], Value::String("/log".into()));
        assert_eq!(log["level"], Value::String("info".into()));
        assert_eq!(value.as_mapping().unwrap()["port"], Value::Integer(8080));
    }

    #[test]
    fn test_flatten_unflatten_identity() {
        let value = doc(concat!(
            "a: 1\n",
            "b:\n",
            "  c: hello\n",
            "  d: [1, 2.5, true]\n",
            "  e:\n",
            "    f: null\n",
            "empty: {}\n",
        ));
        let flat = flatten(&value).unwrap();
        assert_eq!(unflatten(&flat), value);
    }

    #[test]
    fn test_unflatten_preserves_key_order() {
        let mut flat = FlatMap::new();
        flat.insert(KeyPath::new("z"), Value::Integer(1));
        flat.insert(KeyPath::new("a"), Value::Integer(2));

        let value = unflatten(&flat);
        let keys: Vec<&String> = value.as_mapping().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn test_unflatten_mapping_wins_over_scalar() {
        let mut flat = FlatMap::new();
        flat.insert(KeyPath::new("a"), Value::Integer(1));
        flat.insert(KeyPath::new("a.b"), Value::Integer(2));

        let value = unflatten(&flat);
        let a = value.as_mapping().unwrap()["a"].as_mapping().unwrap();
        assert_eq!(a["b"], Value::Integer(2));
    }
}
