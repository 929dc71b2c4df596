//! exargs-core: configuration resolution with variable and expression interpolation
//!
//! This crate resolves hierarchical configuration documents whose string
//! leaves reference other keys (`${name}`), environment variables, or small
//! arithmetic/logical expressions (`${{ expr }}`) into fully resolved
//! documents with no remaining placeholders. Resolution is dependency-aware:
//! references are ordered topologically and cycles are reported up front.
//!
//! # Example
//!
//! ```rust
//! use exargs_core::Config;
//!
//! let yaml = r#"
//! base:
//!   dir: /data
//! path: ${base.dir}/file.txt
//! workers: "${{ max(2, 8 - 5) }}"
//! "#;
//!
//! let mut config = Config::from_yaml(yaml).unwrap();
//! let resolved = config.parse().unwrap();
//!
//! let doc = resolved.as_mapping().unwrap();
//! assert_eq!(doc["path"].as_str(), Some("/data/file.txt"));
//! assert_eq!(doc["workers"].as_str(), Some("3"));
//! ```

pub mod deps;
pub mod error;
pub mod expr;
pub mod flat;
pub mod resolver;
pub mod value;

mod config;

pub use config::Config;
pub use deps::DependencyGraph;
pub use error::{Error, ErrorKind, Result};
pub use expr::Scope;
pub use flat::{FlatMap, KeyPath};
pub use resolver::{EnvProvider, ProcessEnv, ResolvedMap, StaticEnv};
pub use value::Value;
