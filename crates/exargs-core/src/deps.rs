//! Dependency extraction and topological ordering
//!
//! Every string reachable from a flattened leaf is scanned for the two
//! placeholder syntaxes: simple references `${name}` and expression blocks
//! `${{ expr }}`. The resulting graph maps each identifier to the set of
//! identifiers it must be resolved after. Identifiers that are not flat
//! keys still become graph nodes; they are resolved later from the
//! environment.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::flat::FlatMap;
use crate::value::Value;

/// Mapping from identifier to the identifiers it depends on.
///
/// Sorted containers keep traversal order deterministic, so cycle reports
/// and the topological order are reproducible across runs.
pub type DependencyGraph = BTreeMap<String, BTreeSet<String>>;

/// Pattern for a simple reference: `${name}` with no nested braces
pub(crate) fn var_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^{}]+)\}").expect("valid regex"))
}

/// Pattern for an expression block: `${{ expr }}`
pub(crate) fn expr_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\$\{\{(.+?)\}\}").expect("valid regex"))
}

/// Pattern for identifier-like tokens inside an expression block,
/// including dotted flat keys
fn ident_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*").expect("valid regex")
    })
}

/// Tokens inside expressions that are never variables: keywords, literal
/// spellings, and the builtin function whitelist.
const RESERVED: &[&str] = &[
    "and", "or", "not", "true", "false", "True", "False", "None", "null", "min", "max", "abs",
    "int", "float", "bool",
];

/// Build the dependency graph for a flattened document.
///
/// Self-references are excluded so an accidental literal match on a key's
/// own name cannot produce a spurious one-node cycle. Every referenced
/// identifier is registered as a node (possibly with an empty set), so the
/// sorter never encounters an unknown node.
pub fn extract(flat: &FlatMap) -> DependencyGraph {
    let mut graph = DependencyGraph::new();

    for (key, value) in flat {
        let key_name = key.to_string();
        let mut refs = BTreeSet::new();
        collect_refs(value, &mut refs);
        refs.remove(&key_name);

        for referenced in &refs {
            graph.entry(referenced.clone()).or_default();
        }
        graph.entry(key_name).or_default().extend(refs);
    }

    log::debug!("extracted dependency graph with {} nodes", graph.len());
    graph
}

/// Collect referenced identifiers from a leaf value, recursing into
/// sequences and mappings so composite leaves are ordered correctly too.
fn collect_refs(value: &Value, refs: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => scan_string(s, refs),
        Value::Sequence(seq) => {
            for item in seq {
                collect_refs(item, refs);
            }
        }
        Value::Mapping(map) => {
            for item in map.values() {
                collect_refs(item, refs);
            }
        }
        _ => {}
    }
}

fn scan_string(s: &str, refs: &mut BTreeSet<String>) {
    // An expression that reads a variable must be ordered after it, so
    // every identifier-like token inside the block is a dependency.
    for captures in expr_pattern().captures_iter(s) {
        for ident in ident_pattern().find_iter(&captures[1]) {
            if !RESERVED.contains(&ident.as_str()) {
                refs.insert(ident.as_str().to_string());
            }
        }
    }

    for captures in var_pattern().captures_iter(s) {
        refs.insert(captures[1].to_string());
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    InProgress,
    Done,
}

/// Order the graph's nodes so every dependency precedes its dependents.
///
/// Classic three-color depth-first traversal. Hitting an in-progress node
/// records the path from the DFS root to the repeated node as one cycle;
/// traversal continues so a single pass reports every cycle before failing.
pub fn topological_order(graph: &DependencyGraph) -> Result<Vec<String>> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut order = Vec::new();
    let mut cycles: Vec<Vec<String>> = Vec::new();
    let mut path = Vec::new();

    for node in graph.keys() {
        if !marks.contains_key(node.as_str()) {
            visit(graph, node, &mut marks, &mut path, &mut order, &mut cycles);
        }
    }

    if !cycles.is_empty() {
        return Err(Error::cycles(cycles));
    }

    Ok(order)
}

fn visit<'a>(
    graph: &'a DependencyGraph,
    node: &'a str,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<String>,
    order: &mut Vec<String>,
    cycles: &mut Vec<Vec<String>>,
) {
    match marks.get(node) {
        Some(Mark::InProgress) => {
            let mut chain = path.clone();
            chain.push(node.to_string());
            cycles.push(chain);
            return;
        }
        Some(Mark::Done) => return,
        None => {}
    }

    marks.insert(node, Mark::InProgress);
    path.push(node.to_string());

    if let Some(deps) = graph.get(node) {
        for dep in deps {
            visit(graph, dep, marks, path, order, cycles);
        }
    }

    path.pop();
    marks.insert(node, Mark::Done);
    // Post-order emission: dependencies land before their dependents
    order.push(node.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::flat::flatten;
    use pretty_assertions::assert_eq;

    fn graph_for(yaml: &str) -> DependencyGraph {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        extract(&flatten(&value).unwrap())
    }

    fn deps(graph: &DependencyGraph, key: &str) -> Vec<String> {
        graph[key].iter().cloned().collect()
    }

    #[test]
    fn test_extract_simple_reference() {
        let graph = graph_for("base:\n  dir: /data\npath: ${base.dir}/file.txt");

        assert_eq!(deps(&graph, "path"), vec!["base.dir"]);
        assert!(graph["base.dir"].is_empty());
    }

    #[test]
    fn test_extract_expression_identifiers() {
        let graph = graph_for("a: 2\nb: 3\nc: \"${{ max(a, b - 5) && true }}\"");

        assert_eq!(deps(&graph, "c"), vec!["a", "b"]);
    }

    #[test]
    fn test_extract_registers_unknown_identifiers_as_nodes() {
        let graph = graph_for("home: ${HOME}/data");

        assert!(graph.contains_key("HOME"));
        assert!(graph["HOME"].is_empty());
    }

    #[test]
    fn test_extract_excludes_self_reference() {
        let graph = graph_for("a: \"${a} again\"");

        assert!(graph["a"].is_empty());
    }

    #[test]
    fn test_extract_recurses_into_composites() {
        let graph = graph_for("base: /opt\npaths:\n  - ${base}/a\n  - inner: ${base}/b");

        assert_eq!(deps(&graph, "paths"), vec!["base"]);
    }

    #[test]
    fn test_extract_dotted_identifier_in_expression() {
        let graph = graph_for("limits:\n  max: 10\ncheck: \"${{ limits.max > 5 }}\"");

        assert_eq!(deps(&graph, "check"), vec!["limits.max"]);
    }

    #[test]
    fn test_topological_order_dependencies_first() {
        let graph = graph_for("a: base\nb: ${a}/dir\nc: ${b}/file.txt");
        let order = topological_order(&graph).unwrap();

        let pos = |k: &str| order.iter().position(|n| n == k).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    #[test]
    fn test_topological_order_is_deterministic() {
        let graph = graph_for("x: 1\ny: 2\nz: 3\nw: ${x}${y}${z}");

        let first = topological_order(&graph).unwrap();
        let second = topological_order(&graph).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_cycle_detection_reports_all_keys() {
        let graph = graph_for("a: ${b}\nb: ${c}\nc: ${a}");
        let err = topological_order(&graph).unwrap_err();

        let display = err.to_string();
        assert!(display.contains("Cycle(s) detected"));
        assert!(display.contains("a"));
        assert!(display.contains("b"));
        assert!(display.contains("c"));
    }

    #[test]
    fn test_cycle_chain_repeats_start_identifier() {
        let graph = graph_for("a: ${b}\nb: ${a}");
        let err = topological_order(&graph).unwrap_err();

        match err.kind {
            ErrorKind::Cycle { chains } => {
                assert_eq!(chains.len(), 1);
                let chain = &chains[0];
                let first = chain.split(" -> ").next().unwrap();
                assert!(chain.ends_with(first));
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_multiple_cycles_all_reported() {
        let graph = graph_for("a: ${b}\nb: ${a}\nx: ${y}\ny: ${x}");
        let err = topological_order(&graph).unwrap_err();

        match err.kind {
            ErrorKind::Cycle { chains } => assert_eq!(chains.len(), 2),
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_acyclic_graph_orders_every_node() {
        let graph = graph_for("a: 1\nb: ${a}\nc: ${ENV_ONLY}");
        let order = topological_order(&graph).unwrap();

        assert_eq!(order.len(), graph.len());
    }
}
