//! Dependency graph over a loaded migration set.
//!
//! Nodes are migration ids; an edge X -> Y means X depends on Y. The graph
//! is a flat pair of adjacency maps computed once from the migration set and
//! immutable afterwards. Ordering queries are deterministic: ties are broken
//! by lexicographic id, and traversal always walks neighbors in sorted
//! order.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use crate::error::{MigrateError, Result};
use crate::store::MigrationSet;

type Edges = BTreeMap<String, BTreeSet<String>>;

/// Validated dependency graph answering ordering queries.
#[derive(Debug)]
pub struct DependencyGraph {
    /// id -> ids it directly depends on.
    depends: Edges,
    /// id -> ids that directly depend on it.
    dependents: Edges,
    /// All ids in topological order, dependencies first.
    order: Vec<String>,
}

impl DependencyGraph {
    /// Builds and validates the graph for a migration set.
    ///
    /// Fails if any declared dependency is missing from the set or if the
    /// dependency relation contains a cycle; the cycle error carries the
    /// offending path.
    pub fn build(migrations: &MigrationSet) -> Result<Self> {
        for (id, m) in migrations {
            for dep in &m.depends {
                if !migrations.contains_key(dep) {
                    return Err(MigrateError::UnknownDependency {
                        migration: id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let depends: Edges = migrations
            .iter()
            .map(|(id, m)| (id.clone(), m.depends.clone()))
            .collect();
        let mut dependents: Edges = migrations
            .keys()
            .map(|id| (id.clone(), BTreeSet::new()))
            .collect();
        for (id, m) in migrations {
            for dep in &m.depends {
                if let Some(set) = dependents.get_mut(dep) {
                    set.insert(id.clone());
                }
            }
        }

        // Kahn's algorithm with a lexicographic min-heap: the smallest ready
        // id is always emitted first, which fixes the order for equal ranks.
        let mut in_degree: BTreeMap<&str, usize> = depends
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();
        let mut ready: BinaryHeap<Reverse<&str>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| Reverse(*id))
            .collect();
        let mut order: Vec<String> = Vec::with_capacity(depends.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id.to_string());
            if let Some(deps) = dependents.get(id) {
                for dependent in deps {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push(Reverse(dependent.as_str()));
                        }
                    }
                }
            }
        }

        if order.len() != depends.len() {
            return Err(MigrateError::CircularDependency {
                cycle: find_cycle(&depends),
            });
        }

        Ok(Self {
            depends,
            dependents,
            order,
        })
    }

    /// Whether the graph contains the id.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.depends.contains_key(id)
    }

    /// All ids in topological order, dependencies first.
    #[must_use]
    pub fn topo_order(&self) -> &[String] {
        &self.order
    }

    /// Everything the migration transitively depends on, in application
    /// order (dependencies first). The migration itself is excluded.
    pub fn ancestors(&self, id: &str) -> Result<Vec<String>> {
        let reachable = closure(&self.depends, id)?;
        Ok(self
            .order
            .iter()
            .filter(|n| n.as_str() != id && reachable.contains(n.as_str()))
            .cloned()
            .collect())
    }

    /// Everything that transitively depends on the migration, in revert
    /// order (most-dependent first). The migration itself is excluded.
    pub fn descendants(&self, id: &str) -> Result<Vec<String>> {
        let reachable = closure(&self.dependents, id)?;
        Ok(self
            .order
            .iter()
            .rev()
            .filter(|n| n.as_str() != id && reachable.contains(n.as_str()))
            .cloned()
            .collect())
    }
}

/// Transitive closure of `id` along `edges`, excluding `id` itself unless it
/// lies on a cycle. Iterative with an explicit stack.
fn closure(edges: &Edges, id: &str) -> Result<BTreeSet<String>> {
    if !edges.contains_key(id) {
        return Err(MigrateError::UnknownMigration(id.to_string()));
    }
    let mut reachable = BTreeSet::new();
    let mut stack: Vec<&str> = vec![id];
    while let Some(node) = stack.pop() {
        for next in &edges[node] {
            if reachable.insert(next.clone()) {
                stack.push(next.as_str());
            }
        }
    }
    Ok(reachable)
}

/// Locates one cycle in the dependency relation with an iterative
/// three-color depth-first search. Returns the cycle as an ordered id list
/// beginning and ending at the same node.
fn find_cycle(depends: &Edges) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        New,
        Open,
        Done,
    }

    let mut marks: BTreeMap<&str, Mark> = depends
        .keys()
        .map(|id| (id.as_str(), Mark::New))
        .collect();

    for root in depends.keys() {
        if marks[root.as_str()] != Mark::New {
            continue;
        }
        marks.insert(root.as_str(), Mark::Open);
        let mut path: Vec<&str> = vec![root.as_str()];
        let mut frames = vec![depends[root.as_str()].iter()];

        loop {
            let Some(step) = frames.last_mut().map(|frame| frame.next()) else {
                break;
            };
            match step {
                Some(dep) => match marks[dep.as_str()] {
                    Mark::New => {
                        marks.insert(dep.as_str(), Mark::Open);
                        path.push(dep.as_str());
                        frames.push(depends[dep.as_str()].iter());
                    }
                    Mark::Open => {
                        let start = path
                            .iter()
                            .position(|n| *n == dep.as_str())
                            .unwrap_or_default();
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|s| (*s).to_string()).collect();
                        cycle.push(dep.clone());
                        return cycle;
                    }
                    Mark::Done => {}
                },
                None => {
                    frames.pop();
                    if let Some(done) = path.pop() {
                        marks.insert(done, Mark::Done);
                    }
                }
            }
        }
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::Migration;
    use chrono::DateTime;

    fn migration_set(specs: &[(&str, &[&str])]) -> MigrationSet {
        specs
            .iter()
            .map(|(id, deps)| {
                let migration = Migration {
                    id: (*id).to_string(),
                    depends: deps.iter().map(|d| (*d).to_string()).collect(),
                    description: String::new(),
                    created: DateTime::UNIX_EPOCH,
                    apply: String::new(),
                    revert: Some(String::new()),
                };
                ((*id).to_string(), migration)
            })
            .collect()
    }

    #[test]
    fn test_linear_chain_order() {
        let set = migration_set(&[("root", &[]), ("a", &["root"]), ("b", &["a"])]);
        let graph = DependencyGraph::build(&set).unwrap();
        assert_eq!(graph.topo_order(), ["root", "a", "b"]);
    }

    #[test]
    fn test_diamond_breaks_ties_lexicographically() {
        let set = migration_set(&[
            ("root", &[]),
            ("b", &["root"]),
            ("a", &["root"]),
            ("c", &["a", "b"]),
        ]);
        let graph = DependencyGraph::build(&set).unwrap();
        assert_eq!(graph.topo_order(), ["root", "a", "b", "c"]);
    }

    #[test]
    fn test_ancestors_are_a_topological_prefix() {
        let set = migration_set(&[
            ("root", &[]),
            ("a", &["root"]),
            ("b", &["root"]),
            ("c", &["a", "b"]),
        ]);
        let graph = DependencyGraph::build(&set).unwrap();
        assert_eq!(graph.ancestors("c").unwrap(), ["root", "a", "b"]);
        assert_eq!(graph.ancestors("a").unwrap(), ["root"]);
        assert!(graph.ancestors("root").unwrap().is_empty());
    }

    #[test]
    fn test_descendants_are_in_revert_order() {
        let set = migration_set(&[
            ("root", &[]),
            ("a", &["root"]),
            ("b", &["root"]),
            ("c", &["a", "b"]),
        ]);
        let graph = DependencyGraph::build(&set).unwrap();
        assert_eq!(graph.descendants("a").unwrap(), ["c"]);
        assert_eq!(graph.descendants("root").unwrap(), ["c", "b", "a"]);
        assert!(graph.descendants("c").unwrap().is_empty());
    }

    #[test]
    fn test_descendants_mirror_ancestors() {
        let set = migration_set(&[
            ("root", &[]),
            ("a", &["root"]),
            ("b", &["a"]),
            ("c", &["a"]),
        ]);
        let graph = DependencyGraph::build(&set).unwrap();
        for id in set.keys() {
            for other in set.keys() {
                let is_descendant = graph.descendants(id).unwrap().contains(other);
                let has_ancestor = graph.ancestors(other).unwrap().contains(id);
                assert_eq!(is_descendant, has_ancestor, "{id} vs {other}");
            }
        }
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let set = migration_set(&[("a", &["b"]), ("b", &["a"])]);
        let err = DependencyGraph::build(&set).unwrap_err();
        match err {
            MigrateError::CircularDependency { cycle } => {
                assert_eq!(cycle.first(), cycle.last());
                assert!(cycle.contains(&"a".to_string()));
                assert!(cycle.contains(&"b".to_string()));
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let set = migration_set(&[("a", &["a"])]);
        let err = DependencyGraph::build(&set).unwrap_err();
        match err {
            MigrateError::CircularDependency { cycle } => {
                assert_eq!(cycle, ["a", "a"]);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let set = migration_set(&[("a", &["ghost"])]);
        assert!(matches!(
            DependencyGraph::build(&set),
            Err(MigrateError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_unknown_migration_query() {
        let set = migration_set(&[("a", &[])]);
        let graph = DependencyGraph::build(&set).unwrap();
        assert!(matches!(
            graph.ancestors("ghost"),
            Err(MigrateError::UnknownMigration(_))
        ));
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let set = migration_set(&[
            ("root", &[]),
            ("x", &["root"]),
            ("m", &["root"]),
            ("a", &["x", "m"]),
        ]);
        let first = DependencyGraph::build(&set).unwrap();
        let second = DependencyGraph::build(&set).unwrap();
        assert_eq!(first.topo_order(), second.topo_order());
        assert_eq!(first.ancestors("a").unwrap(), second.ancestors("a").unwrap());
        assert_eq!(
            first.descendants("root").unwrap(),
            second.descendants("root").unwrap()
        );
    }
}
