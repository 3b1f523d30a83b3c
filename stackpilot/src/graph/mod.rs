//! Dependency graph over stack definitions.
//!
//! Orders a collection of stacks into a valid creation sequence and the
//! reverse for teardown. Cycles and unknown dependencies are rejected here,
//! before any backend call is made.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::core::StackDefinition;
use crate::errors::{CycleError, OrchestrationError, UnknownDependencyError};

/// A validated, ordered set of stack definitions.
///
/// The forward order is computed once at construction; `reverse_order` is
/// exactly that order reversed, never recomputed, so the two cannot diverge.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    stacks: Vec<StackDefinition>,
    /// Indices into `stacks`, in forward (creation) order.
    order: Vec<usize>,
}

impl DependencyGraph {
    /// Builds a graph from a set of stack definitions.
    ///
    /// Ties among stacks with no remaining dependency are broken by
    /// declaration order, so the result is deterministic.
    ///
    /// # Errors
    ///
    /// Returns `CycleError` if the dependency set contains a cycle,
    /// `UnknownDependencyError` if a dependency names a stack outside the
    /// input set, and `Validation` for duplicate or empty stack names.
    pub fn build(stacks: Vec<StackDefinition>) -> Result<Self, OrchestrationError> {
        let mut index_of: HashMap<&str, usize> = HashMap::with_capacity(stacks.len());
        for (idx, stack) in stacks.iter().enumerate() {
            if stack.name.trim().is_empty() {
                return Err(OrchestrationError::Validation(
                    "stack name cannot be empty".to_string(),
                ));
            }
            if index_of.insert(stack.name.as_str(), idx).is_some() {
                return Err(OrchestrationError::Validation(format!(
                    "duplicate stack name '{}'",
                    stack.name
                )));
            }
        }

        for stack in &stacks {
            for dep in &stack.depends_on {
                if !index_of.contains_key(dep.as_str()) {
                    return Err(UnknownDependencyError::new(&stack.name, dep).into());
                }
            }
        }

        let order = topological_order(&stacks, &index_of)?;

        Ok(Self { stacks, order })
    }

    /// Returns the number of stacks in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    /// Returns true if the graph holds no stacks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Returns the stacks in forward (creation) order.
    #[must_use]
    pub fn forward_order(&self) -> Vec<&StackDefinition> {
        self.order.iter().map(|&idx| &self.stacks[idx]).collect()
    }

    /// Returns the stacks in teardown order: the forward order reversed.
    #[must_use]
    pub fn reverse_order(&self) -> Vec<&StackDefinition> {
        self.order
            .iter()
            .rev()
            .map(|&idx| &self.stacks[idx])
            .collect()
    }

    /// Looks up a stack by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StackDefinition> {
        self.stacks.iter().find(|stack| stack.name == name)
    }

    /// Returns the names of every stack that transitively depends on `name`.
    ///
    /// Used to block dependents when a stack fails: their required inputs
    /// will never become available, while unrelated branches may proceed.
    #[must_use]
    pub fn transitive_dependents(&self, name: &str) -> HashSet<String> {
        let mut dependents = HashSet::new();
        let mut frontier = vec![name.to_string()];

        while let Some(current) = frontier.pop() {
            for stack in &self.stacks {
                if stack.depends_on.contains(&current) && dependents.insert(stack.name.clone()) {
                    frontier.push(stack.name.clone());
                }
            }
        }

        dependents
    }
}

/// Kahn's algorithm with a declaration-order ready set.
fn topological_order(
    stacks: &[StackDefinition],
    index_of: &HashMap<&str, usize>,
) -> Result<Vec<usize>, OrchestrationError> {
    let n = stacks.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (idx, stack) in stacks.iter().enumerate() {
        // depends_on is deduplicated at definition time, but guard anyway
        let deps: BTreeSet<usize> = stack
            .depends_on
            .iter()
            .filter_map(|dep| index_of.get(dep.as_str()).copied())
            .collect();
        in_degree[idx] = deps.len();
        for dep in deps {
            dependents[dep].push(idx);
        }
    }

    // BTreeSet keeps the ready set sorted by declaration index
    let mut ready: BTreeSet<usize> = (0..n).filter(|&idx| in_degree[idx] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(idx) = ready.pop_first() {
        order.push(idx);
        for &dependent in &dependents[idx] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < n {
        return Err(find_cycle(stacks, index_of).into());
    }

    Ok(order)
}

/// Recovers one concrete cycle path for the error message.
fn find_cycle(stacks: &[StackDefinition], index_of: &HashMap<&str, usize>) -> CycleError {
    let n = stacks.len();
    let mut visited = vec![false; n];
    let mut on_stack = vec![false; n];
    let mut path: Vec<usize> = Vec::new();

    fn visit(
        idx: usize,
        stacks: &[StackDefinition],
        index_of: &HashMap<&str, usize>,
        visited: &mut [bool],
        on_stack: &mut [bool],
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        visited[idx] = true;
        on_stack[idx] = true;
        path.push(idx);

        for dep in &stacks[idx].depends_on {
            let Some(&dep_idx) = index_of.get(dep.as_str()) else {
                continue;
            };
            if on_stack[dep_idx] {
                let start = path.iter().position(|&p| p == dep_idx).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(dep_idx);
                return Some(cycle);
            }
            if !visited[dep_idx] {
                if let Some(cycle) = visit(dep_idx, stacks, index_of, visited, on_stack, path) {
                    return Some(cycle);
                }
            }
        }

        on_stack[idx] = false;
        path.pop();
        None
    }

    for idx in 0..n {
        if !visited[idx] {
            if let Some(cycle) = visit(
                idx,
                stacks,
                index_of,
                &mut visited,
                &mut on_stack,
                &mut path,
            ) {
                let names = cycle
                    .into_iter()
                    .map(|i| stacks[i].name.clone())
                    .collect::<Vec<_>>();
                return CycleError::new(names);
            }
        }
    }

    // Unreachable when called after Kahn's algorithm came up short.
    CycleError::new(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StackDefinition;

    fn stack(name: &str, deps: &[&str]) -> StackDefinition {
        let mut def = StackDefinition::new(name, format!("templates/{name}.yaml"));
        for dep in deps {
            def = def.with_dependency(*dep);
        }
        def
    }

    fn four_stack_set() -> Vec<StackDefinition> {
        vec![
            stack("network", &[]),
            stack("storage", &["network"]),
            stack("auth", &["network"]),
            stack("backend", &["storage", "auth"]),
        ]
    }

    #[test]
    fn test_forward_order_is_topological() {
        let graph = DependencyGraph::build(four_stack_set()).unwrap();
        let order: Vec<_> = graph
            .forward_order()
            .iter()
            .map(|s| s.name.clone())
            .collect();

        for stack in graph.forward_order() {
            let pos = order.iter().position(|n| *n == stack.name).unwrap();
            for dep in &stack.depends_on {
                let dep_pos = order.iter().position(|n| n == dep).unwrap();
                assert!(dep_pos < pos, "{dep} must precede {}", stack.name);
            }
        }
    }

    #[test]
    fn test_ties_broken_by_declaration_order() {
        let graph = DependencyGraph::build(four_stack_set()).unwrap();
        let order: Vec<_> = graph.forward_order().iter().map(|s| s.name.as_str()).collect::<Vec<_>>();

        // storage is declared before auth; both become ready together
        assert_eq!(order, vec!["network", "storage", "auth", "backend"]);
    }

    #[test]
    fn test_reverse_order_is_exact_reverse() {
        let graph = DependencyGraph::build(four_stack_set()).unwrap();
        let forward: Vec<_> = graph.forward_order().iter().map(|s| s.name.clone()).collect();
        let mut reversed: Vec<_> = graph.reverse_order().iter().map(|s| s.name.clone()).collect();
        reversed.reverse();

        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_teardown_order_never_deletes_network_first() {
        let graph = DependencyGraph::build(four_stack_set()).unwrap();
        let order: Vec<_> = graph.reverse_order().iter().map(|s| s.name.as_str()).collect::<Vec<_>>();

        assert_eq!(order[0], "backend");
        assert_eq!(order[3], "network");
    }

    #[test]
    fn test_cycle_rejected() {
        let stacks = vec![
            stack("a", &["c"]),
            stack("b", &["a"]),
            stack("c", &["b"]),
        ];

        let err = DependencyGraph::build(stacks).unwrap_err();
        match err {
            OrchestrationError::Cycle(cycle) => {
                assert_eq!(cycle.cycle_path.first(), cycle.cycle_path.last());
                assert!(cycle.cycle_path.len() >= 4);
            }
            other => panic!("expected CycleError, got {other}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = DependencyGraph::build(vec![stack("a", &["a"])]).unwrap_err();
        assert!(matches!(err, OrchestrationError::Cycle(_)));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let err = DependencyGraph::build(vec![stack("a", &["ghost"])]).unwrap_err();
        match err {
            OrchestrationError::UnknownDependency(e) => {
                assert_eq!(e.stack, "a");
                assert_eq!(e.dependency, "ghost");
            }
            other => panic!("expected UnknownDependencyError, got {other}"),
        }
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = DependencyGraph::build(vec![stack("a", &[]), stack("a", &[])]).unwrap_err();
        assert!(matches!(err, OrchestrationError::Validation(_)));
    }

    #[test]
    fn test_transitive_dependents() {
        let graph = DependencyGraph::build(four_stack_set()).unwrap();

        let of_network = graph.transitive_dependents("network");
        assert_eq!(of_network.len(), 3);
        assert!(of_network.contains("backend"));

        let of_auth = graph.transitive_dependents("auth");
        assert_eq!(of_auth.len(), 1);
        assert!(of_auth.contains("backend"));

        assert!(graph.transitive_dependents("backend").is_empty());
    }

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::build(Vec::new()).unwrap();
        assert!(graph.is_empty());
        assert!(graph.forward_order().is_empty());
    }
}
