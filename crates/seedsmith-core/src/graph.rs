use std::collections::BTreeSet;

/// Result of dependency resolution over foreign-key edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOrder {
    /// Every input table exactly once; a table follows its dependencies
    /// except across a reported cycle.
    pub order: Vec<String>,
    /// Detected dependency cycles, each in discovery order.
    pub cycles: Vec<Vec<String>>,
}

/// Topologically sort `input` so that dependencies returned by `deps`
/// precede the tables that depend on them.
///
/// Iterative depth-first traversal over three disjoint states: unvisited,
/// in-progress (a stack in discovery order), and finished (post-order
/// output). When a dependency is found on the in-progress stack, the
/// sub-stack from that node to the top is recorded as a cycle and the
/// closing edge is dropped, so traversal always terminates and every
/// input appears exactly once in the output. Duplicates in `input` are
/// discarded; dependencies outside `input` are ignored.
///
/// Roots and dependency lists are iterated lexicographically, so equal
/// inputs always produce the same order and the same reported cycles.
pub fn resolve_order<F>(input: &[String], mut deps: F) -> TableOrder
where
    F: FnMut(&str) -> Vec<String>,
{
    let known: BTreeSet<String> = input.iter().cloned().collect();
    let mut unvisited = known.clone();
    let mut finished = Vec::with_capacity(known.len());
    let mut cycles = Vec::new();

    // Pending lists are popped from the back; storing them in reverse
    // lexicographic order makes traversal visit dependencies smallest-first.
    let mut pending_for = |name: &str| -> Vec<String> {
        let set: BTreeSet<String> = deps(name)
            .into_iter()
            .filter(|dep| known.contains(dep))
            .collect();
        set.into_iter().rev().collect()
    };

    while let Some(root) = unvisited.iter().next().cloned() {
        unvisited.remove(&root);
        let mut in_progress = vec![root.clone()];
        let mut pending = vec![pending_for(&root)];

        while let Some(remaining) = pending.last_mut() {
            let Some(next) = remaining.pop() else {
                pending.pop();
                if let Some(done) = in_progress.pop() {
                    finished.push(done);
                }
                continue;
            };

            if unvisited.remove(&next) {
                let next_pending = pending_for(&next);
                in_progress.push(next);
                pending.push(next_pending);
            } else if let Some(start) = in_progress.iter().position(|node| node == &next) {
                // Edge back into the in-progress stack: a cycle from `next`
                // up to the current top. Record it and drop the edge.
                cycles.push(in_progress[start..].to_vec());
            }
            // Already finished: nothing to do.
        }
    }

    TableOrder {
        order: finished,
        cycles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(from, to)| (from.to_string(), names(to)))
            .collect()
    }

    fn resolve(input: &[&str], edges: &[(&str, &[&str])]) -> TableOrder {
        let graph = graph(edges);
        resolve_order(&names(input), |name| {
            graph.get(name).cloned().unwrap_or_default()
        })
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|item| item == name).unwrap()
    }

    #[test]
    fn chain_orders_dependencies_first() {
        let result = resolve(&["c", "b", "a"], &[("b", &["a"]), ("c", &["b"])]);
        assert_eq!(result.order, names(&["a", "b", "c"]));
        assert!(result.cycles.is_empty());
    }

    #[test]
    fn acyclic_graph_places_every_table_after_its_dependencies() {
        let edges: &[(&str, &[&str])] = &[
            ("visit", &["person", "site"]),
            ("observation", &["visit", "concept"]),
            ("person", &["site"]),
        ];
        let result = resolve(&["observation", "person", "site", "visit", "concept"], edges);

        assert_eq!(result.order.len(), 5);
        assert!(result.cycles.is_empty());
        for (table, deps) in edges {
            for dep in *deps {
                assert!(
                    position(&result.order, dep) < position(&result.order, table),
                    "{dep} must precede {table} in {:?}",
                    result.order
                );
            }
        }
    }

    #[test]
    fn cycle_is_reported_and_every_table_still_appears_once() {
        let result = resolve(
            &["a", "b", "c", "d"],
            &[("a", &["b"]), ("b", &["c"]), ("c", &["a"]), ("d", &["a"])],
        );

        let mut sorted = result.order.clone();
        sorted.sort();
        assert_eq!(sorted, names(&["a", "b", "c", "d"]));

        assert_eq!(result.cycles.len(), 1);
        let mut cycle = result.cycles[0].clone();
        cycle.sort();
        assert_eq!(cycle, names(&["a", "b", "c"]));
    }

    #[test]
    fn self_loop_is_a_single_node_cycle() {
        let result = resolve(&["a"], &[("a", &["a"])]);
        assert_eq!(result.order, names(&["a"]));
        assert_eq!(result.cycles, vec![names(&["a"])]);
    }

    #[test]
    fn two_node_cycle() {
        let result = resolve(&["x", "y"], &[("x", &["y"]), ("y", &["x"])]);
        assert_eq!(result.order.len(), 2);
        assert_eq!(result.cycles.len(), 1);
        let mut cycle = result.cycles[0].clone();
        cycle.sort();
        assert_eq!(cycle, names(&["x", "y"]));
    }

    #[test]
    fn dependencies_outside_the_input_are_ignored() {
        let result = resolve(&["b"], &[("b", &["a"])]);
        assert_eq!(result.order, names(&["b"]));
        assert!(result.cycles.is_empty());
    }

    #[test]
    fn duplicate_input_names_are_discarded() {
        let input = names(&["a", "a", "b"]);
        let result = resolve_order(&input, |_| Vec::new());
        assert_eq!(result.order.len(), 2);
    }

    #[test]
    fn order_is_deterministic_across_runs() {
        let edges: &[(&str, &[&str])] = &[
            ("visit", &["person"]),
            ("person", &["visit"]),
            ("observation", &["visit", "person"]),
        ];
        let first = resolve(&["person", "visit", "observation"], edges);
        let second = resolve(&["observation", "visit", "person"], edges);
        assert_eq!(first, second);
    }
}
