//! Finds groups of suspended computations that can only wait on each other.
//!
//! At quiescence every suspended computation waits on some dependee. If all
//! dependees of a strongly connected group of suspended computations lie
//! inside the group, nothing outside can ever wake any of them again: the
//! group is *closed* and has to be resolved.

use std::collections::HashSet;

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;

use crate::state::{Depender, StateId};

/// One suspended computation and the states it waits on.
#[derive(Debug, Clone)]
pub struct SuspendedNode {
    pub depender: Depender,
    pub dependees: Vec<StateId>,
}

/// Closed strongly connected components, as lists of dependers.
pub fn closed_components(nodes: &[SuspendedNode]) -> Vec<Vec<Depender>> {
    let suspended: HashSet<u32> = nodes.iter().map(|n| n.depender.encode()).collect();
    let mut graph = DiGraphMap::<u32, ()>::new();
    // waiting on something that is not suspended itself, e.g. a value that
    // still falls back or a kind of a later phase
    let mut open = HashSet::new();
    for node in nodes {
        let from = node.depender.encode();
        graph.add_node(from);
        for &dependee in &node.dependees {
            let to = Depender::State(dependee).encode();
            if suspended.contains(&to) {
                graph.add_edge(from, to, ());
            } else {
                open.insert(from);
            }
        }
    }
    tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| {
            let members: HashSet<u32> = scc.iter().copied().collect();
            scc.iter().all(|node| {
                !open.contains(node) && graph.neighbors(*node).all(|to| members.contains(&to))
            })
        })
        .map(|scc| scc.into_iter().map(Depender::decode).collect())
        .collect()
}
