use std::collections::HashSet;

use super::{TopologyFilters, TopologyGraph};

/// Re-derive the visible subset of a built graph. Pure and cheap enough to
/// run on every keystroke; never touches the underlying snapshot.
///
/// A non-empty search term short-circuits the status filter: search results
/// are shown regardless of their status.
pub fn apply(graph: &TopologyGraph, filters: &TopologyFilters) -> TopologyGraph {
    let search = filters.search_term.trim().to_lowercase();

    let nodes: Vec<_> = graph
        .nodes
        .iter()
        .filter(|node| {
            if !search.is_empty() {
                node.data.label.to_lowercase().contains(&search)
                    || node.kind.as_str().contains(&search)
            } else {
                filters.status_filter.matches(node.data.status)
            }
        })
        .cloned()
        .collect();

    let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let edges: Vec<_> = graph
        .edges
        .iter()
        .filter(|e| ids.contains(e.source.as_str()) && ids.contains(e.target.as_str()))
        .cloned()
        .collect();

    TopologyGraph { nodes, edges }
}
