//! Layered graph layout: longest-path rank assignment, weighted-barycenter
//! ordering within ranks, then coordinate assignment from the per-kind
//! sizing table. Deterministic for identical input.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::graph::{TopologyEdge, TopologyNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankDir {
    /// Ranks advance left to right.
    LR,
    /// Ranks advance top to bottom.
    TB,
}

#[derive(Debug, Clone, Copy)]
pub struct RankSpacing {
    pub rank_sep: f64,
    pub node_sep: f64,
    pub margin_x: f64,
    pub margin_y: f64,
}

const ORDERING_SWEEPS: usize = 4;

/// Position every node in `nodes`, considering only edges whose endpoints
/// are both in the slice. Positions are stored top-left.
pub fn run(nodes: &mut [TopologyNode], edges: &[TopologyEdge], dir: RankDir, sp: &RankSpacing) {
    let n = nodes.len();
    if n == 0 {
        return;
    }

    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.id.as_str(), i))
        .collect();

    let mut adj: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    let mut rev: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    for edge in edges {
        let (Some(&u), Some(&v)) = (
            index.get(edge.source.as_str()),
            index.get(edge.target.as_str()),
        ) else {
            continue;
        };
        if u == v {
            continue;
        }
        let w = edge.edge_kind().map(|k| k.weight()).unwrap_or(1.0);
        adj[u].push((v, w));
        rev[v].push((u, w));
    }

    let ranks = assign_ranks(n, &adj, &rev);
    let mut rank_order = build_rank_buckets(&ranks);

    for _ in 0..ORDERING_SWEEPS {
        for r in 1..rank_order.len() {
            reorder(&mut rank_order, &rev, nodes, r, r - 1);
        }
        for r in (0..rank_order.len().saturating_sub(1)).rev() {
            reorder(&mut rank_order, &adj, nodes, r, r + 1);
        }
    }

    assign_coordinates(nodes, &rank_order, dir, sp);
}

/// Longest-path layering over a Kahn traversal. Sources sit at rank 0; every
/// other node lands one past its deepest predecessor. Nodes on a cycle are
/// parked one rank past the deepest acyclic node.
fn assign_ranks(n: usize, adj: &[Vec<(usize, f64)>], rev: &[Vec<(usize, f64)>]) -> Vec<usize> {
    let mut in_degree: Vec<usize> = rev.iter().map(|preds| preds.len()).collect();
    let mut queue: Vec<usize> = (0..n).filter(|&v| in_degree[v] == 0).collect();
    let mut ranks = vec![0usize; n];
    let mut visited = vec![false; n];

    let mut head = 0;
    while head < queue.len() {
        let u = queue[head];
        head += 1;
        visited[u] = true;
        for &(v, _) in &adj[u] {
            ranks[v] = ranks[v].max(ranks[u] + 1);
            in_degree[v] -= 1;
            if in_degree[v] == 0 {
                queue.push(v);
            }
        }
    }

    if queue.len() < n {
        let max_rank = ranks.iter().copied().max().unwrap_or(0);
        for (v, rank) in ranks.iter_mut().enumerate() {
            if !visited[v] {
                *rank = max_rank + 1;
            }
        }
    }

    ranks
}

fn build_rank_buckets(ranks: &[usize]) -> Vec<Vec<usize>> {
    let max_rank = ranks.iter().copied().max().unwrap_or(0);
    let mut buckets = vec![Vec::new(); max_rank + 1];
    for (v, &r) in ranks.iter().enumerate() {
        buckets[r].push(v);
    }
    buckets
}

/// Reorder rank `r` by the weighted barycenter of each node's neighbors in
/// rank `ref_r`. Heavier edges pull harder, so weighted chains straighten.
fn reorder(
    rank_order: &mut [Vec<usize>],
    neighbors: &[Vec<(usize, f64)>],
    nodes: &[TopologyNode],
    r: usize,
    ref_r: usize,
) {
    let mut pos = vec![usize::MAX; nodes.len()];
    for (p, &v) in rank_order[ref_r].iter().enumerate() {
        pos[v] = p;
    }

    let mut scored: Vec<(usize, f64)> = rank_order[r]
        .iter()
        .map(|&v| (v, barycenter(&pos, &neighbors[v])))
        .collect();
    scored.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| nodes[a.0].id.cmp(&nodes[b.0].id))
    });
    rank_order[r] = scored.into_iter().map(|(v, _)| v).collect();
}

fn barycenter(pos: &[usize], neighbors: &[(usize, f64)]) -> f64 {
    let mut sum = 0.0;
    let mut total = 0.0;
    for &(nb, w) in neighbors {
        if pos[nb] != usize::MAX {
            sum += w * pos[nb] as f64;
            total += w;
        }
    }
    // Unconnected nodes sort last, tie-broken by id.
    if total == 0.0 { f64::MAX } else { sum / total }
}

fn assign_coordinates(
    nodes: &mut [TopologyNode],
    rank_order: &[Vec<usize>],
    dir: RankDir,
    sp: &RankSpacing,
) {
    let sizes: Vec<(f64, f64)> = nodes.iter().map(|n| n.size()).collect();
    let primary = |v: usize| match dir {
        RankDir::LR => sizes[v].0,
        RankDir::TB => sizes[v].1,
    };
    let cross = |v: usize| match dir {
        RankDir::LR => sizes[v].1,
        RankDir::TB => sizes[v].0,
    };

    // Center line of each rank along the primary axis.
    let mut rank_centers = Vec::with_capacity(rank_order.len());
    let mut cursor = match dir {
        RankDir::LR => sp.margin_x,
        RankDir::TB => sp.margin_y,
    };
    for rank in rank_order {
        let dim = rank.iter().map(|&v| primary(v)).fold(0.0_f64, f64::max);
        rank_centers.push(cursor + dim / 2.0);
        cursor += dim + sp.rank_sep;
    }

    // Cross-axis extent per rank, for centering against the widest rank.
    let extents: Vec<f64> = rank_order
        .iter()
        .map(|rank| {
            let span: f64 = rank.iter().map(|&v| cross(v)).sum();
            let gaps = rank.len().saturating_sub(1) as f64 * sp.node_sep;
            span + gaps
        })
        .collect();
    let widest = extents.iter().copied().fold(0.0_f64, f64::max);
    let cross_margin = match dir {
        RankDir::LR => sp.margin_y,
        RankDir::TB => sp.margin_x,
    };

    for (r, rank) in rank_order.iter().enumerate() {
        let mut offset = cross_margin + (widest - extents[r]) / 2.0;
        for &v in rank {
            let c = cross(v);
            let cross_center = offset + c / 2.0;
            let (cx, cy) = match dir {
                RankDir::LR => (rank_centers[r], cross_center),
                RankDir::TB => (cross_center, rank_centers[r]),
            };
            nodes[v].place_center(cx, cy);
            offset += c + sp.node_sep;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{
        EdgeData, EdgeKind, EdgeStyle, NodeData, NodeKind, NodeStatus, Position, TopologyEdge,
        TopologyNode,
    };

    fn node(id: &str, kind: NodeKind) -> TopologyNode {
        TopologyNode {
            id: id.into(),
            kind,
            position: Position::default(),
            data: NodeData {
                label: id.into(),
                status: NodeStatus::Healthy,
                namespace: "ns".into(),
                context: None,
                resource: None,
                details: None,
            },
        }
    }

    fn edge(source: &str, target: &str, kind: EdgeKind) -> TopologyEdge {
        TopologyEdge {
            id: format!("e-{source}-{target}"),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            style: EdgeStyle::Smoothstep,
            data: Some(EdgeData { kind }),
            marker_end: None,
        }
    }

    fn spacing() -> RankSpacing {
        RankSpacing {
            rank_sep: 150.0,
            node_sep: 120.0,
            margin_x: 50.0,
            margin_y: 50.0,
        }
    }

    #[test]
    fn chain_ranks_advance_along_x_in_lr() {
        let mut nodes = vec![
            node("a", NodeKind::Deployment),
            node("b", NodeKind::ReplicaSet),
            node("c", NodeKind::Pod),
        ];
        let edges = vec![
            edge("a", "b", EdgeKind::Manages),
            edge("b", "c", EdgeKind::Manages),
        ];
        run(&mut nodes, &edges, RankDir::LR, &spacing());
        let cx: Vec<f64> = nodes.iter().map(|n| n.center().0).collect();
        assert!(cx[0] < cx[1] && cx[1] < cx[2]);
        // single-node ranks all center on the same cross line
        let cy: Vec<f64> = nodes.iter().map(|n| n.center().1).collect();
        assert!((cy[0] - cy[1]).abs() < 1e-9 && (cy[1] - cy[2]).abs() < 1e-9);
    }

    #[test]
    fn chain_ranks_advance_along_y_in_tb() {
        let mut nodes = vec![node("a", NodeKind::Deployment), node("b", NodeKind::Pod)];
        let edges = vec![edge("a", "b", EdgeKind::Manages)];
        run(&mut nodes, &edges, RankDir::TB, &spacing());
        assert!(nodes[0].center().1 < nodes[1].center().1);
    }

    #[test]
    fn siblings_are_spaced_by_node_sep() {
        let mut nodes = vec![
            node("root", NodeKind::Deployment),
            node("p1", NodeKind::Pod),
            node("p2", NodeKind::Pod),
        ];
        let edges = vec![
            edge("root", "p1", EdgeKind::Manages),
            edge("root", "p2", EdgeKind::Manages),
        ];
        run(&mut nodes, &edges, RankDir::LR, &spacing());
        let (_, h) = NodeKind::Pod.size();
        let gap = (nodes[2].center().1 - nodes[1].center().1).abs();
        assert!((gap - (h + 120.0)).abs() < 1e-9);
    }

    #[test]
    fn heavier_parents_pull_their_children_first() {
        // c leans on r2 (heavy), d leans on r1 (heavy): ordering must flip
        // the id order and place d above c.
        let mut nodes = vec![
            node("r1", NodeKind::Service),
            node("r2", NodeKind::Service),
            node("c", NodeKind::Pod),
            node("d", NodeKind::Pod),
        ];
        let edges = vec![
            edge("r1", "c", EdgeKind::Mounts),
            edge("r2", "c", EdgeKind::Binds),
            edge("r1", "d", EdgeKind::Binds),
            edge("r2", "d", EdgeKind::Mounts),
        ];
        run(&mut nodes, &edges, RankDir::LR, &spacing());
        let c = nodes.iter().find(|n| n.id == "c").unwrap().center().1;
        let d = nodes.iter().find(|n| n.id == "d").unwrap().center().1;
        assert!(d < c);
    }

    #[test]
    fn edgeless_nodes_stack_into_one_column() {
        let mut nodes = vec![
            node("s1", NodeKind::Secret),
            node("s2", NodeKind::Secret),
            node("s3", NodeKind::Secret),
        ];
        run(
            &mut nodes,
            &[],
            RankDir::LR,
            &RankSpacing {
                rank_sep: 60.0,
                node_sep: 40.0,
                margin_x: 0.0,
                margin_y: 0.0,
            },
        );
        let x0 = nodes[0].center().0;
        assert!(nodes.iter().all(|n| (n.center().0 - x0).abs() < 1e-9));
        assert!(nodes[0].center().1 < nodes[1].center().1);
        assert!(nodes[1].center().1 < nodes[2].center().1);
    }

    #[test]
    fn cycle_nodes_are_parked_past_the_acyclic_ranks() {
        let mut nodes = vec![
            node("a", NodeKind::Service),
            node("x", NodeKind::Pod),
            node("y", NodeKind::Pod),
        ];
        let edges = vec![
            edge("x", "y", EdgeKind::Manages),
            edge("y", "x", EdgeKind::Manages),
        ];
        run(&mut nodes, &edges, RankDir::LR, &spacing());
        let ax = nodes[0].center().0;
        assert!(nodes[1].center().0 > ax);
        assert!(nodes[2].center().0 > ax);
    }

    #[test]
    fn run_is_deterministic() {
        let build = || {
            let mut nodes = vec![
                node("root", NodeKind::Deployment),
                node("p1", NodeKind::Pod),
                node("p2", NodeKind::Pod),
                node("svc", NodeKind::Service),
            ];
            let edges = vec![
                edge("root", "p1", EdgeKind::Manages),
                edge("root", "p2", EdgeKind::Manages),
            ];
            run(&mut nodes, &edges, RankDir::TB, &spacing());
            nodes
        };
        assert_eq!(build(), build());
    }
}
