use std::f64::consts::TAU;

use crate::graph::TopologyNode;

pub const CENTER_X: f64 = 600.0;
pub const CENTER_Y: f64 = 400.0;
pub const RADIUS: f64 = 420.0;

/// Place the workload root at the fixed center and every other node on a
/// circle around it at equal angular increments, in node order.
pub fn run(nodes: &mut [TopologyNode]) {
    if nodes.is_empty() {
        return;
    }
    let root = nodes
        .iter()
        .position(|n| n.kind.is_workload_root())
        .unwrap_or(0);
    nodes[root].place_center(CENTER_X, CENTER_Y);

    let count = nodes.len() - 1;
    if count == 0 {
        return;
    }
    let step = TAU / count as f64;
    let mut slot = 0usize;
    for (idx, node) in nodes.iter_mut().enumerate() {
        if idx == root {
            continue;
        }
        let angle = slot as f64 * step;
        node.place_center(
            CENTER_X + RADIUS * angle.cos(),
            CENTER_Y + RADIUS * angle.sin(),
        );
        slot += 1;
    }
}
