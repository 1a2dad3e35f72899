//! Secondary section for RBAC and Secret/ConfigMap nodes. After the main
//! layout these kinds are relocated below the main graph: config objects
//! as two tight columns (collapsed into a group node past a count
//! threshold), RBAC as its own small layered block to their right.

use std::collections::HashSet;

use crate::graph::{
    EdgeKind, GroupItem, NodeData, NodeDetails, NodeKind, NodeStatus, Position, TopologyEdge,
    TopologyGraph, TopologyNode,
};

use super::ranked::{self, RankDir, RankSpacing};

pub const SECTION_OFFSET: f64 = 200.0;
pub const GROUP_THRESHOLD: usize = 2;
pub const GROUP_PREVIEW: usize = 3;

const COLUMN_GAP: f64 = 80.0;
const RBAC_GAP: f64 = 120.0;
const GRID_ROW_STEP: f64 = 160.0;
const GRID_COL_GAP: f64 = 60.0;
const ROLE_DROP_GAP: f64 = 60.0;

pub fn partition(graph: &mut TopologyGraph, spacing: f64) {
    if !graph.nodes.iter().any(|n| n.kind.in_side_section()) {
        return;
    }

    // Anchor below the main graph's bounding box.
    let mut min_x = f64::MAX;
    let mut max_y = f64::MIN;
    for node in graph.nodes.iter().filter(|n| !n.kind.in_side_section()) {
        let (_, h) = node.size();
        min_x = min_x.min(node.position.x);
        max_y = max_y.max(node.position.y + h);
    }
    if min_x == f64::MAX {
        min_x = 50.0;
        max_y = 50.0;
    }
    let anchor_x = min_x;
    let anchor_y = max_y + SECTION_OFFSET * spacing;

    collapse_into_group(graph, NodeKind::ConfigMap, "configmaps", "ConfigMaps");
    collapse_into_group(graph, NodeKind::Secret, "secrets", "Secrets");

    let config_ids = column_ids(graph, NodeKind::ConfigMap, "group-configmaps");
    let secret_ids = column_ids(graph, NodeKind::Secret, "group-secrets");

    let tight = RankSpacing {
        rank_sep: 60.0,
        node_sep: 40.0,
        margin_x: 0.0,
        margin_y: 0.0,
    };
    let mut columns_right = anchor_x;
    let mut col_x = anchor_x;
    let mut have_columns = false;
    for ids in [&config_ids, &secret_ids] {
        if ids.is_empty() {
            continue;
        }
        let width = layout_column(graph, ids, &tight, col_x, anchor_y);
        columns_right = col_x + width;
        col_x = columns_right + COLUMN_GAP;
        have_columns = true;
    }

    let rbac_ids: Vec<String> = graph
        .nodes
        .iter()
        .filter(|n| n.kind.is_rbac())
        .map(|n| n.id.clone())
        .collect();
    if !rbac_ids.is_empty() {
        let rbac_x = if have_columns {
            columns_right + RBAC_GAP
        } else {
            anchor_x
        };
        layout_rbac(graph, &rbac_ids, rbac_x, anchor_y);
    }

    graph.retain_valid_edges();
}

/// Replace all nodes of `kind` with one synthetic group node once the count
/// exceeds the threshold. The group carries the total count plus a capped
/// preview of member names. Edges into collapsed members go with them.
fn collapse_into_group(graph: &mut TopologyGraph, kind: NodeKind, slug: &str, label: &str) {
    let members: Vec<usize> = graph
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.kind == kind)
        .map(|(i, _)| i)
        .collect();
    if members.len() <= GROUP_THRESHOLD {
        return;
    }

    let count = members.len();
    let items: Vec<GroupItem> = members
        .iter()
        .take(GROUP_PREVIEW)
        .map(|&i| GroupItem {
            name: graph.nodes[i].data.label.clone(),
            status: graph.nodes[i].data.status,
        })
        .collect();
    let namespace = graph.nodes[members[0]].data.namespace.clone();
    let context = graph.nodes[members[0]].data.context.clone();

    let member_ids: HashSet<String> = members
        .iter()
        .map(|&i| graph.nodes[i].id.clone())
        .collect();
    graph.nodes.retain(|n| n.kind != kind);
    graph
        .edges
        .retain(|e| !member_ids.contains(&e.source) && !member_ids.contains(&e.target));

    graph.nodes.push(TopologyNode {
        id: format!("group-{slug}"),
        kind: NodeKind::Group,
        position: Position::default(),
        data: NodeData {
            label: format!("{label} ({count})"),
            status: NodeStatus::Healthy,
            namespace,
            context,
            resource: None,
            details: Some(NodeDetails {
                item_count: Some(count),
                items: Some(items),
                has_more: Some(count > GROUP_PREVIEW),
                ..Default::default()
            }),
        },
    });
}

fn column_ids(graph: &TopologyGraph, kind: NodeKind, group_id: &str) -> Vec<String> {
    graph
        .nodes
        .iter()
        .filter(|n| n.kind == kind || n.id == group_id)
        .map(|n| n.id.clone())
        .collect()
}

/// Stack one column with the tight layered pass and pin its top-left corner
/// to (x, y). Returns the column width.
fn layout_column(graph: &mut TopologyGraph, ids: &[String], sp: &RankSpacing, x: f64, y: f64) -> f64 {
    let mut subset = take_subset(graph, ids);
    ranked::run(&mut subset, &[], RankDir::LR, sp);
    translate_to(&mut subset, x, y);
    let width = subset.iter().map(|n| n.size().0).fold(0.0_f64, f64::max);
    write_back(graph, subset);
    width
}

fn layout_rbac(graph: &mut TopologyGraph, ids: &[String], x: f64, y: f64) {
    let idset: HashSet<&str> = ids.iter().map(String::as_str).collect();
    let mut subset = take_subset(graph, ids);
    let edges: Vec<TopologyEdge> = graph
        .edges
        .iter()
        .filter(|e| {
            e.edge_kind().is_some_and(|k| k.is_rbac())
                && idset.contains(e.source.as_str())
                && idset.contains(e.target.as_str())
        })
        .cloned()
        .collect();

    if edges.is_empty() {
        manual_grid(&mut subset, x, y);
        write_back(graph, subset);
        return;
    }

    ranked::run(
        &mut subset,
        &edges,
        RankDir::TB,
        &RankSpacing {
            rank_sep: 100.0,
            node_sep: 60.0,
            margin_x: 0.0,
            margin_y: 0.0,
        },
    );

    // A role always shares its x with the binding that references it and
    // sits strictly below that binding.
    for edge in &edges {
        if edge.edge_kind() != Some(EdgeKind::References) {
            continue;
        }
        let Some((bpos, bsize)) = subset
            .iter()
            .find(|n| n.id == edge.source)
            .map(|n| (n.position, n.size()))
        else {
            continue;
        };
        if let Some(role) = subset.iter_mut().find(|n| n.id == edge.target) {
            role.position.x = bpos.x;
            let below = bpos.y + bsize.1 + ROLE_DROP_GAP;
            if role.position.y < below {
                role.position.y = below;
            }
        }
    }

    // A lone service account centers over the full span of its bindings.
    let sa_count = subset
        .iter()
        .filter(|n| n.kind == NodeKind::ServiceAccount)
        .count();
    if sa_count == 1 {
        let spans: Vec<(f64, f64)> = subset
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::RoleBinding | NodeKind::ClusterRoleBinding))
            .map(|n| (n.position.x, n.position.x + n.size().0))
            .collect();
        if !spans.is_empty() {
            let left = spans.iter().map(|s| s.0).fold(f64::MAX, f64::min);
            let right = spans.iter().map(|s| s.1).fold(f64::MIN, f64::max);
            if let Some(sa) = subset.iter_mut().find(|n| n.kind == NodeKind::ServiceAccount) {
                let w = sa.size().0;
                sa.position.x = (left + right) / 2.0 - w / 2.0;
            }
        }
    }

    translate_to(&mut subset, x, y);
    write_back(graph, subset);
}

/// Fallback when there are RBAC nodes but no RBAC edges: fixed rows for
/// service accounts, bindings, then roles. Row y only ever increases.
fn manual_grid(nodes: &mut [TopologyNode], x: f64, y: f64) {
    let row_of = |n: &TopologyNode| -> usize {
        match n.kind {
            NodeKind::ServiceAccount => 0,
            NodeKind::RoleBinding | NodeKind::ClusterRoleBinding => 1,
            _ => 2,
        }
    };
    let mut row_counts = [0usize; 3];
    for node in nodes.iter_mut() {
        let row = row_of(node);
        let col = row_counts[row];
        row_counts[row] += 1;
        let (w, _) = node.size();
        node.position = Position {
            x: x + col as f64 * (w + GRID_COL_GAP),
            y: y + row as f64 * GRID_ROW_STEP,
        };
    }
}

fn take_subset(graph: &TopologyGraph, ids: &[String]) -> Vec<TopologyNode> {
    ids.iter()
        .filter_map(|id| graph.node(id).cloned())
        .collect()
}

fn translate_to(nodes: &mut [TopologyNode], x: f64, y: f64) {
    let min_x = nodes.iter().map(|n| n.position.x).fold(f64::MAX, f64::min);
    let min_y = nodes.iter().map(|n| n.position.y).fold(f64::MAX, f64::min);
    if min_x == f64::MAX {
        return;
    }
    for node in nodes {
        node.position.x += x - min_x;
        node.position.y += y - min_y;
    }
}

fn write_back(graph: &mut TopologyGraph, subset: Vec<TopologyNode>) {
    for node in subset {
        if let Some(slot) = graph.nodes.iter_mut().find(|n| n.id == node.id) {
            slot.position = node.position;
        }
    }
}
