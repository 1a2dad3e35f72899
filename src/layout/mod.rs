pub mod radial;
pub mod ranked;
pub mod sections;

use std::collections::HashMap;

use crate::graph::{EdgeStyle, Handle, LayoutMode, TopologyGraph, ViewOptions};

use ranked::{RankDir, RankSpacing};

pub const RANK_SEP: f64 = 150.0;
pub const NODE_SEP: f64 = 120.0;
pub const MARGIN: f64 = 50.0;

/// Below this center-to-center delta the vertical mode keeps top/bottom
/// handles, so near-aligned nodes do not flip sides between rebuilds.
pub const MIN_HANDLE_DELTA: f64 = 100.0;

/// Assign an absolute position to every node and a handle pair to every
/// edge, per the requested mode.
pub fn layout(mut graph: TopologyGraph, view: &ViewOptions) -> TopologyGraph {
    let spacing = if view.spacing > 0.0 { view.spacing } else { 1.0 };
    match view.layout {
        LayoutMode::Horizontal => {
            ranked::run(
                &mut graph.nodes,
                &graph.edges,
                RankDir::LR,
                &primary_spacing(spacing),
            );
            sections::partition(&mut graph, spacing);
        }
        LayoutMode::Vertical => {
            ranked::run(
                &mut graph.nodes,
                &graph.edges,
                RankDir::TB,
                &primary_spacing(spacing),
            );
            sections::partition(&mut graph, spacing);
        }
        LayoutMode::Radial => {
            radial::run(&mut graph.nodes);
            for edge in &mut graph.edges {
                edge.style = EdgeStyle::Straight;
            }
        }
    }
    assign_handles(&mut graph, view.layout);
    graph
}

fn primary_spacing(spacing: f64) -> RankSpacing {
    RankSpacing {
        rank_sep: RANK_SEP * spacing,
        node_sep: NODE_SEP * spacing,
        margin_x: MARGIN,
        margin_y: MARGIN,
    }
}

/// Pick the node side each edge attaches to, from relative geometry. RBAC
/// edges are always vertical; the horizontal mode forces left/right on
/// everything else. Edges with preassigned handles are left alone.
fn assign_handles(graph: &mut TopologyGraph, mode: LayoutMode) {
    let centers: HashMap<&str, (f64, f64)> = graph
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), n.center()))
        .collect();

    let mut assignments: Vec<(usize, Handle, Handle)> = Vec::new();
    for (i, edge) in graph.edges.iter().enumerate() {
        if edge.source_handle.is_some() || edge.target_handle.is_some() {
            continue;
        }
        let (Some(&sc), Some(&tc)) = (
            centers.get(edge.source.as_str()),
            centers.get(edge.target.as_str()),
        ) else {
            continue;
        };
        let rbac = edge.edge_kind().is_some_and(|k| k.is_rbac());
        let pair = if rbac {
            vertical_handles(sc, tc)
        } else {
            match mode {
                LayoutMode::Horizontal => horizontal_handles(sc, tc),
                LayoutMode::Vertical | LayoutMode::Radial => {
                    let dx = tc.0 - sc.0;
                    let dy = tc.1 - sc.1;
                    if dx.abs() > dy.abs() && dx.abs() > MIN_HANDLE_DELTA {
                        horizontal_handles(sc, tc)
                    } else {
                        vertical_handles(sc, tc)
                    }
                }
            }
        };
        assignments.push((i, pair.0, pair.1));
    }
    for (i, sh, th) in assignments {
        graph.edges[i].source_handle = Some(sh);
        graph.edges[i].target_handle = Some(th);
    }
}

fn horizontal_handles(sc: (f64, f64), tc: (f64, f64)) -> (Handle, Handle) {
    if sc.0 <= tc.0 {
        (Handle::Right, Handle::Left)
    } else {
        (Handle::Left, Handle::Right)
    }
}

fn vertical_handles(sc: (f64, f64), tc: (f64, f64)) -> (Handle, Handle) {
    if sc.1 <= tc.1 {
        (Handle::Bottom, Handle::Top)
    } else {
        (Handle::Top, Handle::Bottom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder;
    use crate::graph::{LayoutMode, Position, TopologyFilters};
    use crate::models::k8s::{PodInfo, ReplicaSetInfo, RoleBindingInfo, RoleInfo, RoleRef, ServiceAccountInfo};
    use crate::models::topology::{TopologySnapshot, WorkloadInfo, WorkloadStatus};

    fn snapshot_with_rbac() -> TopologySnapshot {
        TopologySnapshot {
            namespace: "prod".into(),
            workload: WorkloadInfo {
                name: "web".into(),
                uid: None,
                status: WorkloadStatus::Deployment {
                    replicas: 1,
                    ready_replicas: 1,
                    available_replicas: 1,
                },
            },
            replica_sets: vec![ReplicaSetInfo {
                name: "web-1".into(),
                namespace: "prod".into(),
                replicas: 1,
                ready_replicas: 1,
                pods: vec![PodInfo {
                    name: "web-1-a".into(),
                    namespace: "prod".into(),
                    phase: "Running".into(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            pods: vec![],
            services: vec![],
            endpoints: vec![],
            secrets: vec![],
            config_maps: vec![],
            service_account: Some(ServiceAccountInfo {
                name: "web-sa".into(),
                namespace: "prod".into(),
                ..Default::default()
            }),
            roles: vec![RoleInfo {
                name: "web-role".into(),
                namespace: "prod".into(),
                ..Default::default()
            }],
            role_bindings: vec![RoleBindingInfo {
                name: "web-rb".into(),
                namespace: "prod".into(),
                role_ref: RoleRef {
                    kind: "Role".into(),
                    name: "web-role".into(),
                    api_group: String::new(),
                },
                ..Default::default()
            }],
            cluster_roles: vec![],
            cluster_role_bindings: vec![],
        }
    }

    fn positioned(mode: LayoutMode) -> TopologyGraph {
        let raw = builder::build(
            &snapshot_with_rbac(),
            &TopologyFilters::default(),
            None,
            mode,
        );
        layout(
            raw,
            &ViewOptions {
                layout: mode,
                ..Default::default()
            },
        )
    }

    #[test]
    fn every_node_gets_a_position() {
        let graph = positioned(LayoutMode::Horizontal);
        let untouched = Position::default();
        let moved = graph
            .nodes
            .iter()
            .filter(|n| n.position != untouched)
            .count();
        // with margins at 50 nothing legitimately lands on the origin
        assert_eq!(moved, graph.nodes.len());
    }

    #[test]
    fn rbac_edges_use_vertical_handles_in_every_mode() {
        for mode in [LayoutMode::Horizontal, LayoutMode::Vertical, LayoutMode::Radial] {
            let graph = positioned(mode);
            for edge in graph
                .edges
                .iter()
                .filter(|e| e.edge_kind().is_some_and(|k| k.is_rbac()))
            {
                let sh = edge.source_handle.unwrap();
                let th = edge.target_handle.unwrap();
                assert!(
                    matches!(sh, Handle::Top | Handle::Bottom),
                    "{:?} source {:?}",
                    mode,
                    sh
                );
                assert!(
                    matches!(th, Handle::Top | Handle::Bottom),
                    "{:?} target {:?}",
                    mode,
                    th
                );
            }
        }
    }

    #[test]
    fn horizontal_mode_forces_side_handles_on_structural_edges() {
        let graph = positioned(LayoutMode::Horizontal);
        for edge in graph
            .edges
            .iter()
            .filter(|e| !e.edge_kind().is_some_and(|k| k.is_rbac()))
        {
            assert!(matches!(
                edge.source_handle.unwrap(),
                Handle::Left | Handle::Right
            ));
            assert!(matches!(
                edge.target_handle.unwrap(),
                Handle::Left | Handle::Right
            ));
        }
    }

    #[test]
    fn radial_mode_switches_edge_style() {
        let graph = positioned(LayoutMode::Radial);
        assert!(graph.edges.iter().all(|e| e.style == EdgeStyle::Straight));
    }

    #[test]
    fn vertical_mode_keeps_near_aligned_edges_vertical() {
        // parent directly above child, horizontal delta under the threshold
        let mut graph = positioned(LayoutMode::Vertical);
        graph.edges.clear();
        graph.nodes.truncate(2);
        graph.nodes[0].position = Position { x: 100.0, y: 0.0 };
        graph.nodes[1].position = Position { x: 130.0, y: 400.0 };
        let (a, b) = (graph.nodes[0].id.clone(), graph.nodes[1].id.clone());
        graph.edges.push(crate::graph::TopologyEdge {
            id: "e-test".into(),
            source: a,
            target: b,
            source_handle: None,
            target_handle: None,
            style: EdgeStyle::Smoothstep,
            data: None,
            marker_end: None,
        });
        assign_handles(&mut graph, LayoutMode::Vertical);
        assert_eq!(graph.edges[0].source_handle, Some(Handle::Bottom));
        assert_eq!(graph.edges[0].target_handle, Some(Handle::Top));
    }
}
