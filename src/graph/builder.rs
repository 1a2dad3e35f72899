use std::collections::HashSet;

use serde_json::to_value;

use crate::helpers::{container_status, parse_age, pod_phase_status};
use crate::models::k8s::{
    ConfigMapInfo, EndpointsInfo, PodInfo, ReplicaSetInfo, RoleBindingInfo, RoleInfo, SecretInfo,
    ServiceAccountInfo, ServiceInfo,
};
use crate::models::topology::{TopologySnapshot, WorkloadInfo, WorkloadKind, WorkloadStatus};

use super::filter;
use super::{
    EdgeData, EdgeKind, EdgeStyle, LayoutMode, NodeData, NodeDetails, NodeKind, NodeStatus,
    Position, TopologyEdge, TopologyFilters, TopologyGraph, TopologyNode,
};

/// Assemble the unpositioned graph for one workload snapshot. Pure: the same
/// snapshot and filters always produce the same nodes and edges, in the same
/// order.
pub fn build(
    snapshot: &TopologySnapshot,
    filters: &TopologyFilters,
    context: Option<&str>,
    mode: LayoutMode,
) -> TopologyGraph {
    let mut asm = Assembler {
        snapshot,
        filters,
        context,
        style: match mode {
            LayoutMode::Radial => EdgeStyle::Straight,
            _ => EdgeStyle::Smoothstep,
        },
        ids: HashSet::new(),
        nodes: Vec::new(),
        edges: Vec::new(),
    };

    let root_id = asm.push_workload();
    asm.push_pod_tree(&root_id);
    asm.push_services();
    asm.push_endpoints_edges();
    asm.push_mount_edges();
    asm.push_config();
    asm.push_rbac();
    asm.finish()
}

struct Assembler<'a> {
    snapshot: &'a TopologySnapshot,
    filters: &'a TopologyFilters,
    context: Option<&'a str>,
    style: EdgeStyle,
    ids: HashSet<String>,
    nodes: Vec<TopologyNode>,
    edges: Vec<TopologyEdge>,
}

impl<'a> Assembler<'a> {
    fn push_node(
        &mut self,
        kind: NodeKind,
        id: String,
        label: &str,
        status: NodeStatus,
        namespace: &str,
        resource: Option<serde_json::Value>,
        details: Option<NodeDetails>,
    ) {
        self.ids.insert(id.clone());
        self.nodes.push(TopologyNode {
            id,
            kind,
            position: Position::default(),
            data: NodeData {
                label: label.to_string(),
                status,
                namespace: self.namespace_or_default(namespace),
                context: self.context.map(str::to_string),
                resource,
                details,
            },
        });
    }

    fn push_edge(&mut self, source: &str, target: &str, kind: EdgeKind) {
        self.edges.push(TopologyEdge {
            id: format!("e-{source}-{target}"),
            source: source.to_string(),
            target: target.to_string(),
            source_handle: None,
            target_handle: None,
            style: self.style,
            data: Some(EdgeData { kind }),
            marker_end: Some("arrow".to_string()),
        });
    }

    fn namespace_or_default(&self, ns: &str) -> String {
        if ns.is_empty() {
            self.snapshot.namespace.clone()
        } else {
            ns.to_string()
        }
    }

    // The workload itself is always emitted, regardless of filters.
    fn push_workload(&mut self) -> String {
        let workload = &self.snapshot.workload;
        let kind = workload_node_kind(workload.status.kind());
        let id = kind.node_id(&workload.name);
        let details = match &workload.status {
            WorkloadStatus::CronJob { schedule, .. } if !schedule.is_empty() => {
                Some(NodeDetails {
                    schedule: Some(schedule.clone()),
                    ..Default::default()
                })
            }
            _ => None,
        };
        let name = workload.name.clone();
        let status = workload_status(workload);
        let resource = to_value(workload).ok();
        self.push_node(kind, id.clone(), &name, status, "", resource, details);
        id
    }

    fn push_pod_tree(&mut self, root_id: &str) {
        let snap = self.snapshot;
        match snap.workload_kind() {
            WorkloadKind::Deployment => {
                if self.filters.show_replica_sets {
                    for rs in &snap.replica_sets {
                        let rs_id = self.push_replica_set(rs);
                        self.push_edge(root_id, &rs_id, EdgeKind::Manages);
                        if self.filters.show_pods {
                            for pod in &rs.pods {
                                self.push_pod(&rs_id, pod);
                            }
                        }
                    }
                } else if self.filters.show_pods {
                    // Without the ReplicaSet tier pods hang off the workload.
                    for rs in &snap.replica_sets {
                        for pod in &rs.pods {
                            self.push_pod(root_id, pod);
                        }
                    }
                }
            }
            // DaemonSet, Job, and CronJob own their pods directly.
            _ => {
                if self.filters.show_pods {
                    for pod in &snap.pods {
                        self.push_pod(root_id, pod);
                    }
                }
            }
        }
    }

    fn push_replica_set(&mut self, rs: &ReplicaSetInfo) -> String {
        let id = NodeKind::ReplicaSet.node_id(&rs.name);
        let status = if rs.replicas == 0 {
            NodeStatus::Unknown
        } else if rs.ready_replicas >= rs.replicas {
            NodeStatus::Healthy
        } else if rs.ready_replicas > 0 {
            NodeStatus::Warning
        } else {
            NodeStatus::Error
        };
        let label = rs.name.clone();
        let ns = rs.namespace.clone();
        let resource = to_value(rs).ok();
        self.push_node(
            NodeKind::ReplicaSet,
            id.clone(),
            &label,
            status,
            &ns,
            resource,
            None,
        );
        id
    }

    fn push_pod(&mut self, parent_id: &str, pod: &PodInfo) {
        let id = NodeKind::Pod.node_id(&pod.name);
        let age = parse_age(&pod.start_time);
        let details = (!age.is_empty()).then(|| NodeDetails {
            age: Some(age),
            ..Default::default()
        });
        let label = pod.name.clone();
        let ns = pod.namespace.clone();
        let status = pod_phase_status(&pod.phase);
        let resource = to_value(pod).ok();
        self.push_node(NodeKind::Pod, id.clone(), &label, status, &ns, resource, details);
        self.push_edge(parent_id, &id, EdgeKind::Manages);

        if self.filters.show_containers {
            for (idx, container) in pod.containers.iter().enumerate() {
                // Container names are only unique within their pod.
                let cid = NodeKind::Container.node_id(&format!("{}-{idx}", pod.name));
                let status = container_status(container.ready, container.restart_count);
                let details = NodeDetails {
                    image: Some(container.image.clone()),
                    ..Default::default()
                };
                let label = container.name.clone();
                let resource = to_value(container).ok();
                self.push_node(
                    NodeKind::Container,
                    cid.clone(),
                    &label,
                    status,
                    &ns,
                    resource,
                    Some(details),
                );
                self.push_edge(&id, &cid, EdgeKind::Runs);
            }
        }
    }

    fn push_services(&mut self) {
        let snap = self.snapshot;
        if self.filters.show_services {
            for svc in &snap.services {
                self.push_service(svc);
            }
        }
        if self.filters.show_endpoints {
            for ep in &snap.endpoints {
                self.push_endpoints(ep);
            }
        }
        if self.filters.show_services && self.filters.show_endpoints {
            // A service maps to the endpoints object sharing its name.
            for svc in &snap.services {
                if snap.endpoints.iter().any(|ep| ep.name == svc.name) {
                    let svc_id = NodeKind::Service.node_id(&svc.name);
                    let ep_id = NodeKind::Endpoints.node_id(&svc.name);
                    self.push_edge(&svc_id, &ep_id, EdgeKind::Exposes);
                }
            }
        }
    }

    fn push_service(&mut self, svc: &ServiceInfo) {
        let id = NodeKind::Service.node_id(&svc.name);
        let label = svc.name.clone();
        let ns = svc.namespace.clone();
        let resource = to_value(svc).ok();
        self.push_node(
            NodeKind::Service,
            id,
            &label,
            NodeStatus::Healthy,
            &ns,
            resource,
            None,
        );
    }

    fn push_endpoints(&mut self, ep: &EndpointsInfo) {
        let id = NodeKind::Endpoints.node_id(&ep.name);
        let status = if ep.addresses.is_empty() {
            NodeStatus::Warning
        } else {
            NodeStatus::Healthy
        };
        let label = ep.name.clone();
        let ns = ep.namespace.clone();
        let resource = to_value(ep).ok();
        self.push_node(NodeKind::Endpoints, id, &label, status, &ns, resource, None);
    }

    fn push_endpoints_edges(&mut self) {
        if !self.filters.show_endpoints {
            return;
        }
        let snap = self.snapshot;
        // Multiple addresses may back the same pod; emit one edge per pair.
        let mut seen = HashSet::new();
        let mut edges = Vec::new();
        for ep in &snap.endpoints {
            let ep_id = NodeKind::Endpoints.node_id(&ep.name);
            if !self.ids.contains(&ep_id) {
                continue;
            }
            for addr in &ep.addresses {
                let Some(target) = &addr.target_ref else {
                    continue;
                };
                if target.kind != "Pod" {
                    continue;
                }
                let pod_id = NodeKind::Pod.node_id(&target.name);
                if self.ids.contains(&pod_id) && seen.insert((ep_id.clone(), pod_id.clone())) {
                    edges.push((ep_id.clone(), pod_id));
                }
            }
        }
        for (source, target) in edges {
            self.push_edge(&source, &target, EdgeKind::Targets);
        }
    }

    // Secret/ConfigMap -> Pod edges derived from declared pod volumes. A pod
    // may mount the same object through several volumes; one edge per pair.
    fn push_mount_edges(&mut self) {
        let snap = self.snapshot;
        let mut seen = HashSet::new();
        let mut edges = Vec::new();
        for pod in snap.all_pods() {
            let pod_id = NodeKind::Pod.node_id(&pod.name);
            if !self.ids.contains(&pod_id) {
                continue;
            }
            for volume in &pod.volumes {
                if let Some(src) = &volume.secret {
                    let secret_id = NodeKind::Secret.node_id(&src.secret_name);
                    if self.filters.show_secrets
                        && snap_has_secret(snap, &src.secret_name)
                        && seen.insert((secret_id.clone(), pod_id.clone()))
                    {
                        edges.push((secret_id, pod_id.clone()));
                    }
                }
                if let Some(src) = &volume.config_map {
                    let cm_id = NodeKind::ConfigMap.node_id(&src.name);
                    if self.filters.show_config_maps
                        && snap_has_config_map(snap, &src.name)
                        && seen.insert((cm_id.clone(), pod_id.clone()))
                    {
                        edges.push((cm_id, pod_id.clone()));
                    }
                }
            }
        }
        for (source, target) in edges {
            self.push_edge(&source, &target, EdgeKind::Mounts);
        }
    }

    fn push_config(&mut self) {
        let snap = self.snapshot;
        if self.filters.show_secrets {
            for secret in &snap.secrets {
                self.push_secret(secret);
            }
        }
        if self.filters.show_config_maps {
            for cm in &snap.config_maps {
                self.push_config_map(cm);
            }
        }
    }

    fn push_secret(&mut self, secret: &SecretInfo) {
        let id = NodeKind::Secret.node_id(&secret.name);
        let details = NodeDetails {
            data_keys: Some(secret.data.len()),
            size: Some(crate::helpers::human_bytes(secret.decoded_size() as i64)),
            ..Default::default()
        };
        let label = secret.name.clone();
        let ns = secret.namespace.clone();
        let resource = to_value(secret).ok();
        self.push_node(
            NodeKind::Secret,
            id,
            &label,
            NodeStatus::Healthy,
            &ns,
            resource,
            Some(details),
        );
    }

    fn push_config_map(&mut self, cm: &ConfigMapInfo) {
        let id = NodeKind::ConfigMap.node_id(&cm.name);
        let details = NodeDetails {
            data_keys: Some(cm.data.len()),
            ..Default::default()
        };
        let label = cm.name.clone();
        let ns = cm.namespace.clone();
        let resource = to_value(cm).ok();
        self.push_node(
            NodeKind::ConfigMap,
            id,
            &label,
            NodeStatus::Healthy,
            &ns,
            resource,
            Some(details),
        );
    }

    fn push_rbac(&mut self) {
        let snap = self.snapshot;
        let sa_id = if self.filters.show_service_account {
            snap.service_account
                .as_ref()
                .map(|sa| self.push_service_account(sa))
        } else {
            None
        };

        if !self.filters.show_rbac {
            return;
        }

        for role in &snap.roles {
            self.push_role(role, NodeKind::Role);
        }
        for role in &snap.cluster_roles {
            self.push_role(role, NodeKind::ClusterRole);
        }
        for binding in &snap.role_bindings {
            self.push_binding(binding, NodeKind::RoleBinding, sa_id.as_deref());
        }
        for binding in &snap.cluster_role_bindings {
            self.push_binding(binding, NodeKind::ClusterRoleBinding, sa_id.as_deref());
        }
    }

    fn push_service_account(&mut self, sa: &ServiceAccountInfo) -> String {
        let id = NodeKind::ServiceAccount.node_id(&sa.name);
        let label = sa.name.clone();
        let ns = sa.namespace.clone();
        let resource = to_value(sa).ok();
        self.push_node(
            NodeKind::ServiceAccount,
            id.clone(),
            &label,
            NodeStatus::Healthy,
            &ns,
            resource,
            None,
        );
        id
    }

    fn push_role(&mut self, role: &RoleInfo, kind: NodeKind) {
        let id = kind.node_id(&role.name);
        let label = role.name.clone();
        let ns = role.namespace.clone();
        let resource = to_value(role).ok();
        self.push_node(kind, id, &label, NodeStatus::Healthy, &ns, resource, None);
    }

    fn push_binding(&mut self, binding: &RoleBindingInfo, kind: NodeKind, sa_id: Option<&str>) {
        let id = kind.node_id(&binding.name);
        let label = binding.name.clone();
        let ns = binding.namespace.clone();
        let resource = to_value(binding).ok();
        self.push_node(
            kind,
            id.clone(),
            &label,
            NodeStatus::Healthy,
            &ns,
            resource,
            None,
        );
        if let Some(sa) = sa_id {
            let sa = sa.to_string();
            self.push_edge(&sa, &id, EdgeKind::Binds);
        }
        // Matched on roleRef name + kind; an unmatched ref just omits the edge.
        let role_kind = match binding.role_ref.kind.as_str() {
            "Role" => NodeKind::Role,
            "ClusterRole" => NodeKind::ClusterRole,
            _ => return,
        };
        let role_id = role_kind.node_id(&binding.role_ref.name);
        if self.ids.contains(&role_id) {
            self.push_edge(&id, &role_id, EdgeKind::References);
        }
    }

    fn finish(self) -> TopologyGraph {
        let mut graph = TopologyGraph {
            nodes: self.nodes,
            edges: self.edges,
        };
        graph.dedup_node_ids();
        graph.retain_valid_edges();
        filter::apply(&graph, self.filters)
    }
}

fn snap_has_secret(snap: &TopologySnapshot, name: &str) -> bool {
    snap.secrets.iter().any(|s| s.name == name)
}

fn snap_has_config_map(snap: &TopologySnapshot, name: &str) -> bool {
    snap.config_maps.iter().any(|c| c.name == name)
}

fn workload_node_kind(kind: WorkloadKind) -> NodeKind {
    match kind {
        WorkloadKind::Deployment => NodeKind::Deployment,
        WorkloadKind::DaemonSet => NodeKind::DaemonSet,
        WorkloadKind::Job => NodeKind::Job,
        WorkloadKind::CronJob => NodeKind::CronJob,
    }
}

fn workload_status(workload: &WorkloadInfo) -> NodeStatus {
    match &workload.status {
        WorkloadStatus::Deployment {
            replicas,
            ready_replicas,
            ..
        } => {
            if *replicas == 0 {
                NodeStatus::Unknown
            } else if ready_replicas >= replicas {
                NodeStatus::Healthy
            } else if *ready_replicas > 0 {
                NodeStatus::Warning
            } else {
                NodeStatus::Error
            }
        }
        WorkloadStatus::DaemonSet {
            desired_number_scheduled,
            number_ready,
        } => {
            if *desired_number_scheduled == 0 {
                NodeStatus::Unknown
            } else if number_ready >= desired_number_scheduled {
                NodeStatus::Healthy
            } else if *number_ready > 0 {
                NodeStatus::Warning
            } else {
                NodeStatus::Error
            }
        }
        WorkloadStatus::Job {
            active,
            succeeded,
            failed,
        } => {
            if *failed > 0 {
                NodeStatus::Error
            } else if *active > 0 {
                NodeStatus::Warning
            } else if *succeeded > 0 {
                NodeStatus::Healthy
            } else {
                NodeStatus::Unknown
            }
        }
        WorkloadStatus::CronJob { suspend, .. } => {
            if *suspend {
                NodeStatus::Warning
            } else {
                NodeStatus::Healthy
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::k8s::{
        ConfigMapVolumeSource, ContainerInfo, EndpointAddress, RoleRef, SecretVolumeSource,
        TargetRef, VolumeInfo,
    };
    use pretty_assertions::assert_eq;

    fn pod(name: &str, phase: &str) -> PodInfo {
        PodInfo {
            name: name.into(),
            namespace: "prod".into(),
            phase: phase.into(),
            containers: vec![ContainerInfo {
                name: "app".into(),
                image: "app:1".into(),
                ready: phase == "Running",
                restart_count: 0,
            }],
            ..Default::default()
        }
    }

    fn deployment_snapshot() -> TopologySnapshot {
        TopologySnapshot {
            namespace: "prod".into(),
            workload: WorkloadInfo {
                name: "web".into(),
                uid: Some("w-1".into()),
                status: WorkloadStatus::Deployment {
                    replicas: 2,
                    ready_replicas: 2,
                    available_replicas: 2,
                },
            },
            replica_sets: vec![ReplicaSetInfo {
                name: "web-1".into(),
                namespace: "prod".into(),
                replicas: 2,
                ready_replicas: 2,
                pods: vec![pod("web-1-a", "Running"), pod("web-1-b", "Running")],
                ..Default::default()
            }],
            pods: vec![],
            services: vec![],
            endpoints: vec![],
            secrets: vec![],
            config_maps: vec![],
            service_account: None,
            roles: vec![],
            role_bindings: vec![],
            cluster_roles: vec![],
            cluster_role_bindings: vec![],
        }
    }

    fn rich_snapshot() -> TopologySnapshot {
        let mut snap = deployment_snapshot();
        snap.replica_sets[0].pods[0].volumes = vec![
            VolumeInfo {
                name: "tls".into(),
                secret: Some(SecretVolumeSource {
                    secret_name: "web-tls".into(),
                }),
                config_map: None,
            },
            VolumeInfo {
                name: "cfg".into(),
                secret: None,
                config_map: Some(ConfigMapVolumeSource {
                    name: "web-config".into(),
                }),
            },
        ];
        snap.services = vec![ServiceInfo {
            name: "web".into(),
            namespace: "prod".into(),
            ..Default::default()
        }];
        snap.endpoints = vec![EndpointsInfo {
            name: "web".into(),
            namespace: "prod".into(),
            addresses: vec![EndpointAddress {
                ip: "10.0.0.5".into(),
                target_ref: Some(TargetRef {
                    kind: "Pod".into(),
                    name: "web-1-a".into(),
                    namespace: None,
                }),
            }],
            ..Default::default()
        }];
        snap.secrets = vec![SecretInfo {
            name: "web-tls".into(),
            namespace: "prod".into(),
            ..Default::default()
        }];
        snap.config_maps = vec![ConfigMapInfo {
            name: "web-config".into(),
            namespace: "prod".into(),
            ..Default::default()
        }];
        snap.service_account = Some(ServiceAccountInfo {
            name: "web-sa".into(),
            namespace: "prod".into(),
            ..Default::default()
        });
        snap.roles = vec![RoleInfo {
            name: "web-role".into(),
            namespace: "prod".into(),
            ..Default::default()
        }];
        snap.role_bindings = vec![RoleBindingInfo {
            name: "web-rb".into(),
            namespace: "prod".into(),
            role_ref: RoleRef {
                kind: "Role".into(),
                name: "web-role".into(),
                api_group: String::new(),
            },
            ..Default::default()
        }];
        snap
    }

    #[test]
    fn deployment_graph_has_expected_structure() {
        let graph = build(
            &deployment_snapshot(),
            &TopologyFilters::default(),
            None,
            LayoutMode::Horizontal,
        );
        assert_eq!(graph.nodes.len(), 4); // workload + rs + 2 pods
        assert_eq!(graph.edges.len(), 3); // workload->rs, rs->pod x2
        assert_eq!(graph.nodes[0].id, "deployment-web");
        assert!(graph.node("replicaset-web-1").is_some());
    }

    #[test]
    fn containers_appear_when_enabled() {
        let filters = TopologyFilters {
            show_containers: true,
            ..Default::default()
        };
        let graph = build(
            &deployment_snapshot(),
            &filters,
            None,
            LayoutMode::Horizontal,
        );
        assert_eq!(graph.nodes.len(), 6); // + 1 container per pod
        assert!(graph.node("container-web-1-a-0").is_some());
        let runs = graph
            .edges
            .iter()
            .filter(|e| e.edge_kind() == Some(EdgeKind::Runs))
            .count();
        assert_eq!(runs, 2);
    }

    #[test]
    fn disabling_replica_sets_attaches_pods_to_workload() {
        let filters = TopologyFilters {
            show_replica_sets: false,
            ..Default::default()
        };
        let graph = build(
            &deployment_snapshot(),
            &filters,
            None,
            LayoutMode::Horizontal,
        );
        assert!(graph.node("replicaset-web-1").is_none());
        assert!(graph
            .edges
            .iter()
            .any(|e| e.source == "deployment-web" && e.target == "pod-web-1-a"));
    }

    #[test]
    fn daemonset_pods_attach_directly() {
        let snap = TopologySnapshot {
            namespace: "kube-system".into(),
            workload: WorkloadInfo {
                name: "node-exporter".into(),
                uid: None,
                status: WorkloadStatus::DaemonSet {
                    desired_number_scheduled: 2,
                    number_ready: 2,
                },
            },
            replica_sets: vec![],
            pods: vec![pod("node-exporter-x", "Running")],
            services: vec![],
            endpoints: vec![],
            secrets: vec![],
            config_maps: vec![],
            service_account: None,
            roles: vec![],
            role_bindings: vec![],
            cluster_roles: vec![],
            cluster_role_bindings: vec![],
        };
        let graph = build(&snap, &TopologyFilters::default(), None, LayoutMode::Horizontal);
        assert!(graph
            .edges
            .iter()
            .any(|e| e.source == "daemonset-node-exporter" && e.target == "pod-node-exporter-x"));
    }

    #[test]
    fn service_endpoints_and_mount_edges() {
        let graph = build(
            &rich_snapshot(),
            &TopologyFilters::default(),
            None,
            LayoutMode::Horizontal,
        );
        let kinds: Vec<(EdgeKind, &str, &str)> = graph
            .edges
            .iter()
            .filter_map(|e| e.edge_kind().map(|k| (k, e.source.as_str(), e.target.as_str())))
            .collect();
        assert!(kinds.contains(&(EdgeKind::Exposes, "service-web", "endpoints-web")));
        assert!(kinds.contains(&(EdgeKind::Targets, "endpoints-web", "pod-web-1-a")));
        assert!(kinds.contains(&(EdgeKind::Mounts, "secret-web-tls", "pod-web-1-a")));
        assert!(kinds.contains(&(EdgeKind::Mounts, "configmap-web-config", "pod-web-1-a")));
        assert!(kinds.contains(&(EdgeKind::Binds, "serviceaccount-web-sa", "rolebinding-web-rb")));
        assert!(kinds.contains(&(EdgeKind::References, "rolebinding-web-rb", "role-web-role")));
    }

    #[test]
    fn hidden_secrets_drop_their_mount_edges() {
        let filters = TopologyFilters {
            show_secrets: false,
            ..Default::default()
        };
        let graph = build(&rich_snapshot(), &filters, None, LayoutMode::Horizontal);
        assert!(graph.node("secret-web-tls").is_none());
        assert!(!graph
            .edges
            .iter()
            .any(|e| e.edge_kind() == Some(EdgeKind::Mounts) && e.source.starts_with("secret-")));
    }

    #[test]
    fn repeated_mounts_emit_one_edge_per_pair() {
        let mut snap = rich_snapshot();
        snap.replica_sets[0].pods[0].volumes.push(VolumeInfo {
            name: "tls-again".into(),
            secret: Some(SecretVolumeSource {
                secret_name: "web-tls".into(),
            }),
            config_map: None,
        });
        let graph = build(&snap, &TopologyFilters::default(), None, LayoutMode::Horizontal);
        let mounts = graph
            .edges
            .iter()
            .filter(|e| e.source == "secret-web-tls" && e.target == "pod-web-1-a")
            .count();
        assert_eq!(mounts, 1);
    }

    #[test]
    fn build_is_deterministic() {
        let snap = rich_snapshot();
        let filters = TopologyFilters::default();
        let a = build(&snap, &filters, Some("ctx"), LayoutMode::Horizontal);
        let b = build(&snap, &filters, Some("ctx"), LayoutMode::Horizontal);
        assert_eq!(a, b);
    }

    #[test]
    fn every_edge_references_existing_nodes() {
        let graph = build(
            &rich_snapshot(),
            &TopologyFilters::default(),
            None,
            LayoutMode::Horizontal,
        );
        let ids = graph.node_ids();
        for edge in &graph.edges {
            assert!(ids.contains(edge.source.as_str()), "dangling {}", edge.id);
            assert!(ids.contains(edge.target.as_str()), "dangling {}", edge.id);
        }
    }

    #[test]
    fn search_term_prunes_nodes_and_edges() {
        let filters = TopologyFilters {
            search_term: "web-tls".into(),
            ..Default::default()
        };
        let graph = build(&rich_snapshot(), &filters, None, LayoutMode::Horizontal);
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].id, "secret-web-tls");
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn unmatched_role_ref_omits_reference_edge() {
        let mut snap = rich_snapshot();
        snap.role_bindings[0].role_ref.name = "missing-role".into();
        let graph = build(&snap, &TopologyFilters::default(), None, LayoutMode::Horizontal);
        assert!(!graph
            .edges
            .iter()
            .any(|e| e.edge_kind() == Some(EdgeKind::References)));
    }
}
