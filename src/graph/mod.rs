pub mod builder;
pub mod filter;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::topology::TopologySnapshot;

// --- Node kinds ---

/// Closed set of node discriminants. Sizing, id prefixes, and section
/// membership are all table-driven off this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Deployment,
    DaemonSet,
    Job,
    CronJob,
    ReplicaSet,
    Pod,
    Container,
    Service,
    Endpoints,
    Secret,
    ConfigMap,
    ServiceAccount,
    Role,
    ClusterRole,
    RoleBinding,
    ClusterRoleBinding,
    Group,
}

impl NodeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            NodeKind::Deployment => "deployment",
            NodeKind::DaemonSet => "daemonset",
            NodeKind::Job => "job",
            NodeKind::CronJob => "cronjob",
            NodeKind::ReplicaSet => "replicaset",
            NodeKind::Pod => "pod",
            NodeKind::Container => "container",
            NodeKind::Service => "service",
            NodeKind::Endpoints => "endpoints",
            NodeKind::Secret => "secret",
            NodeKind::ConfigMap => "configmap",
            NodeKind::ServiceAccount => "serviceaccount",
            NodeKind::Role => "role",
            NodeKind::ClusterRole => "clusterrole",
            NodeKind::RoleBinding => "rolebinding",
            NodeKind::ClusterRoleBinding => "clusterrolebinding",
            NodeKind::Group => "group",
        }
    }

    /// Fixed (width, height) per kind. Collision spacing and the
    /// center-to-top-left conversion both depend on these values.
    pub const fn size(self) -> (f64, f64) {
        match self {
            NodeKind::Deployment => (360.0, 200.0),
            NodeKind::DaemonSet => (320.0, 160.0),
            NodeKind::Job => (280.0, 120.0),
            NodeKind::CronJob => (320.0, 160.0),
            NodeKind::ReplicaSet => (240.0, 120.0),
            NodeKind::Pod => (440.0, 180.0),
            NodeKind::Container => (300.0, 120.0),
            NodeKind::Service => (220.0, 110.0),
            NodeKind::Endpoints => (220.0, 110.0),
            NodeKind::ServiceAccount => (240.0, 110.0),
            NodeKind::Role | NodeKind::ClusterRole => (220.0, 100.0),
            NodeKind::RoleBinding | NodeKind::ClusterRoleBinding => (240.0, 100.0),
            NodeKind::Group => (450.0, 350.0),
            NodeKind::Secret | NodeKind::ConfigMap => (200.0, 100.0),
        }
    }

    pub const fn is_workload_root(self) -> bool {
        matches!(
            self,
            NodeKind::Deployment | NodeKind::DaemonSet | NodeKind::Job | NodeKind::CronJob
        )
    }

    pub const fn is_rbac(self) -> bool {
        matches!(
            self,
            NodeKind::ServiceAccount
                | NodeKind::Role
                | NodeKind::ClusterRole
                | NodeKind::RoleBinding
                | NodeKind::ClusterRoleBinding
        )
    }

    /// Kinds relocated into the secondary section below the main graph.
    pub const fn in_side_section(self) -> bool {
        self.is_rbac() || matches!(self, NodeKind::Secret | NodeKind::ConfigMap)
    }

    pub fn node_id(self, name: &str) -> String {
        format!("{}-{}", self.as_str(), name)
    }
}

// --- Status ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    Healthy,
    Warning,
    Error,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StatusFilter {
    #[default]
    #[serde(rename = "all")]
    All,
    Healthy,
    Warning,
    Error,
    Unknown,
}

impl StatusFilter {
    pub fn matches(self, status: NodeStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Healthy => status == NodeStatus::Healthy,
            StatusFilter::Warning => status == NodeStatus::Warning,
            StatusFilter::Error => status == NodeStatus::Error,
            StatusFilter::Unknown => status == NodeStatus::Unknown,
        }
    }
}

// --- Nodes ---

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupItem {
    pub name: String,
    pub status: NodeStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_keys: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<GroupItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    pub label: String,
    pub status: NodeStatus,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<NodeDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopologyNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub position: Position,
    pub data: NodeData,
}

impl TopologyNode {
    pub fn size(&self) -> (f64, f64) {
        self.kind.size()
    }

    pub fn center(&self) -> (f64, f64) {
        let (w, h) = self.size();
        (self.position.x + w / 2.0, self.position.y + h / 2.0)
    }

    /// Store `position` so that the node's visual center lands on `(cx, cy)`.
    pub fn place_center(&mut self, cx: f64, cy: f64) {
        let (w, h) = self.size();
        self.position = Position {
            x: cx - w / 2.0,
            y: cy - h / 2.0,
        };
    }
}

// --- Edges ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handle {
    Top,
    Bottom,
    Left,
    Right,
}

/// Relationship carried by an edge; drives layout weighting and handle rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Workload to child collection (workload->rs, rs->pod, workload->pod).
    Manages,
    /// Service to its same-named endpoints object.
    Exposes,
    /// Endpoints address to a backing pod.
    Targets,
    /// Secret/ConfigMap volume into a pod.
    Mounts,
    /// ServiceAccount to a (cluster) role binding.
    Binds,
    /// Binding to the (cluster) role it names.
    References,
    /// Pod to one of its containers.
    Runs,
}

impl EdgeKind {
    /// Alignment weight for the ranked layout. Heavier edges pull their
    /// endpoints into a straight chain.
    pub const fn weight(self) -> f64 {
        match self {
            EdgeKind::Binds | EdgeKind::References => 10.0,
            EdgeKind::Exposes => 8.0,
            EdgeKind::Manages => 6.0,
            EdgeKind::Runs | EdgeKind::Targets => 5.0,
            EdgeKind::Mounts => 1.0,
        }
    }

    pub const fn is_rbac(self) -> bool {
        matches!(self, EdgeKind::Binds | EdgeKind::References)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStyle {
    #[default]
    Smoothstep,
    Straight,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EdgeData {
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopologyEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<Handle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<Handle>,
    #[serde(rename = "type")]
    pub style: EdgeStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EdgeData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_end: Option<String>,
}

impl TopologyEdge {
    pub fn edge_kind(&self) -> Option<EdgeKind> {
        self.data.map(|d| d.kind)
    }
}

// --- Graph ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TopologyGraph {
    pub nodes: Vec<TopologyNode>,
    pub edges: Vec<TopologyEdge>,
}

impl TopologyGraph {
    pub fn node(&self, id: &str) -> Option<&TopologyNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_ids(&self) -> HashSet<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    /// Drop edges whose endpoints are not both present. Correctness
    /// backstop; a graph that needs it has a construction bug.
    pub fn retain_valid_edges(&mut self) {
        let ids: HashSet<String> = self.nodes.iter().map(|n| n.id.clone()).collect();
        self.edges
            .retain(|e| ids.contains(&e.source) && ids.contains(&e.target));
    }

    /// Keep the first node per id. Same backstop character as
    /// [`retain_valid_edges`].
    pub fn dedup_node_ids(&mut self) {
        let mut seen: HashSet<String> = HashSet::new();
        self.nodes.retain(|n| seen.insert(n.id.clone()));
    }
}

// --- Filters and view options ---

fn default_true() -> bool {
    true
}

fn default_spacing() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopologyFilters {
    #[serde(default = "default_true")]
    pub show_services: bool,
    #[serde(default = "default_true")]
    pub show_endpoints: bool,
    #[serde(default = "default_true")]
    pub show_secrets: bool,
    #[serde(default = "default_true")]
    pub show_config_maps: bool,
    #[serde(default = "default_true")]
    pub show_service_account: bool,
    #[serde(default = "default_true")]
    pub show_rbac: bool,
    #[serde(default)]
    pub show_containers: bool,
    #[serde(default = "default_true")]
    pub show_pods: bool,
    #[serde(default = "default_true")]
    pub show_replica_sets: bool,
    #[serde(default)]
    pub status_filter: StatusFilter,
    #[serde(default)]
    pub search_term: String,
}

impl Default for TopologyFilters {
    fn default() -> Self {
        Self {
            show_services: true,
            show_endpoints: true,
            show_secrets: true,
            show_config_maps: true,
            show_service_account: true,
            show_rbac: true,
            show_containers: false,
            show_pods: true,
            show_replica_sets: true,
            status_filter: StatusFilter::All,
            search_term: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    #[default]
    Horizontal,
    Vertical,
    Radial,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewOptions {
    #[serde(default)]
    pub layout: LayoutMode,
    #[serde(default = "default_spacing")]
    pub spacing: f64,
    #[serde(default = "default_true")]
    pub show_minimap: bool,
    #[serde(default = "default_true")]
    pub show_controls: bool,
    #[serde(default = "default_true")]
    pub show_background: bool,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            layout: LayoutMode::Horizontal,
            spacing: 1.0,
            show_minimap: true,
            show_controls: true,
            show_background: true,
        }
    }
}

/// Full pipeline: assemble the graph from a snapshot, then position it.
pub fn build_positioned(
    snapshot: &TopologySnapshot,
    filters: &TopologyFilters,
    context: Option<&str>,
    view: &ViewOptions,
) -> TopologyGraph {
    let graph = builder::build(snapshot, filters, context, view.layout);
    crate::layout::layout(graph, view)
}
