use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::k8s::{
    ConfigMapInfo, EndpointsInfo, PodInfo, ReplicaSetInfo, RoleBindingInfo, RoleInfo, SecretInfo,
    ServiceAccountInfo, ServiceInfo,
};

// --- Workload identity ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    Deployment,
    DaemonSet,
    Job,
    CronJob,
}

impl WorkloadKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "deployment",
            WorkloadKind::DaemonSet => "daemonset",
            WorkloadKind::Job => "job",
            WorkloadKind::CronJob => "cronjob",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "deployment" | "deployments" => Some(WorkloadKind::Deployment),
            "daemonset" | "daemonsets" => Some(WorkloadKind::DaemonSet),
            "job" | "jobs" => Some(WorkloadKind::Job),
            "cronjob" | "cronjobs" => Some(WorkloadKind::CronJob),
            _ => None,
        }
    }
}

/// Kind-specific workload status, tagged by `kind` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum WorkloadStatus {
    Deployment {
        #[serde(default)]
        replicas: i32,
        #[serde(default)]
        ready_replicas: i32,
        #[serde(default)]
        available_replicas: i32,
    },
    DaemonSet {
        #[serde(default)]
        desired_number_scheduled: i32,
        #[serde(default)]
        number_ready: i32,
    },
    Job {
        #[serde(default)]
        active: i32,
        #[serde(default)]
        succeeded: i32,
        #[serde(default)]
        failed: i32,
    },
    CronJob {
        #[serde(default)]
        schedule: String,
        #[serde(default)]
        suspend: bool,
        #[serde(default)]
        active: Vec<String>,
    },
}

impl WorkloadStatus {
    pub fn kind(&self) -> WorkloadKind {
        match self {
            WorkloadStatus::Deployment { .. } => WorkloadKind::Deployment,
            WorkloadStatus::DaemonSet { .. } => WorkloadKind::DaemonSet,
            WorkloadStatus::Job { .. } => WorkloadKind::Job,
            WorkloadStatus::CronJob { .. } => WorkloadKind::CronJob,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(flatten)]
    pub status: WorkloadStatus,
}

// --- Topology snapshot ---

/// One workload and everything attached to it, as fetched from the upstream
/// API or produced by the reconciler. Deployments nest pods inside
/// `replica_sets`; the other kinds carry `pods` directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopologySnapshot {
    #[serde(default)]
    pub namespace: String,
    pub workload: WorkloadInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replica_sets: Vec<ReplicaSetInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pods: Vec<PodInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<EndpointsInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<SecretInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_maps: Vec<ConfigMapInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<ServiceAccountInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<RoleInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role_bindings: Vec<RoleBindingInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_roles: Vec<RoleInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_role_bindings: Vec<RoleBindingInfo>,
}

impl TopologySnapshot {
    pub fn workload_kind(&self) -> WorkloadKind {
        self.workload.status.kind()
    }

    /// Pods in snapshot order, flattening ReplicaSet nesting when present.
    pub fn all_pods(&self) -> impl Iterator<Item = &PodInfo> {
        self.replica_sets
            .iter()
            .flat_map(|rs| rs.pods.iter())
            .chain(self.pods.iter())
    }
}

// --- Change feed wire model ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

/// A single streamed resource mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceChange {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub resource_type: String,
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// A batch of changes delivered in one stream frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopologyUpdate {
    pub changes: Vec<ResourceChange>,
    pub timestamp: DateTime<Utc>,
}

// --- Feed control messages (client -> upstream) ---

/// Subscribe/refresh request sent on the upstream feed. The workload is
/// addressed by a kind-named key, e.g. `{"type":"subscribe","namespace":"ns",
/// "deployment":"web"}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FeedRequest {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daemonset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cronjob: Option<String>,
}

impl FeedRequest {
    pub fn subscribe(namespace: &str, workload: Option<(WorkloadKind, &str)>) -> Self {
        Self::with_type("subscribe", namespace, workload)
    }

    pub fn refresh(namespace: &str, workload: Option<(WorkloadKind, &str)>) -> Self {
        Self::with_type("refresh", namespace, workload)
    }

    fn with_type(msg_type: &str, namespace: &str, workload: Option<(WorkloadKind, &str)>) -> Self {
        let mut req = FeedRequest {
            msg_type: msg_type.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        };
        match workload {
            Some((WorkloadKind::Deployment, name)) => req.deployment = Some(name.to_string()),
            Some((WorkloadKind::DaemonSet, name)) => req.daemonset = Some(name.to_string()),
            Some((WorkloadKind::Job, name)) => req.job = Some(name.to_string()),
            Some((WorkloadKind::CronJob, name)) => req.cronjob = Some(name.to_string()),
            None => {}
        }
        req
    }
}
