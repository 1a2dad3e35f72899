//! Applies streamed add/modify/delete events onto a topology snapshot.
//! Every operation produces a new snapshot (structural copy, no
//! serialization round-trips); the input is never mutated, so a reader
//! holding the previous snapshot never sees a half-applied batch.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::k8s::{
    ConfigMapInfo, ContainerInfo, EndpointAddress, EndpointsInfo, PodInfo, PolicyRule,
    ReplicaSetInfo, RoleBindingInfo, RoleInfo, RoleRef, SecretInfo, ServiceAccountInfo,
    ServiceInfo, ServicePort, SubjectRef, VolumeInfo,
};
use crate::models::topology::{
    ChangeType, ResourceChange, TopologySnapshot, TopologyUpdate, WorkloadKind, WorkloadStatus,
};

/// Apply a batch of changes, returning the resulting snapshot. Re-applying
/// the same batch to the result is a no-op.
pub fn apply_update(snapshot: &TopologySnapshot, update: &TopologyUpdate) -> TopologySnapshot {
    let mut next = snapshot.clone();
    for change in &update.changes {
        apply_change(&mut next, change);
    }
    dedup_snapshot(&mut next);
    next
}

/// Flat-list form of the reconciler, for cluster-wide listings.
pub fn apply_list<T: Keyed>(list: &[T], change: &ResourceChange) -> Vec<T> {
    let mut next = list.to_vec();
    apply_keyed(&mut next, change);
    dedup_keyed(&mut next);
    next
}

fn apply_change(s: &mut TopologySnapshot, c: &ResourceChange) {
    let Some(kind) = ResourceKind::parse(&c.resource_type) else {
        warn!(resource_type = %c.resource_type, id = %c.resource_id, "skipping change for unknown resource type");
        return;
    };
    match kind {
        ResourceKind::Pod => apply_pod_change(s, c),
        ResourceKind::ReplicaSet => apply_keyed(&mut s.replica_sets, c),
        ResourceKind::Service => apply_keyed(&mut s.services, c),
        ResourceKind::Endpoints => apply_keyed(&mut s.endpoints, c),
        ResourceKind::Secret => apply_keyed(&mut s.secrets, c),
        ResourceKind::ConfigMap => apply_keyed(&mut s.config_maps, c),
        ResourceKind::ServiceAccount => apply_service_account(s, c),
        ResourceKind::Role => apply_keyed(&mut s.roles, c),
        ResourceKind::ClusterRole => apply_keyed(&mut s.cluster_roles, c),
        ResourceKind::RoleBinding => apply_keyed(&mut s.role_bindings, c),
        ResourceKind::ClusterRoleBinding => apply_keyed(&mut s.cluster_role_bindings, c),
        ResourceKind::Workload(kind) => apply_workload_change(s, c, kind),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceKind {
    Pod,
    ReplicaSet,
    Service,
    Endpoints,
    Secret,
    ConfigMap,
    ServiceAccount,
    Role,
    ClusterRole,
    RoleBinding,
    ClusterRoleBinding,
    Workload(WorkloadKind),
}

impl ResourceKind {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pod" | "pods" => Some(ResourceKind::Pod),
            "replicaset" | "replicasets" => Some(ResourceKind::ReplicaSet),
            "service" | "services" => Some(ResourceKind::Service),
            "endpoints" => Some(ResourceKind::Endpoints),
            "secret" | "secrets" => Some(ResourceKind::Secret),
            "configmap" | "configmaps" => Some(ResourceKind::ConfigMap),
            "serviceaccount" | "serviceaccounts" => Some(ResourceKind::ServiceAccount),
            "role" | "roles" => Some(ResourceKind::Role),
            "clusterrole" | "clusterroles" => Some(ResourceKind::ClusterRole),
            "rolebinding" | "rolebindings" => Some(ResourceKind::RoleBinding),
            "clusterrolebinding" | "clusterrolebindings" => Some(ResourceKind::ClusterRoleBinding),
            other => WorkloadKind::parse(other).map(ResourceKind::Workload),
        }
    }
}

// --- Keyed collections ---

/// An entity the reconciler can upsert into a keyed collection. Matching is
/// by UID when the event carries one, else by name + namespace.
pub trait Keyed: Clone {
    fn name(&self) -> &str;
    fn namespace(&self) -> &str;
    fn uid(&self) -> Option<&str>;
    /// Merge only the fields present in the change payload.
    fn merge(&mut self, data: Option<&Value>);
    fn from_change(name: &str, namespace: &str, data: Option<&Value>) -> Self;
    /// False when the entity carries no real status yet; dedup prefers
    /// informative entities.
    fn informative(&self) -> bool {
        true
    }
}

fn apply_keyed<T: Keyed>(list: &mut Vec<T>, c: &ResourceChange) {
    match c.change_type {
        ChangeType::Added => match locate(list, c) {
            // An add for a known entity is just an update.
            Some(i) => list[i].merge(c.data.as_ref()),
            None => {
                let ns = c.namespace.clone().unwrap_or_default();
                list.push(T::from_change(&c.resource_id, &ns, c.data.as_ref()));
            }
        },
        ChangeType::Modified => match locate(list, c) {
            Some(i) => list[i].merge(c.data.as_ref()),
            None => {
                debug!(id = %c.resource_id, "dropping modified event for unknown entity");
            }
        },
        ChangeType::Deleted => remove_matches(list, c),
    }
}

fn locate<T: Keyed>(list: &[T], c: &ResourceChange) -> Option<usize> {
    if let Some(u) = change_uid(c) {
        if let Some(i) = list.iter().position(|e| e.uid() == Some(u)) {
            return Some(i);
        }
    }
    let ns = c.namespace.as_deref();
    list.iter()
        .position(|e| e.name() == c.resource_id && ns.is_none_or(|n| e.namespace() == n))
}

/// Deletes match by UID first, then name + namespace. Events that omit the
/// namespace remove the name everywhere.
fn remove_matches<T: Keyed>(list: &mut Vec<T>, c: &ResourceChange) {
    if let Some(u) = change_uid(c) {
        if list.iter().any(|e| e.uid() == Some(u)) {
            list.retain(|e| e.uid() != Some(u));
            return;
        }
    }
    match c.namespace.as_deref() {
        Some(ns) => list.retain(|e| !(e.name() == c.resource_id && e.namespace() == ns)),
        None => list.retain(|e| e.name() != c.resource_id),
    }
}

fn change_uid(c: &ResourceChange) -> Option<&str> {
    c.data.as_ref()?.get("uid")?.as_str()
}

fn decode<T: DeserializeOwned>(data: Option<&Value>) -> Option<T> {
    let value = data?;
    match serde_json::from_value(value.clone()) {
        Ok(patch) => Some(patch),
        Err(e) => {
            warn!(error = %e, "ignoring undecodable change payload");
            None
        }
    }
}

// --- Pod routing ---

fn apply_pod_change(s: &mut TopologySnapshot, c: &ResourceChange) {
    if s.replica_sets.is_empty() {
        apply_keyed(&mut s.pods, c);
        return;
    }
    match c.change_type {
        ChangeType::Added => {
            if let Some(pod) = find_pod_mut(s, c) {
                pod.merge(c.data.as_ref());
                return;
            }
            let owner = c
                .data
                .as_ref()
                .and_then(|d| d.get("ownerReplicaSet"))
                .and_then(Value::as_str);
            let rs_idx = owner
                .and_then(|o| s.replica_sets.iter().position(|rs| rs.name == o))
                .unwrap_or_else(|| {
                    warn!(
                        pod = %c.resource_id,
                        owner = owner.unwrap_or(""),
                        "pod owner not among known replicasets, routing to the first one"
                    );
                    0
                });
            let ns = c.namespace.clone().unwrap_or_else(|| s.namespace.clone());
            s.replica_sets[rs_idx]
                .pods
                .push(PodInfo::from_change(&c.resource_id, &ns, c.data.as_ref()));
        }
        ChangeType::Modified => match find_pod_mut(s, c) {
            Some(pod) => pod.merge(c.data.as_ref()),
            None => {
                debug!(pod = %c.resource_id, "dropping modified event for unknown pod");
            }
        },
        ChangeType::Deleted => {
            for rs in &mut s.replica_sets {
                remove_matches(&mut rs.pods, c);
            }
            remove_matches(&mut s.pods, c);
        }
    }
}

fn find_pod_mut<'a>(s: &'a mut TopologySnapshot, c: &ResourceChange) -> Option<&'a mut PodInfo> {
    match locate_pod(s, c)? {
        (Some(rs), i) => Some(&mut s.replica_sets[rs].pods[i]),
        (None, i) => Some(&mut s.pods[i]),
    }
}

fn locate_pod(s: &TopologySnapshot, c: &ResourceChange) -> Option<(Option<usize>, usize)> {
    if let Some(u) = change_uid(c) {
        for (r, rs) in s.replica_sets.iter().enumerate() {
            if let Some(i) = rs.pods.iter().position(|p| p.uid.as_deref() == Some(u)) {
                return Some((Some(r), i));
            }
        }
        if let Some(i) = s.pods.iter().position(|p| p.uid.as_deref() == Some(u)) {
            return Some((None, i));
        }
    }
    let ns = c.namespace.as_deref();
    let matches = |p: &PodInfo| p.name == c.resource_id && ns.is_none_or(|n| p.namespace == n);
    for (r, rs) in s.replica_sets.iter().enumerate() {
        if let Some(i) = rs.pods.iter().position(|p| matches(p)) {
            return Some((Some(r), i));
        }
    }
    s.pods.iter().position(|p| matches(p)).map(|i| (None, i))
}

// --- Workload and service account slots ---

fn apply_workload_change(s: &mut TopologySnapshot, c: &ResourceChange, kind: WorkloadKind) {
    if kind != s.workload_kind() || c.resource_id != s.workload.name {
        debug!(id = %c.resource_id, "dropping workload event for a different workload");
        return;
    }
    if c.change_type == ChangeType::Deleted {
        // Root deletion is a selection-level event; keep the last-known
        // workload so the graph does not go blank mid-stream.
        return;
    }
    let Some(data) = c.data.as_ref() else { return };
    if let Some(u) = data.get("uid").and_then(Value::as_str) {
        s.workload.uid = Some(u.to_string());
    }
    match &mut s.workload.status {
        WorkloadStatus::Deployment {
            replicas,
            ready_replicas,
            available_replicas,
        } => {
            if let Some(p) = decode::<DeploymentPatch>(Some(data)) {
                if let Some(v) = p.replicas {
                    *replicas = v;
                }
                if let Some(v) = p.ready_replicas {
                    *ready_replicas = v;
                }
                if let Some(v) = p.available_replicas {
                    *available_replicas = v;
                }
            }
        }
        WorkloadStatus::DaemonSet {
            desired_number_scheduled,
            number_ready,
        } => {
            if let Some(p) = decode::<DaemonSetPatch>(Some(data)) {
                if let Some(v) = p.desired_number_scheduled {
                    *desired_number_scheduled = v;
                }
                if let Some(v) = p.number_ready {
                    *number_ready = v;
                }
            }
        }
        WorkloadStatus::Job {
            active,
            succeeded,
            failed,
        } => {
            if let Some(p) = decode::<JobPatch>(Some(data)) {
                if let Some(v) = p.active {
                    *active = v;
                }
                if let Some(v) = p.succeeded {
                    *succeeded = v;
                }
                if let Some(v) = p.failed {
                    *failed = v;
                }
            }
        }
        WorkloadStatus::CronJob {
            schedule,
            suspend,
            active,
        } => {
            if let Some(p) = decode::<CronJobPatch>(Some(data)) {
                if let Some(v) = p.schedule {
                    *schedule = v;
                }
                if let Some(v) = p.suspend {
                    *suspend = v;
                }
                if let Some(v) = p.active {
                    *active = v;
                }
            }
        }
    }
}

fn apply_service_account(s: &mut TopologySnapshot, c: &ResourceChange) {
    let matches = |sa: &ServiceAccountInfo| -> bool {
        if let Some(u) = change_uid(c) {
            if sa.uid.as_deref() == Some(u) {
                return true;
            }
        }
        sa.name == c.resource_id && c.namespace.as_deref().is_none_or(|n| sa.namespace == n)
    };
    match c.change_type {
        ChangeType::Added => {
            let ns = c.namespace.clone().unwrap_or_else(|| s.namespace.clone());
            match &mut s.service_account {
                Some(sa) if matches(sa) => sa.merge(c.data.as_ref()),
                slot => {
                    *slot = Some(ServiceAccountInfo::from_change(
                        &c.resource_id,
                        &ns,
                        c.data.as_ref(),
                    ));
                }
            }
        }
        ChangeType::Modified => match &mut s.service_account {
            Some(sa) if matches(sa) => sa.merge(c.data.as_ref()),
            _ => {
                debug!(id = %c.resource_id, "dropping modified event for unknown service account");
            }
        },
        ChangeType::Deleted => {
            if s.service_account.as_ref().is_some_and(|sa| matches(sa)) {
                s.service_account = None;
            }
        }
    }
}

// --- Dedup ---

fn dedup_snapshot(s: &mut TopologySnapshot) {
    dedup_pods(s);
    dedup_keyed(&mut s.replica_sets);
    dedup_keyed(&mut s.services);
    dedup_keyed(&mut s.endpoints);
    dedup_keyed(&mut s.secrets);
    dedup_keyed(&mut s.config_maps);
    dedup_keyed(&mut s.roles);
    dedup_keyed(&mut s.role_bindings);
    dedup_keyed(&mut s.cluster_roles);
    dedup_keyed(&mut s.cluster_role_bindings);
}

/// At most one entity per (name, namespace). A later informative entity
/// replaces an earlier uninformative one; otherwise the first wins.
fn dedup_keyed<T: Keyed>(list: &mut Vec<T>) {
    let mut kept: Vec<T> = Vec::with_capacity(list.len());
    for item in list.drain(..) {
        match kept
            .iter()
            .position(|k| k.name() == item.name() && k.namespace() == item.namespace())
        {
            Some(i) => {
                if !kept[i].informative() && item.informative() {
                    kept[i] = item;
                }
            }
            None => kept.push(item),
        }
    }
    *list = kept;
}

/// Pod dedup spans every pod list in the snapshot, not just one ReplicaSet.
fn dedup_pods(s: &mut TopologySnapshot) {
    let mut winners: HashMap<(String, String), (usize, bool)> = HashMap::new();
    let mut occ = 0usize;
    {
        let mut visit = |p: &PodInfo| {
            let key = (p.name.clone(), p.namespace.clone());
            let informative = p.informative();
            match winners.get_mut(&key) {
                Some(w) => {
                    if !w.1 && informative {
                        *w = (occ, informative);
                    }
                }
                None => {
                    winners.insert(key, (occ, informative));
                }
            }
            occ += 1;
        };
        for rs in &s.replica_sets {
            for p in &rs.pods {
                visit(p);
            }
        }
        for p in &s.pods {
            visit(p);
        }
    }

    let keep: HashSet<usize> = winners.into_values().map(|(i, _)| i).collect();
    let mut occ = 0usize;
    for rs in &mut s.replica_sets {
        rs.pods.retain(|_| {
            let kept = keep.contains(&occ);
            occ += 1;
            kept
        });
    }
    s.pods.retain(|_| {
        let kept = keep.contains(&occ);
        occ += 1;
        kept
    });
}

// --- Patches and Keyed impls ---

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentPatch {
    replicas: Option<i32>,
    ready_replicas: Option<i32>,
    available_replicas: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DaemonSetPatch {
    desired_number_scheduled: Option<i32>,
    number_ready: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobPatch {
    active: Option<i32>,
    succeeded: Option<i32>,
    failed: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CronJobPatch {
    schedule: Option<String>,
    suspend: Option<bool>,
    active: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodPatch {
    uid: Option<String>,
    phase: Option<String>,
    node_name: Option<String>,
    start_time: Option<String>,
    containers: Option<Vec<ContainerInfo>>,
    volumes: Option<Vec<VolumeInfo>>,
    owner_replica_set: Option<String>,
}

impl Keyed for PodInfo {
    fn name(&self) -> &str {
        &self.name
    }
    fn namespace(&self) -> &str {
        &self.namespace
    }
    fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }
    fn merge(&mut self, data: Option<&Value>) {
        let Some(p) = decode::<PodPatch>(data) else {
            return;
        };
        if let Some(v) = p.uid {
            self.uid = Some(v);
        }
        if let Some(v) = p.phase {
            self.phase = v;
        }
        if let Some(v) = p.node_name {
            self.node_name = v;
        }
        if let Some(v) = p.start_time {
            self.start_time = Some(v);
        }
        if let Some(v) = p.containers {
            self.containers = v;
        }
        if let Some(v) = p.volumes {
            self.volumes = v;
        }
        if let Some(v) = p.owner_replica_set {
            self.owner_replica_set = Some(v);
        }
    }
    fn from_change(name: &str, namespace: &str, data: Option<&Value>) -> Self {
        let mut pod = PodInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        };
        pod.merge(data);
        pod
    }
    fn informative(&self) -> bool {
        !(self.phase.is_empty() || self.phase == "Unknown")
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplicaSetPatch {
    uid: Option<String>,
    replicas: Option<i32>,
    ready_replicas: Option<i32>,
    pods: Option<Vec<PodInfo>>,
}

impl Keyed for ReplicaSetInfo {
    fn name(&self) -> &str {
        &self.name
    }
    fn namespace(&self) -> &str {
        &self.namespace
    }
    fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }
    fn merge(&mut self, data: Option<&Value>) {
        let Some(p) = decode::<ReplicaSetPatch>(data) else {
            return;
        };
        if let Some(v) = p.uid {
            self.uid = Some(v);
        }
        if let Some(v) = p.replicas {
            self.replicas = v;
        }
        if let Some(v) = p.ready_replicas {
            self.ready_replicas = v;
        }
        if let Some(v) = p.pods {
            self.pods = v;
        }
    }
    fn from_change(name: &str, namespace: &str, data: Option<&Value>) -> Self {
        let mut rs = ReplicaSetInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        };
        rs.merge(data);
        rs
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServicePatch {
    uid: Option<String>,
    #[serde(rename = "type")]
    service_type: Option<String>,
    cluster_ip: Option<String>,
    ports: Option<Vec<ServicePort>>,
}

impl Keyed for ServiceInfo {
    fn name(&self) -> &str {
        &self.name
    }
    fn namespace(&self) -> &str {
        &self.namespace
    }
    fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }
    fn merge(&mut self, data: Option<&Value>) {
        let Some(p) = decode::<ServicePatch>(data) else {
            return;
        };
        if let Some(v) = p.uid {
            self.uid = Some(v);
        }
        if let Some(v) = p.service_type {
            self.service_type = v;
        }
        if let Some(v) = p.cluster_ip {
            self.cluster_ip = v;
        }
        if let Some(v) = p.ports {
            self.ports = v;
        }
    }
    fn from_change(name: &str, namespace: &str, data: Option<&Value>) -> Self {
        let mut svc = ServiceInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        };
        svc.merge(data);
        svc
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointsPatch {
    uid: Option<String>,
    addresses: Option<Vec<EndpointAddress>>,
}

impl Keyed for EndpointsInfo {
    fn name(&self) -> &str {
        &self.name
    }
    fn namespace(&self) -> &str {
        &self.namespace
    }
    fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }
    fn merge(&mut self, data: Option<&Value>) {
        let Some(p) = decode::<EndpointsPatch>(data) else {
            return;
        };
        if let Some(v) = p.uid {
            self.uid = Some(v);
        }
        if let Some(v) = p.addresses {
            self.addresses = v;
        }
    }
    fn from_change(name: &str, namespace: &str, data: Option<&Value>) -> Self {
        let mut ep = EndpointsInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        };
        ep.merge(data);
        ep
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretPatch {
    uid: Option<String>,
    #[serde(rename = "type")]
    secret_type: Option<String>,
    data: Option<std::collections::HashMap<String, String>>,
}

impl Keyed for SecretInfo {
    fn name(&self) -> &str {
        &self.name
    }
    fn namespace(&self) -> &str {
        &self.namespace
    }
    fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }
    fn merge(&mut self, data: Option<&Value>) {
        let Some(p) = decode::<SecretPatch>(data) else {
            return;
        };
        if let Some(v) = p.uid {
            self.uid = Some(v);
        }
        if let Some(v) = p.secret_type {
            self.secret_type = v;
        }
        if let Some(v) = p.data {
            self.data = v;
        }
    }
    fn from_change(name: &str, namespace: &str, data: Option<&Value>) -> Self {
        let mut secret = SecretInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        };
        secret.merge(data);
        secret
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigMapPatch {
    uid: Option<String>,
    data: Option<std::collections::HashMap<String, String>>,
}

impl Keyed for ConfigMapInfo {
    fn name(&self) -> &str {
        &self.name
    }
    fn namespace(&self) -> &str {
        &self.namespace
    }
    fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }
    fn merge(&mut self, data: Option<&Value>) {
        let Some(p) = decode::<ConfigMapPatch>(data) else {
            return;
        };
        if let Some(v) = p.uid {
            self.uid = Some(v);
        }
        if let Some(v) = p.data {
            self.data = v;
        }
    }
    fn from_change(name: &str, namespace: &str, data: Option<&Value>) -> Self {
        let mut cm = ConfigMapInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        };
        cm.merge(data);
        cm
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceAccountPatch {
    uid: Option<String>,
    secrets: Option<Vec<String>>,
}

impl Keyed for ServiceAccountInfo {
    fn name(&self) -> &str {
        &self.name
    }
    fn namespace(&self) -> &str {
        &self.namespace
    }
    fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }
    fn merge(&mut self, data: Option<&Value>) {
        let Some(p) = decode::<ServiceAccountPatch>(data) else {
            return;
        };
        if let Some(v) = p.uid {
            self.uid = Some(v);
        }
        if let Some(v) = p.secrets {
            self.secrets = v;
        }
    }
    fn from_change(name: &str, namespace: &str, data: Option<&Value>) -> Self {
        let mut sa = ServiceAccountInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        };
        sa.merge(data);
        sa
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RolePatch {
    uid: Option<String>,
    rules: Option<Vec<PolicyRule>>,
}

impl Keyed for RoleInfo {
    fn name(&self) -> &str {
        &self.name
    }
    fn namespace(&self) -> &str {
        &self.namespace
    }
    fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }
    fn merge(&mut self, data: Option<&Value>) {
        let Some(p) = decode::<RolePatch>(data) else {
            return;
        };
        if let Some(v) = p.uid {
            self.uid = Some(v);
        }
        if let Some(v) = p.rules {
            self.rules = v;
        }
    }
    fn from_change(name: &str, namespace: &str, data: Option<&Value>) -> Self {
        let mut role = RoleInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        };
        role.merge(data);
        role
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleBindingPatch {
    uid: Option<String>,
    role_ref: Option<RoleRef>,
    subjects: Option<Vec<SubjectRef>>,
}

impl Keyed for RoleBindingInfo {
    fn name(&self) -> &str {
        &self.name
    }
    fn namespace(&self) -> &str {
        &self.namespace
    }
    fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }
    fn merge(&mut self, data: Option<&Value>) {
        let Some(p) = decode::<RoleBindingPatch>(data) else {
            return;
        };
        if let Some(v) = p.uid {
            self.uid = Some(v);
        }
        if let Some(v) = p.role_ref {
            self.role_ref = v;
        }
        if let Some(v) = p.subjects {
            self.subjects = v;
        }
    }
    fn from_change(name: &str, namespace: &str, data: Option<&Value>) -> Self {
        let mut rb = RoleBindingInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        };
        rb.merge(data);
        rb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::topology::WorkloadInfo;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn change(
        change_type: ChangeType,
        resource_type: &str,
        id: &str,
        namespace: Option<&str>,
        data: Option<Value>,
    ) -> ResourceChange {
        ResourceChange {
            change_type,
            resource_type: resource_type.to_string(),
            resource_id: id.to_string(),
            namespace: namespace.map(str::to_string),
            data,
            timestamp: Utc::now(),
        }
    }

    fn update(changes: Vec<ResourceChange>) -> TopologyUpdate {
        TopologyUpdate {
            changes,
            timestamp: Utc::now(),
        }
    }

    fn pod(name: &str, ns: &str, phase: &str) -> PodInfo {
        PodInfo {
            name: name.into(),
            namespace: ns.into(),
            phase: phase.into(),
            ..Default::default()
        }
    }

    fn deployment_snapshot() -> TopologySnapshot {
        TopologySnapshot {
            namespace: "prod".into(),
            workload: WorkloadInfo {
                name: "web".into(),
                uid: None,
                status: WorkloadStatus::Deployment {
                    replicas: 2,
                    ready_replicas: 2,
                    available_replicas: 2,
                },
            },
            replica_sets: vec![
                ReplicaSetInfo {
                    name: "web-1".into(),
                    namespace: "prod".into(),
                    replicas: 2,
                    ready_replicas: 2,
                    pods: vec![pod("web-1-a", "prod", "Running")],
                    ..Default::default()
                },
                ReplicaSetInfo {
                    name: "web-2".into(),
                    namespace: "prod".into(),
                    replicas: 0,
                    ready_replicas: 0,
                    pods: vec![],
                    ..Default::default()
                },
            ],
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

    fn daemonset_snapshot() -> TopologySnapshot {
        TopologySnapshot {
            namespace: "prod".into(),
            workload: WorkloadInfo {
                name: "agent".into(),
                uid: None,
                status: WorkloadStatus::DaemonSet {
                    desired_number_scheduled: 2,
                    number_ready: 2,
                },
            },
            replica_sets: vec![],
            pods: vec![pod("agent-a", "ns-a", "Running"), pod("agent-a", "ns-b", "Running")],
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

    #[test]
    fn added_pod_routes_to_its_owner_replica_set() {
        let snapshot = deployment_snapshot();
        let next = apply_update(
            &snapshot,
            &update(vec![change(
                ChangeType::Added,
                "pod",
                "web-2-x",
                Some("prod"),
                Some(json!({"phase": "Pending", "ownerReplicaSet": "web-2"})),
            )]),
        );
        assert_eq!(next.replica_sets[1].pods.len(), 1);
        assert_eq!(next.replica_sets[1].pods[0].phase, "Pending");
        // input untouched
        assert!(snapshot.replica_sets[1].pods.is_empty());
    }

    #[test]
    fn unknown_owner_falls_back_to_first_replica_set() {
        let next = apply_update(
            &deployment_snapshot(),
            &update(vec![change(
                ChangeType::Added,
                "pod",
                "web-9-x",
                Some("prod"),
                Some(json!({"phase": "Pending", "ownerReplicaSet": "web-9"})),
            )]),
        );
        assert_eq!(next.replica_sets[0].pods.len(), 2);
    }

    #[test]
    fn added_for_existing_entity_is_an_update() {
        let next = apply_update(
            &deployment_snapshot(),
            &update(vec![change(
                ChangeType::Added,
                "pod",
                "web-1-a",
                Some("prod"),
                Some(json!({"phase": "Failed"})),
            )]),
        );
        assert_eq!(next.replica_sets[0].pods.len(), 1);
        assert_eq!(next.replica_sets[0].pods[0].phase, "Failed");
    }

    #[test]
    fn modified_merges_only_present_fields() {
        let mut snapshot = deployment_snapshot();
        snapshot.replica_sets[0].pods[0].containers = vec![ContainerInfo {
            name: "app".into(),
            image: "app:1".into(),
            ready: true,
            restart_count: 0,
        }];
        let next = apply_update(
            &snapshot,
            &update(vec![change(
                ChangeType::Modified,
                "pod",
                "web-1-a",
                Some("prod"),
                Some(json!({"phase": "Pending"})),
            )]),
        );
        let p = &next.replica_sets[0].pods[0];
        assert_eq!(p.phase, "Pending");
        // absent fields survive the merge
        assert_eq!(p.containers.len(), 1);
    }

    #[test]
    fn modified_for_unknown_pod_is_dropped() {
        let snapshot = deployment_snapshot();
        let next = apply_update(
            &snapshot,
            &update(vec![change(
                ChangeType::Modified,
                "pod",
                "ghost",
                Some("prod"),
                Some(json!({"phase": "Running"})),
            )]),
        );
        assert_eq!(next, snapshot);
    }

    #[test]
    fn delete_without_namespace_matches_every_namespace() {
        let snapshot = daemonset_snapshot();
        let next = apply_update(
            &snapshot,
            &update(vec![change(ChangeType::Deleted, "pod", "agent-a", None, None)]),
        );
        assert!(next.pods.is_empty());
    }

    #[test]
    fn delete_with_namespace_only_matches_that_namespace() {
        let next = apply_update(
            &daemonset_snapshot(),
            &update(vec![change(
                ChangeType::Deleted,
                "pod",
                "agent-a",
                Some("ns-b"),
                None,
            )]),
        );
        assert_eq!(next.pods.len(), 1);
        assert_eq!(next.pods[0].namespace, "ns-a");
    }

    #[test]
    fn delete_prefers_uid_match() {
        let mut snapshot = daemonset_snapshot();
        snapshot.pods[0].uid = Some("u-1".into());
        snapshot.pods[1].uid = Some("u-2".into());
        let next = apply_update(
            &snapshot,
            &update(vec![change(
                ChangeType::Deleted,
                "pod",
                "agent-a",
                None,
                Some(json!({"uid": "u-2"})),
            )]),
        );
        assert_eq!(next.pods.len(), 1);
        assert_eq!(next.pods[0].uid.as_deref(), Some("u-1"));
    }

    #[test]
    fn unknown_resource_type_is_skipped() {
        let snapshot = deployment_snapshot();
        let next = apply_update(
            &snapshot,
            &update(vec![change(
                ChangeType::Added,
                "gizmo",
                "g-1",
                Some("prod"),
                None,
            )]),
        );
        assert_eq!(next, snapshot);
    }

    #[test]
    fn apply_update_is_idempotent() {
        let snapshot = deployment_snapshot();
        let batch = update(vec![
            change(
                ChangeType::Added,
                "pod",
                "web-2-x",
                Some("prod"),
                Some(json!({"phase": "Running", "ownerReplicaSet": "web-2"})),
            ),
            change(
                ChangeType::Modified,
                "pod",
                "web-1-a",
                Some("prod"),
                Some(json!({"phase": "Failed"})),
            ),
            change(ChangeType::Deleted, "pod", "gone", None, None),
            change(
                ChangeType::Added,
                "service",
                "web",
                Some("prod"),
                Some(json!({"type": "ClusterIP"})),
            ),
        ]);
        let once = apply_update(&snapshot, &batch);
        let twice = apply_update(&once, &batch);
        assert_eq!(once, twice);
    }

    #[test]
    fn dedup_prefers_informative_status() {
        let mut snapshot = daemonset_snapshot();
        snapshot.pods = vec![
            pod("agent-a", "ns-a", "Unknown"),
            pod("agent-a", "ns-a", "Running"),
        ];
        let next = apply_update(&snapshot, &update(vec![]));
        assert_eq!(next.pods.len(), 1);
        assert_eq!(next.pods[0].phase, "Running");
    }

    #[test]
    fn dedup_keeps_first_when_equally_informative() {
        let mut snapshot = daemonset_snapshot();
        snapshot.pods = vec![
            pod("agent-a", "ns-a", "Running"),
            pod("agent-a", "ns-a", "Pending"),
        ];
        let next = apply_update(&snapshot, &update(vec![]));
        assert_eq!(next.pods.len(), 1);
        assert_eq!(next.pods[0].phase, "Running");
    }

    #[test]
    fn dedup_spans_replica_set_boundaries() {
        let mut snapshot = deployment_snapshot();
        snapshot.replica_sets[0].pods = vec![pod("dup", "prod", "Unknown")];
        snapshot.replica_sets[1].pods = vec![pod("dup", "prod", "Running")];
        let next = apply_update(&snapshot, &update(vec![]));
        let total: usize = next.replica_sets.iter().map(|rs| rs.pods.len()).sum();
        assert_eq!(total, 1);
        assert_eq!(next.replica_sets[1].pods[0].phase, "Running");
    }

    #[test]
    fn workload_modify_merges_status_counts() {
        let next = apply_update(
            &deployment_snapshot(),
            &update(vec![change(
                ChangeType::Modified,
                "deployment",
                "web",
                Some("prod"),
                Some(json!({"readyReplicas": 1})),
            )]),
        );
        match next.workload.status {
            WorkloadStatus::Deployment {
                replicas,
                ready_replicas,
                ..
            } => {
                assert_eq!(replicas, 2);
                assert_eq!(ready_replicas, 1);
            }
            ref other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn workload_event_for_other_kind_is_dropped() {
        let snapshot = deployment_snapshot();
        let next = apply_update(
            &snapshot,
            &update(vec![change(
                ChangeType::Modified,
                "daemonset",
                "web",
                Some("prod"),
                Some(json!({"numberReady": 1})),
            )]),
        );
        assert_eq!(next, snapshot);
    }

    #[test]
    fn service_account_lifecycle() {
        let snapshot = deployment_snapshot();
        let added = apply_update(
            &snapshot,
            &update(vec![change(
                ChangeType::Added,
                "serviceaccount",
                "web-sa",
                Some("prod"),
                None,
            )]),
        );
        assert_eq!(
            added.service_account.as_ref().map(|sa| sa.name.as_str()),
            Some("web-sa")
        );
        let deleted = apply_update(
            &added,
            &update(vec![change(
                ChangeType::Deleted,
                "serviceaccount",
                "web-sa",
                Some("prod"),
                None,
            )]),
        );
        assert!(deleted.service_account.is_none());
    }

    #[test]
    fn flat_list_apply_covers_crud() {
        let list = vec![pod("a", "ns", "Running")];
        let added = apply_list(
            &list,
            &change(
                ChangeType::Added,
                "pod",
                "b",
                Some("ns"),
                Some(json!({"phase": "Pending"})),
            ),
        );
        assert_eq!(added.len(), 2);

        let modified = apply_list(
            &added,
            &change(
                ChangeType::Modified,
                "pod",
                "b",
                Some("ns"),
                Some(json!({"phase": "Running"})),
            ),
        );
        assert_eq!(modified[1].phase, "Running");

        let deleted = apply_list(&modified, &change(ChangeType::Deleted, "pod", "a", None, None));
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].name, "b");
    }
}
