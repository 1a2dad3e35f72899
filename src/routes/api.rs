use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::graph::{self, LayoutMode, StatusFilter, TopologyFilters, ViewOptions};
use crate::models::topology::WorkloadKind;

/// Filter and view options as flat query parameters; anything omitted keeps
/// its default.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyQuery {
    show_services: Option<bool>,
    show_endpoints: Option<bool>,
    show_secrets: Option<bool>,
    show_config_maps: Option<bool>,
    show_service_account: Option<bool>,
    show_rbac: Option<bool>,
    show_containers: Option<bool>,
    show_pods: Option<bool>,
    show_replica_sets: Option<bool>,
    status_filter: Option<StatusFilter>,
    search_term: Option<String>,
    layout: Option<LayoutMode>,
    spacing: Option<f64>,
}

impl TopologyQuery {
    pub fn into_parts(self) -> (TopologyFilters, ViewOptions) {
        let mut filters = TopologyFilters::default();
        let mut view = ViewOptions::default();
        if let Some(v) = self.show_services {
            filters.show_services = v;
        }
        if let Some(v) = self.show_endpoints {
            filters.show_endpoints = v;
        }
        if let Some(v) = self.show_secrets {
            filters.show_secrets = v;
        }
        if let Some(v) = self.show_config_maps {
            filters.show_config_maps = v;
        }
        if let Some(v) = self.show_service_account {
            filters.show_service_account = v;
        }
        if let Some(v) = self.show_rbac {
            filters.show_rbac = v;
        }
        if let Some(v) = self.show_containers {
            filters.show_containers = v;
        }
        if let Some(v) = self.show_pods {
            filters.show_pods = v;
        }
        if let Some(v) = self.show_replica_sets {
            filters.show_replica_sets = v;
        }
        if let Some(v) = self.status_filter {
            filters.status_filter = v;
        }
        if let Some(v) = self.search_term {
            filters.search_term = v;
        }
        if let Some(v) = self.layout {
            view.layout = v;
        }
        if let Some(v) = self.spacing {
            view.spacing = v;
        }
        (filters, view)
    }
}

pub async fn handle_get_topology(
    State(state): State<AppState>,
    Path((kind, namespace, name)): Path<(String, String, String)>,
    Query(query): Query<TopologyQuery>,
) -> Response {
    let Some(kind) = WorkloadKind::parse(&kind) else {
        return (
            StatusCode::NOT_FOUND,
            format!("unknown workload kind {:?}", kind),
        )
            .into_response();
    };
    match state.client.get_topology(kind, &namespace, &name).await {
        Ok(snapshot) => {
            let (filters, view) = query.into_parts();
            let graph = graph::build_positioned(
                &snapshot,
                &filters,
                Some(&state.config.cluster_name),
                &view,
            );
            Json(graph).into_response()
        }
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

pub async fn handle_list_namespaces(State(state): State<AppState>) -> Response {
    match state.client.list_namespaces().await {
        Ok(namespaces) => Json(namespaces).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_list_workloads(
    State(state): State<AppState>,
    Path((kind, namespace)): Path<(String, String)>,
) -> Response {
    let Some(kind) = WorkloadKind::parse(&kind) else {
        return (
            StatusCode::NOT_FOUND,
            format!("unknown workload kind {:?}", kind),
        )
            .into_response();
    };
    match state.client.list_workloads(kind, &namespace).await {
        Ok(names) => Json(names).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_list_pods(State(state): State<AppState>) -> Response {
    match state.client.list_all_pods().await {
        Ok(pods) => Json(pods).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_healthz(State(state): State<AppState>) -> Response {
    if state.client.is_healthy() {
        (StatusCode::OK, "ok\n").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "upstream unreachable\n").into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub cluster_name: String,
    pub upstream_url: String,
    pub upstream_healthy: bool,
    pub last_ping: Option<DateTime<Utc>>,
}

pub async fn handle_status(State(state): State<AppState>) -> Json<StatusBody> {
    Json(StatusBody {
        cluster_name: state.config.cluster_name.clone(),
        upstream_url: state.client.base_url.clone(),
        upstream_healthy: state.client.is_healthy(),
        last_ping: state.client.last_ping(),
    })
}
