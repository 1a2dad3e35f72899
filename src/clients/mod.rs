pub mod stream;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{info, warn};

use crate::models::k8s::PodInfo;
use crate::models::topology::{TopologySnapshot, WorkloadKind};

pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

/// HTTP client for the upstream cluster API serving topology snapshots and
/// listings.
pub struct ClusterClient {
    pub base_url: String,
    http: Client,
    state: Mutex<ClientState>,
}

struct ClientState {
    healthy: bool,
    last_ping: Option<DateTime<Utc>>,
}

impl ClusterClient {
    pub fn new(base_url: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to create HTTP client");

        Self {
            base_url,
            http,
            state: Mutex::new(ClientState {
                healthy: true,
                last_ping: None,
            }),
        }
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        let resp = self
            .http
            .get(format!("{}/healthz", self.base_url))
            .send()
            .await?;

        if resp.status().is_success() {
            let mut state = self.state.lock().unwrap();
            state.healthy = true;
            state.last_ping = Some(Utc::now());
            Ok(())
        } else {
            let mut state = self.state.lock().unwrap();
            state.healthy = false;
            Err(format!("upstream health check returned {}", resp.status()).into())
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.state.lock().unwrap().healthy
    }

    pub fn last_ping(&self) -> Option<DateTime<Utc>> {
        self.state.lock().unwrap().last_ping
    }

    pub async fn get_topology(
        &self,
        kind: WorkloadKind,
        ns: &str,
        name: &str,
    ) -> Result<TopologySnapshot, ClientError> {
        self.get_json(&format!(
            "/api/v1/topology/{}/namespaces/{}/{}",
            kind.as_str(),
            ns,
            name
        ))
        .await
    }

    pub async fn list_namespaces(&self) -> Result<Vec<String>, ClientError> {
        self.get_json("/api/v1/namespaces").await
    }

    pub async fn list_workloads(
        &self,
        kind: WorkloadKind,
        ns: &str,
    ) -> Result<Vec<String>, ClientError> {
        self.get_json(&format!(
            "/api/v1/topology/{}/namespaces/{}",
            kind.as_str(),
            ns
        ))
        .await
    }

    pub async fn list_all_pods(&self) -> Result<Vec<PodInfo>, ClientError> {
        self.get_json("/api/v1/pods").await
    }

    /// Periodic upstream health probe, stopped via the shutdown channel.
    pub async fn run_health_pinger(
        self: std::sync::Arc<Self>,
        mut shutdown: tokio::sync::watch::Receiver<()>,
    ) {
        if let Err(e) = self.ping().await {
            warn!("upstream health check failed: {}", e);
        }

        let mut interval = tokio::time::interval(Duration::from_secs(15));
        interval.tick().await; // skip first immediate tick

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.ping().await {
                        warn!("upstream health check failed: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    info!("health pinger shutting down");
                    return;
                }
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("Accept", "application/json")
            .send()
            .await?;

        if resp.status().as_u16() >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("GET {} returned error: {}", path, body).into());
        }
        Ok(resp.json().await?)
    }
}
