//! Upstream update feed: a WebSocket client that subscribes on connect,
//! forwards `TopologyUpdate` frames into an injected channel, and reconnects
//! with exponential backoff. The caller owns the channel and the shutdown
//! signal; nothing here is module-global.

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, sleep};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use crate::config::ReconnectConfig;
use crate::models::topology::{FeedRequest, TopologyUpdate, WorkloadKind};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("stream closed by upstream")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub namespace: String,
    pub workload: Option<(WorkloadKind, String)>,
    pub reconnect: ReconnectConfig,
}

enum PumpEnd {
    Shutdown,
    Lost(StreamError),
}

/// Drive the feed until shutdown, or until the connect attempt budget is
/// spent. A connection that was established and then lost resets the
/// attempt counter.
pub async fn run(
    cfg: StreamConfig,
    tx: mpsc::Sender<TopologyUpdate>,
    mut refresh: mpsc::Receiver<()>,
    mut shutdown: watch::Receiver<()>,
) {
    let mut attempts = 0u32;
    let mut delay = Duration::from_millis(cfg.reconnect.base_delay_ms);

    loop {
        match connect_and_pump(&cfg, &tx, &mut refresh, &mut shutdown).await {
            Ok(PumpEnd::Shutdown) => return,
            Ok(PumpEnd::Lost(e)) => {
                attempts = 0;
                delay = Duration::from_millis(cfg.reconnect.base_delay_ms);
                warn!("update feed lost: {}, reconnecting", e);
            }
            Err(e) => {
                attempts += 1;
                if attempts >= cfg.reconnect.max_attempts {
                    error!(
                        "giving up on the update feed after {} attempts: {}",
                        attempts, e
                    );
                    return;
                }
                warn!("update feed connect failed (attempt {}): {}", attempts, e);
            }
        }

        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown.changed() => return,
        }
        delay = next_delay(delay, &cfg.reconnect);
    }
}

fn next_delay(current: Duration, cfg: &ReconnectConfig) -> Duration {
    (current * 2).min(Duration::from_millis(cfg.max_delay_ms))
}

async fn connect_and_pump(
    cfg: &StreamConfig,
    tx: &mpsc::Sender<TopologyUpdate>,
    refresh: &mut mpsc::Receiver<()>,
    shutdown: &mut watch::Receiver<()>,
) -> Result<PumpEnd, StreamError> {
    let (ws, _) = connect_async(cfg.url.as_str()).await?;
    info!("connected to update feed at {}", cfg.url);
    let (mut sink, mut source) = ws.split();

    let workload = cfg.workload.as_ref().map(|(k, n)| (*k, n.as_str()));
    if let Ok(json) = serde_json::to_string(&FeedRequest::subscribe(&cfg.namespace, workload)) {
        sink.send(Message::Text(json)).await?;
    }

    loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<TopologyUpdate>(&text) {
                        Ok(update) => {
                            // Receiver gone means the session is over.
                            if tx.send(update).await.is_err() {
                                return Ok(PumpEnd::Shutdown);
                            }
                        }
                        Err(e) => warn!(error = %e, "ignoring malformed update frame"),
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => return Ok(PumpEnd::Lost(StreamError::Closed)),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Ok(PumpEnd::Lost(e.into())),
            },
            Some(()) = refresh.recv() => {
                let req = FeedRequest::refresh(&cfg.namespace, workload);
                if let Ok(json) = serde_json::to_string(&req) {
                    if let Err(e) = sink.send(Message::Text(json)).await {
                        return Ok(PumpEnd::Lost(e.into()));
                    }
                }
            }
            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(PumpEnd::Shutdown);
            }
        }
    }
}
