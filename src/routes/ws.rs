//! Browser-facing WebSocket: holds one watch session per connection, feeds
//! it from the upstream update stream, and pushes a freshly positioned
//! graph after every accepted change.

use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::AppState;
use crate::clients::stream::{self, StreamConfig};
use crate::graph::{TopologyEdge, TopologyFilters, TopologyNode, ViewOptions};
use crate::models::k8s::PodInfo;
use crate::models::topology::{TopologyUpdate, WorkloadKind};
use crate::reconcile;
use crate::session::{Selection, WatchSession};

use super::api::TopologyQuery;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientRequest {
    Refresh,
    Filters { filters: TopologyFilters },
    View { view: ViewOptions },
    Select {
        kind: WorkloadKind,
        namespace: String,
        name: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ServerFrame<'a> {
    Graph {
        nodes: &'a [TopologyNode],
        edges: &'a [TopologyEdge],
    },
    Pods {
        pods: &'a [PodInfo],
    },
    Error {
        message: String,
    },
}

pub async fn handle_watch(
    State(state): State<AppState>,
    Path((kind, namespace, name)): Path<(String, String, String)>,
    Query(query): Query<TopologyQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(kind) = WorkloadKind::parse(&kind) else {
        return (
            StatusCode::NOT_FOUND,
            format!("unknown workload kind {:?}", kind),
        )
            .into_response();
    };
    let (filters, view) = query.into_parts();
    let selection = Selection {
        kind,
        namespace,
        name,
    };
    ws.on_upgrade(move |socket| watch_loop(socket, state, selection, filters, view))
        .into_response()
}

/// Handle to a spawned upstream feed task, tied to the session generation
/// it was started for.
struct FeedHandle {
    updates: mpsc::Receiver<TopologyUpdate>,
    refresh: mpsc::Sender<()>,
    shutdown: watch::Sender<()>,
    generation: u64,
}

impl FeedHandle {
    fn spawn(state: &AppState, session: &WatchSession) -> Self {
        let (tx, updates) = mpsc::channel(32);
        let (refresh, refresh_rx) = mpsc::channel(4);
        let (shutdown, shutdown_rx) = watch::channel(());
        let selection = session.selection();
        let cfg = StreamConfig {
            url: state.config.feed_url(),
            namespace: selection.namespace.clone(),
            workload: Some((selection.kind, selection.name.clone())),
            reconnect: state.config.reconnect,
        };
        tokio::spawn(stream::run(cfg, tx, refresh_rx, shutdown_rx));
        Self {
            updates,
            refresh,
            shutdown,
            generation: session.generation(),
        }
    }

    fn stop(&self) {
        let _ = self.shutdown.send(());
    }
}

async fn watch_loop(
    socket: WebSocket,
    state: AppState,
    selection: Selection,
    filters: TopologyFilters,
    view: ViewOptions,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut session = WatchSession::new(
        selection,
        Some(state.config.cluster_name.clone()),
        filters,
        view,
    );

    let mut feed = FeedHandle::spawn(&state, &session);
    if !fetch_and_install(&state, &mut session, &mut sender).await {
        feed.stop();
        return;
    }

    loop {
        tokio::select! {
            update = feed.updates.recv() => match update {
                Some(update) => {
                    if session.apply_update(feed.generation, &update)
                        && !send_graph(&mut sender, &session).await
                    {
                        break;
                    }
                }
                None => {
                    // Feed gave up reconnecting; the last-good graph stays up
                    // but there is nothing left to stream.
                    warn!("update feed ended for {:?}", session.selection().name);
                    break;
                }
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientRequest>(&text) {
                        Ok(request) => {
                            if !handle_request(request, &state, &mut session, &mut feed, &mut sender).await {
                                break;
                            }
                        }
                        Err(e) => debug!(error = %e, "ignoring malformed client request"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "watch socket receive error");
                    break;
                }
            }
        }
    }

    feed.stop();
    info!("watch session closed");
}

/// Cluster-wide flat pod view, kept current by the list form of the
/// reconciler instead of a full topology session.
pub async fn handle_watch_pods(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| pods_loop(socket, state))
        .into_response()
}

async fn pods_loop(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let mut pods: Vec<PodInfo> = match state.client.list_all_pods().await {
        Ok(pods) => pods,
        Err(e) => {
            let _ = send_frame(
                &mut sender,
                &ServerFrame::Error {
                    message: e.to_string(),
                },
            )
            .await;
            Vec::new()
        }
    };
    if !send_frame(&mut sender, &ServerFrame::Pods { pods: &pods }).await {
        return;
    }

    let (tx, mut updates) = mpsc::channel(32);
    let (_refresh, refresh_rx) = mpsc::channel(4);
    let (shutdown, shutdown_rx) = watch::channel(());
    let cfg = StreamConfig {
        url: state.config.feed_url(),
        namespace: String::new(),
        workload: None,
        reconnect: state.config.reconnect,
    };
    tokio::spawn(stream::run(cfg, tx, refresh_rx, shutdown_rx));

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(update) => {
                    let mut changed = false;
                    for change in update
                        .changes
                        .iter()
                        .filter(|c| c.resource_type.eq_ignore_ascii_case("pod"))
                    {
                        pods = reconcile::apply_list(&pods, change);
                        changed = true;
                    }
                    if changed && !send_frame(&mut sender, &ServerFrame::Pods { pods: &pods }).await {
                        break;
                    }
                }
                None => break,
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "pod watch socket receive error");
                    break;
                }
            }
        }
    }

    let _ = shutdown.send(());
}

async fn handle_request(
    request: ClientRequest,
    state: &AppState,
    session: &mut WatchSession,
    feed: &mut FeedHandle,
    sender: &mut SplitSink<WebSocket, Message>,
) -> bool {
    match request {
        ClientRequest::Refresh => {
            let _ = feed.refresh.try_send(());
            fetch_and_install(state, session, sender).await
        }
        ClientRequest::Filters { filters } => {
            session.set_filters(filters);
            send_graph(sender, session).await
        }
        ClientRequest::View { view } => {
            session.set_view(view);
            send_graph(sender, session).await
        }
        ClientRequest::Select {
            kind,
            namespace,
            name,
        } => {
            session.select(Selection {
                kind,
                namespace,
                name,
            });
            // Updates still queued from the old feed carry a stale
            // generation and will be discarded by the session.
            feed.stop();
            *feed = FeedHandle::spawn(state, session);
            fetch_and_install(state, session, sender).await
        }
    }
}

/// Fetch the selected topology and install it unless the selection moved on
/// while the request was in flight. Fetch failures keep the last-good
/// snapshot and surface the error to the client.
async fn fetch_and_install(
    state: &AppState,
    session: &mut WatchSession,
    sender: &mut SplitSink<WebSocket, Message>,
) -> bool {
    let selection = session.selection().clone();
    let generation = session.generation();
    match state
        .client
        .get_topology(selection.kind, &selection.namespace, &selection.name)
        .await
    {
        Ok(snapshot) => {
            if session.install_snapshot(generation, snapshot) {
                send_graph(sender, session).await
            } else {
                true
            }
        }
        Err(e) => {
            if session.snapshot().is_some() {
                debug!("fetch failed, keeping the last-good snapshot");
            }
            send_frame(
                sender,
                &ServerFrame::Error {
                    message: e.to_string(),
                },
            )
            .await
        }
    }
}

async fn send_graph(sender: &mut SplitSink<WebSocket, Message>, session: &WatchSession) -> bool {
    match session.graph() {
        Some(graph) => {
            send_frame(
                sender,
                &ServerFrame::Graph {
                    nodes: &graph.nodes,
                    edges: &graph.edges,
                },
            )
            .await
        }
        None => true,
    }
}

async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &ServerFrame<'_>) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "failed to serialize frame");
            true
        }
    }
}
