use crate::broadcast::{Broadcaster, snapshot_message};
use crate::repository::{
    Database, InscriptionFilter, InscriptionRepository, LAST_SYNCED_BLOCK, MetaRepository,
    TokenRepository,
};
use crate::rpc::ChainSource;
use crate::scanner::SyncStats;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

const MAX_INSCRIPTIONS: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub broadcaster: Broadcaster,
    pub source: Arc<dyn ChainSource>,
    pub stats: Arc<SyncStats>,
    pub next_client_id: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(
        db: Database,
        broadcaster: Broadcaster,
        source: Arc<dyn ChainSource>,
        stats: Arc<SyncStats>,
    ) -> Self {
        Self {
            db,
            broadcaster,
            source,
            stats,
            next_client_id: Arc::new(AtomicUsize::new(0)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/tokens", get(rest_tokens))
        .route("/api/inscribes", get(rest_inscribes))
        .route("/api/meta", get(rest_meta))
        .route("/api/health", get(rest_health))
        .route("/api/stats", get(rest_stats))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Request failed: {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

// ── REST ────────────────────────────────────────────────────────────────────

async fn rest_tokens(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let conn = state.db.lock()?;
    Ok(Json(TokenRepository::new(&conn).all()?))
}

#[derive(Debug, Deserialize)]
struct InscribesParams {
    tick: Option<String>,
    limit: Option<usize>,
}

async fn rest_inscribes(
    State(state): State<AppState>,
    Query(params): Query<InscribesParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = InscriptionFilter {
        tick: params.tick,
        ..Default::default()
    };
    let limit = params.limit.unwrap_or(MAX_INSCRIPTIONS).min(MAX_INSCRIPTIONS);

    let conn = state.db.lock()?;
    Ok(Json(InscriptionRepository::new(&conn).query(&filter, limit, 0)?))
}

async fn rest_meta(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let conn = state.db.lock()?;
    let last_synced = MetaRepository::new(&conn)
        .get_i64(LAST_SYNCED_BLOCK)?
        .unwrap_or(-1);
    Ok(Json(json!({ "lastSyncedBlock": last_synced })))
}

async fn rest_health(State(state): State<AppState>) -> Response {
    match state.source.block_number().await {
        Ok(block) => Json(json!({ "ok": true, "block": block })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "ok": false, "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn rest_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.stats.snapshot())
}

// ── WebSocket ───────────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: AppState) {
    let client_id = state.next_client_id.fetch_add(1, Ordering::Relaxed);
    info!("WebSocket connected: client-{}", client_id);

    // subscribe before reading the snapshot so no later pass is missed
    let updates = state.broadcaster.subscribe();
    let (sender, receiver) = socket.split();
    serve_observer(sender, receiver, updates, &state.db, client_id).await;

    info!("WebSocket disconnected: client-{}", client_id);
}

// `updates` must be subscribed before the snapshot is read
pub async fn serve_observer<S, R>(
    mut sender: S,
    mut receiver: R,
    mut updates: broadcast::Receiver<Arc<str>>,
    db: &Database,
    client_id: usize,
) where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let snapshot = snapshot_message(db).and_then(|message| message.to_json());
    match snapshot {
        Ok(json) => {
            if sender.send(Message::Text(json)).await.is_err() {
                return;
            }
        }
        Err(e) => warn!("Snapshot for client-{} failed: {:#}", client_id, e),
    }

    loop {
        tokio::select! {
            message = updates.recv() => {
                match message {
                    Ok(json) => {
                        if sender.send(Message::Text(json.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("client-{} lagged by {} messages", client_id, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }
}
