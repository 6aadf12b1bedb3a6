use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use medsync_dispatch::{Dispatcher, DispatcherConfig, SubjectRegistry};
use medsync_store::Database;

use crate::handlers::{self, HandlerState};
use crate::subjects::DomainSubjects;
use crate::ws;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    /// Capacity of each client's outgoing queue.
    pub outgoing_capacity: usize,
    /// Capacity of the aggregated subject event channel.
    pub event_capacity: usize,
    /// How long fan-out delivery may block on a full client queue before
    /// the client is disconnected.
    pub send_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            outgoing_capacity: 64,
            event_capacity: 256,
            send_timeout: Duration::from_secs(5),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/medications",
            get(handlers::list_medications).post(handlers::create_medication),
        )
        .route(
            "/api/medications/{medication_id}",
            get(handlers::read_medication)
                .put(handlers::update_medication)
                .delete(handlers::delete_medication),
        )
        .route("/api/users", get(handlers::list_users).post(handlers::create_user))
        .route(
            "/api/users/{user_id}",
            get(handlers::read_user).put(handlers::update_user).delete(handlers::delete_user),
        )
        .route(
            "/api/users/{user_id}/doses",
            get(handlers::list_doses).post(handlers::create_dose),
        )
        .route(
            "/api/users/{user_id}/doses/{dose_id}",
            get(handlers::read_dose).put(handlers::update_dose).delete(handlers::delete_dose),
        )
        .route(
            "/api/users/{user_id}/dosehistory",
            get(handlers::list_dose_history).post(handlers::create_dose_history_entry),
        )
        .route("/api/users/{user_id}/dosesummaries", get(handlers::list_dose_summaries))
        .route("/api/users/{user_id}/dosesummaries/{date}", get(handlers::read_dose_summary))
        .route("/api/dispatcher", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle keeping it alive.
pub async fn start(config: ServerConfig, db: Database) -> Result<ServerHandle, std::io::Error> {
    let mut registry = SubjectRegistry::new(config.event_capacity);
    let subjects = DomainSubjects::build(&mut registry);

    let dispatcher = Arc::new(Dispatcher::with_config(
        registry,
        DispatcherConfig {
            outgoing_capacity: config.outgoing_capacity,
            send_timeout: config.send_timeout,
        },
    ));
    let fanout_handle = tokio::spawn(dispatcher.clone().run());

    let handler_state = Arc::new(HandlerState::new(db, subjects.clone()));
    let state = AppState {
        handler_state,
        dispatcher: dispatcher.clone(),
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "medsync server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        dispatcher,
        subjects,
        _server: server_handle,
        _fanout: fanout_handle,
    })
}

/// Handle returned by `start()`. Keeps background tasks alive and exposes
/// the dispatcher and subjects for embedding callers.
pub struct ServerHandle {
    pub port: u16,
    pub dispatcher: Arc<Dispatcher>,
    pub subjects: DomainSubjects,
    _server: tokio::task::JoinHandle<()>,
    _fanout: tokio::task::JoinHandle<()>,
}

/// WebSocket upgrade handler for the dispatch endpoint.
async fn ws_handler(upgrade: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| ws::handle_connection(socket, state.dispatcher))
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "clients": state.dispatcher.client_count(),
    }))
}
