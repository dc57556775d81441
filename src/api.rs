//! HTTP surface through which a chat bridge forwards messages.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    routing::{get, post},
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::watch;

use crate::commands::{Caller, CommandContext};

/// State shared across axum handlers.
struct AppState {
    commands: CommandContext,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub user: String,
    #[serde(default)]
    pub is_admin: bool,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResponse {
    /// Empty when the text was not a command.
    pub messages: Vec<String>,
}

pub fn router(commands: CommandContext, token: Option<String>) -> Router {
    let state = Arc::new(AppState { commands, token });
    Router::new()
        .route("/command", post(handle_command))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

/// Serves the command API on `listen` until `shutdown` flips to `true`.
pub async fn serve(
    commands: CommandContext,
    token: Option<String>,
    listen: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let app = router(commands, token);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!("Command API listening on {listen}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.token.as_deref() else {
        return true;
    };
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token_matches(token, expected))
}

fn token_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

async fn handle_command(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, (StatusCode, String)> {
    if !authorized(&state, &headers) {
        warn!("Rejected command from {}: bad token", request.user);
        return Err((StatusCode::UNAUTHORIZED, "Invalid token".to_string()));
    }
    debug!("Command from {}: {}", request.user, request.text);

    let caller = Caller {
        user: request.user,
        is_admin: request.is_admin,
    };
    let messages = state
        .commands
        .handle(&caller, &request.text)
        .await
        .unwrap_or_default();
    Ok(Json(CommandResponse { messages }))
}
