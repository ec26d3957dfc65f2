//! Local HTTP control endpoint for a running recording.
//!
//! Provides:
//! - Requesting a file break (POST /break)
//! - Stopping the session (POST /stop)
//! - Reading session status (GET /status)
//!
//! Handlers only forward commands to the record loop over a channel; the
//! loop owns the session control handle.

use crate::audio::{SessionPhase, SessionStatusHandle};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Break,
    Stop,
}

#[derive(Clone)]
pub struct ControlState {
    pub tx: mpsc::Sender<ControlCommand>,
    pub status: SessionStatusHandle,
}

pub struct ControlServer {
    port: u16,
    state: ControlState,
}

impl ControlServer {
    pub fn new(port: u16, tx: mpsc::Sender<ControlCommand>, status: SessionStatusHandle) -> Self {
        Self {
            port,
            state: ControlState { tx, status },
        }
    }

    /// Bind the listening socket. Fails if the port is taken, before any
    /// task is spawned, so the caller can report it.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind control server to {}", addr))?;

        info!("Control server listening on http://{}", listener.local_addr()?);
        info!("  POST /break   - Close the current file and start the next");
        info!("  POST /stop    - Stop recording");
        info!("  GET  /status  - Session status");

        Ok(listener)
    }

    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let app = router(self.state).layer(ServiceBuilder::new());
        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Creates the router with all control endpoints.
pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/break", post(request_break))
        .route("/stop", post(stop))
        .route("/status", get(status))
        .with_state(state)
}

async fn request_break(State(state): State<ControlState>) -> Result<Json<Value>, StatusCode> {
    send(&state, ControlCommand::Break).await?;
    let status = state.status.get();
    Ok(Json(json!({
        "success": true,
        "message": "Break requested",
        "current_file": status.current_file,
    })))
}

async fn stop(State(state): State<ControlState>) -> Result<Json<Value>, StatusCode> {
    send(&state, ControlCommand::Stop).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Stop requested",
    })))
}

async fn status(State(state): State<ControlState>) -> Json<Value> {
    let status = state.status.get();
    Json(json!({
        "recording": status.phase == SessionPhase::Capturing,
        "phase": status.phase.as_str(),
        "device": status.device,
        "format": status.format,
        "duration_seconds": status.duration_seconds(),
        "current_file": status.current_file,
        "completed_files": status.completed_files,
        "breaks": status.breaks,
        "last_error": status.last_error,
    }))
}

async fn send(state: &ControlState, command: ControlCommand) -> Result<(), StatusCode> {
    if state.status.phase() == SessionPhase::Stopped {
        return Err(StatusCode::CONFLICT);
    }
    info!("{:?} command received via control API", command);
    state.tx.send(command).await.map_err(|e| {
        error!("Failed to forward control command: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
