//! Local HTTP API for rendering front ends.
//!
//! Exposes session state and the three entry points to a browser or any
//! other client on localhost. Handlers never touch the session directly:
//! reads come from the published snapshot, writes go through the service
//! loop as [`ApiCommand`]s.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

use crate::error::{ListenError, SubmitError};
use crate::session::SessionSnapshot;

#[derive(Debug)]
pub enum ApiCommand {
    Submit {
        text: String,
        reply: oneshot::Sender<Result<(), SubmitError>>,
    },
    Listen {
        reply: oneshot::Sender<Result<(), ListenError>>,
    },
    Stop,
}

#[derive(Clone)]
pub struct ApiState {
    pub commands: mpsc::Sender<ApiCommand>,
    pub snapshot: watch::Receiver<SessionSnapshot>,
}

#[derive(Deserialize)]
struct SubmitRequest {
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SimpleResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SimpleResponse {
    fn ok(status: &str) -> Self {
        Self {
            status: status.into(),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            error: Some(message.into()),
        }
    }
}

type ApiResponse = (StatusCode, Json<SimpleResponse>);

fn session_unavailable() -> ApiResponse {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(SimpleResponse::err("session is shutting down")),
    )
}

/// Build the axum router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/state", get(handle_state))
        .route("/submit", post(handle_submit))
        .route("/listen", post(handle_listen))
        .route("/stop", post(handle_stop))
        .with_state(state)
}

/// Start the API server as a background tokio task.
pub async fn start_api(state: ApiState, port: u16) {
    let app = router(state);
    let addr = format!("127.0.0.1:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!("Failed to bind API on {addr}: {e}");
            return;
        }
    };
    info!("API server listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("API server error: {e}");
        }
    });
}

// --- Handlers ---

async fn handle_state(State(state): State<ApiState>) -> Json<SessionSnapshot> {
    Json(state.snapshot.borrow().clone())
}

async fn handle_submit(
    State(state): State<ApiState>,
    Json(req): Json<SubmitRequest>,
) -> ApiResponse {
    let (reply, rx) = oneshot::channel();
    let command = ApiCommand::Submit {
        text: req.text,
        reply,
    };
    if state.commands.send(command).await.is_err() {
        return session_unavailable();
    }

    match rx.await {
        Ok(Ok(())) => (StatusCode::ACCEPTED, Json(SimpleResponse::ok("accepted"))),
        Ok(Err(e @ SubmitError::EmptyInput)) => {
            (StatusCode::BAD_REQUEST, Json(SimpleResponse::err(e.to_string())))
        }
        Ok(Err(e @ SubmitError::Busy)) => {
            (StatusCode::CONFLICT, Json(SimpleResponse::err(e.to_string())))
        }
        Err(_) => session_unavailable(),
    }
}

async fn handle_listen(State(state): State<ApiState>) -> ApiResponse {
    let (reply, rx) = oneshot::channel();
    if state.commands.send(ApiCommand::Listen { reply }).await.is_err() {
        return session_unavailable();
    }

    match rx.await {
        Ok(Ok(())) => (StatusCode::ACCEPTED, Json(SimpleResponse::ok("listening"))),
        Ok(Err(e)) => (StatusCode::CONFLICT, Json(SimpleResponse::err(e.to_string()))),
        Err(_) => session_unavailable(),
    }
}

async fn handle_stop(State(state): State<ApiState>) -> ApiResponse {
    if state.commands.send(ApiCommand::Stop).await.is_err() {
        return session_unavailable();
    }
    (StatusCode::OK, Json(SimpleResponse::ok("stopped")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::prompt::test_support::serve;

    /// Answers commands like a session that is busy with one reply.
    fn fake_loop(mut rx: mpsc::Receiver<ApiCommand>) {
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    ApiCommand::Submit { text, reply } => {
                        let result = match text.trim() {
                            "" => Err(SubmitError::EmptyInput),
                            "busy" => Err(SubmitError::Busy),
                            _ => Ok(()),
                        };
                        let _ = reply.send(result);
                    }
                    ApiCommand::Listen { reply } => {
                        let _ = reply.send(Err(ListenError::AlreadyListening));
                    }
                    ApiCommand::Stop => {}
                }
            }
        });
    }

    async fn api() -> String {
        let (commands, rx) = mpsc::channel(8);
        fake_loop(rx);
        let snapshot = SessionSnapshot {
            pending_input: "draft".into(),
            is_speaking: true,
            ..SessionSnapshot::default()
        };
        // Receivers keep the last value after the sender is gone.
        let (_, snapshot_rx) = watch::channel(snapshot);
        serve(router(ApiState {
            commands,
            snapshot: snapshot_rx,
        }))
        .await
    }

    #[tokio::test]
    async fn test_state_returns_snapshot() {
        let base = api().await;
        let body: serde_json::Value = reqwest::get(format!("{base}/state"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["pending_input"], "draft");
        assert_eq!(body["is_speaking"], true);
        assert_eq!(body["messages"], json!([]));
    }

    #[tokio::test]
    async fn test_submit_status_codes() {
        let base = api().await;
        let client = reqwest::Client::new();
        let post = |text: &'static str| {
            client
                .post(format!("{base}/submit"))
                .json(&json!({ "text": text }))
                .send()
        };

        assert_eq!(post("hello").await.unwrap().status(), 202);
        assert_eq!(post("  ").await.unwrap().status(), 400);
        let busy = post("busy").await.unwrap();
        assert_eq!(busy.status(), 409);
        let body: serde_json::Value = busy.json().await.unwrap();
        assert_eq!(body["error"], "still waiting for the previous reply");
    }

    #[tokio::test]
    async fn test_listen_conflict_and_stop() {
        let base = api().await;
        let client = reqwest::Client::new();
        let listen = client.post(format!("{base}/listen")).send().await.unwrap();
        assert_eq!(listen.status(), 409);
        let stop = client.post(format!("{base}/stop")).send().await.unwrap();
        assert_eq!(stop.status(), 200);
    }

    #[tokio::test]
    async fn test_closed_session_is_unavailable() {
        let (commands, rx) = mpsc::channel(1);
        drop(rx);
        let (_, snapshot) = watch::channel(SessionSnapshot::default());
        let base = serve(router(ApiState { commands, snapshot })).await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/stop"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 503);
    }
}
