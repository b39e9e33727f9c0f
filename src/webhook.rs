//! Inbound WhatsApp webhook.
//!
//! - `GET /webhook` answers the provider's subscription handshake.
//! - `POST /webhook` receives events. Text messages are answered through the
//!   configured [`ReplyGenerator`] and [`Notifier`]; status updates are
//!   acknowledged and dropped.

use crate::dispatcher::Notifier;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Produces the reply to an inbound text message.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Returns the text to send back for `message`.
    async fn reply(&self, message: &str) -> String;
}

/// Echoes the message back in upper case.
#[derive(Debug, Clone, Copy, Default)]
pub struct UppercaseReply;

#[async_trait]
impl ReplyGenerator for UppercaseReply {
    async fn reply(&self, message: &str) -> String {
        message.to_uppercase()
    }
}

/// Shared state of the webhook routes.
#[derive(Clone)]
pub struct WebhookState {
    notifier: Arc<dyn Notifier>,
    generator: Arc<dyn ReplyGenerator>,
    verify_token: Arc<str>,
}

impl WebhookState {
    /// Creates the state from its collaborators and the subscription token.
    pub fn new(
        notifier: Arc<dyn Notifier>,
        generator: Arc<dyn ReplyGenerator>,
        verify_token: impl Into<String>,
    ) -> Self {
        Self {
            notifier,
            generator,
            verify_token: Arc::from(verify_token.into()),
        }
    }
}

impl std::fmt::Debug for WebhookState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookState")
            .field("verify_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Builds the `/webhook` router.
pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", get(verify_subscription).post(receive_event))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

fn status_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "status": "error", "message": message }))).into_response()
}

fn ok_body() -> Response {
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}

async fn verify_subscription(
    State(state): State<WebhookState>,
    Query(params): Query<VerifyParams>,
) -> Response {
    let (Some(mode), Some(token), Some(challenge)) =
        (params.mode, params.verify_token, params.challenge)
    else {
        info!("Webhook verification missing parameters");
        return status_body(StatusCode::BAD_REQUEST, "Missing parameters");
    };

    if mode == "subscribe" && token == *state.verify_token {
        info!("Webhook verified");
        (StatusCode::OK, challenge).into_response()
    } else {
        warn!(mode = %mode, "Webhook verification failed");
        status_body(StatusCode::FORBIDDEN, "Verification failed")
    }
}

async fn receive_event(State(state): State<WebhookState>, body: Bytes) -> Response {
    let event: Value = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Failed to decode webhook body");
            return status_body(StatusCode::BAD_REQUEST, "Invalid JSON provided");
        }
    };

    if event
        .pointer("/entry/0/changes/0/value/statuses")
        .is_some()
    {
        info!("Received a WhatsApp status update");
        return ok_body();
    }

    if !is_message_event(&event) {
        return status_body(StatusCode::NOT_FOUND, "Not a WhatsApp API event");
    }

    handle_message(&state, &event).await;
    ok_body()
}

/// Empty strings, arrays and objects, `null`, `false` and zero count as absent.
fn present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

fn is_message_event(event: &Value) -> bool {
    [
        "/object",
        "/entry",
        "/entry/0/changes",
        "/entry/0/changes/0/value",
        "/entry/0/changes/0/value/messages",
        "/entry/0/changes/0/value/messages/0",
    ]
    .iter()
    .all(|path| present(event.pointer(path)))
}

async fn handle_message(state: &WebhookState, event: &Value) {
    let Some(value) = event.pointer("/entry/0/changes/0/value") else {
        return;
    };
    let message = &value["messages"][0];

    let sender = value
        .pointer("/contacts/0/wa_id")
        .and_then(Value::as_str)
        .or_else(|| message["from"].as_str());
    let Some(sender) = sender else {
        warn!("Inbound message without a sender id");
        return;
    };

    let Some(text) = message.pointer("/text/body").and_then(Value::as_str) else {
        warn!(
            kind = message["type"].as_str().unwrap_or("unknown"),
            "Ignoring non-text message"
        );
        return;
    };

    let reply = state.generator.reply(text).await;
    if let Err(e) = state.notifier.send(sender, &reply).await {
        error!(
            to = %sender,
            error = %e,
            category = %e.category(),
            "Failed to send webhook reply"
        );
    }
}
