//! Webhook endpoint handler.
//!
//! Each delivery is processed synchronously inside the request: verify,
//! parse, dispatch, and only then answer. The HTTP status reflects the
//! boundary checks and terminal failures; partial failures are reported
//! through the failure notifier and still answered with 200.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::remote::HttpRemote;
use crate::sync::{self, Incident, NotifyOutcome, SyncError, SyncOutcome};
use crate::types::DeliveryId;
use crate::webhooks::{ParseError, SignatureCheck, SourceEvent, check_signature, parse_webhook};

/// Header name for the event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header name for the delivery ID.
const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header name for the payload signature.
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

/// Errors that can occur when processing a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Missing required header.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// Invalid or missing signature while a secret is configured.
    #[error("invalid signature")]
    InvalidSignature,

    #[error("empty request body")]
    EmptyBody,

    /// Invalid JSON body.
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// Well-formed JSON with an unusable field.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[source] ParseError),

    /// Processing failed terminally. The incident has already been reported.
    #[error("processing failed: {0}")]
    Sync(#[from] SyncError),
}

impl From<ParseError> for WebhookError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::JsonError(e) => WebhookError::InvalidJson(e),
            other => WebhookError::MalformedPayload(other),
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingHeader(_)
            | WebhookError::EmptyBody
            | WebhookError::InvalidJson(_)
            | WebhookError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::Sync(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "status": "error", "error": self.to_string() }))).into_response()
    }
}

/// Webhook handler.
///
/// # Request
///
/// - Method: POST
/// - Headers:
///   - `X-GitHub-Event`: Event type (required)
///   - `X-GitHub-Delivery`: Delivery ID (optional, used in logs and tickets)
///   - `X-Hub-Signature-256`: HMAC-SHA256 signature (required when a secret
///     is configured)
/// - Body: JSON webhook payload
///
/// # Response
///
/// - 200 OK: Event applied, ignored, or applied with partial failures
/// - 400 Bad Request: Missing header, empty body or malformed payload
/// - 401 Unauthorized: Invalid signature
/// - 500 Internal Server Error: Terminal processing failure
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), WebhookError> {
    let event_type =
        get_header(&headers, HEADER_EVENT).ok_or(WebhookError::MissingHeader(HEADER_EVENT))?;
    let delivery_id = DeliveryId::new(
        get_header(&headers, HEADER_DELIVERY).unwrap_or_else(|| "unknown".to_string()),
    );

    debug!(delivery_id = %delivery_id, event_type = %event_type, "Received webhook");

    // Verify signature BEFORE any parsing or I/O.
    let signature = get_header(&headers, HEADER_SIGNATURE);
    let secret = app_state.config().webhook_secret.as_deref();
    match check_signature(&body, signature.as_deref(), secret) {
        SignatureCheck::Valid => {}
        SignatureCheck::Skipped => {
            warn!(
                delivery_id = %delivery_id,
                "No webhook secret configured; signature not verified"
            );
        }
        SignatureCheck::Invalid => {
            warn!(delivery_id = %delivery_id, "Invalid webhook signature");
            return Err(WebhookError::InvalidSignature);
        }
    }

    if body.is_empty() {
        return Err(WebhookError::EmptyBody);
    }

    let Some(event) = parse_webhook(&event_type, &body)? else {
        debug!(delivery_id = %delivery_id, event_type = %event_type, "Ignoring unhandled event");
        return Ok(reply(json!({ "status": "ignored", "event": event_type })));
    };

    if let SourceEvent::Ping(ping) = &event {
        info!(delivery_id = %delivery_id, hook_id = ?ping.hook_id, "Ping received");
        return Ok(reply(json!({ "status": "pong", "zen": ping.zen })));
    }

    let deadline = app_state.config().event_deadline;
    let result = match tokio::time::timeout(deadline, process(&app_state, &event)).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::DeadlineExceeded(deadline)),
    };

    match result {
        Ok(outcome) => {
            let body = report_outcome(&app_state, &event, &delivery_id, outcome).await;
            Ok(reply(body))
        }
        Err(e) => {
            let incident = Incident::new(&event, &delivery_id, &e);
            sync::notify(app_state.established(), app_state.config(), &incident).await;
            Err(WebhookError::Sync(e))
        }
    }
}

async fn process(app_state: &AppState, event: &SourceEvent) -> Result<SyncOutcome, SyncError> {
    let remote = app_state.remote().await?;
    sync::dispatch(remote, app_state.config(), event).await
}

/// Builds the success body, notifying on partial failures.
async fn report_outcome(
    app_state: &AppState,
    event: &SourceEvent,
    delivery_id: &DeliveryId,
    outcome: SyncOutcome,
) -> Value {
    match outcome {
        SyncOutcome::Pong => json!({ "status": "pong" }),
        SyncOutcome::Ignored { reason } => json!({ "status": "ignored", "reason": reason }),
        SyncOutcome::Synced { repository, report } => {
            info!(
                delivery_id = %delivery_id,
                event = event.kind(),
                %repository,
                %report,
                "Delivery processed"
            );
            let mut body = json!({
                "status": "synced",
                "repository_id": repository.0,
                "created": report.created,
                "already_present": report.already_present,
                "failed": report.failures.len(),
            });
            if !report.is_clean() {
                let incident = Incident::partial(event, delivery_id, &report);
                let remote: Option<&HttpRemote> = app_state.established();
                let outcome = sync::notify(remote, app_state.config(), &incident).await;
                body["notification"] = json!(notification_label(outcome));
            }
            body
        }
    }
}

fn notification_label(outcome: NotifyOutcome) -> &'static str {
    match outcome {
        NotifyOutcome::LoggedOnly => "logged",
        NotifyOutcome::Commented(_) => "commented",
        NotifyOutcome::TicketCreated(_) => "ticket_created",
        NotifyOutcome::Failed => "failed",
    }
}

fn reply(body: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(body))
}

/// Extracts a header value as a string.
fn get_header(headers: &HeaderMap, name: &'static str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
