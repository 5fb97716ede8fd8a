//! Webhook dispatcher: the `POST /slack/events` entry point.
//!
//! The request flow is verify, dedup, route, then fan out to logging and
//! forwarding after the acknowledgment is built. Slack retries deliveries
//! that do not get a 200, so duplicate events and events for unrecognized
//! workspaces are still acknowledged as success with a structured flag.

use crate::error::{MirrorError, Result};
use crate::http::AppState;
use crate::logging::Timer;
use crate::slack::{EventEnvelope, MessageEvent, SlackClient, TeamId, verify};
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SIGNATURE_HEADER: &str = "x-slack-signature";

/// Acknowledgment body returned to Slack.
#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<String>,
}

impl AckResponse {
    fn ok() -> Self {
        Self {
            ok: true,
            duplicate: None,
            ignored: None,
        }
    }

    fn duplicate() -> Self {
        Self {
            duplicate: Some(true),
            ..Self::ok()
        }
    }

    fn ignored(reason: impl Into<String>) -> Self {
        Self {
            ignored: Some(reason.into()),
            ..Self::ok()
        }
    }
}

pub async fn slack_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let _timer = Timer::new("slack_events");

    let timestamp = headers.get(TIMESTAMP_HEADER).and_then(|v| v.to_str().ok());
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    // The signature covers the bytes exactly as transmitted; this handler
    // never re-serializes the body before verification.
    let raw_body = std::str::from_utf8(&body)
        .map_err(|_| MirrorError::BadRequest("Body is not valid UTF-8".to_string()))?;
    if raw_body.is_empty() {
        return Err(MirrorError::BadRequest("Empty body".to_string()));
    }

    if !verify::verify(
        &state.settings.slack.signing_secret,
        timestamp,
        raw_body,
        signature,
    ) {
        return Err(MirrorError::Forbidden);
    }

    let envelope: EventEnvelope = serde_json::from_str(raw_body)
        .map_err(|_| MirrorError::BadRequest("Invalid JSON payload".to_string()))?;

    // Challenge requests short-circuit everything after the signature check.
    if envelope.kind == "url_verification" {
        return Ok(Json(json!({ "challenge": envelope.challenge })).into_response());
    }

    let team_id = envelope
        .team_id
        .ok_or_else(|| MirrorError::BadRequest("Missing team_id".to_string()))?;
    let event_id = envelope.event_id.unwrap_or_default();

    if state.deduper.check_and_mark(&event_id) {
        tracing::debug!(
            team_id = %team_id,
            event_id = %event_id,
            "Duplicate event, acknowledging without reprocessing"
        );
        return Ok(Json(AckResponse::duplicate()).into_response());
    }

    let client = match state.registry.resolve(&team_id) {
        Ok(client) => client,
        Err(_) => {
            tracing::warn!(
                team_id = %team_id,
                "Event for unknown workspace, acknowledging to stop redelivery"
            );
            return Ok(Json(AckResponse::ignored("unknown_team")).into_response());
        }
    };

    if let Some(event) = envelope.event.filter(MessageEvent::is_genuine_message) {
        // Post-acknowledgment side effects. Detached so the response never
        // waits on downstream API latency; failures are logged and dropped.
        let log_state = state.clone();
        let log_client = client.clone();
        let log_team = team_id.clone();
        let log_event = event.clone();
        let log_event_id = event_id.clone();
        tokio::spawn(async move {
            log_message_event(&log_state, &log_team, &log_client, &log_event, &log_event_id).await;
        });

        tokio::spawn(async move {
            state
                .forwarder
                .maybe_forward(&team_id, &client, &event)
                .await;
        });
    }

    Ok(Json(AckResponse::ok()).into_response())
}

/// Diagnostic logging for an inbound message. Errors are captured here and
/// never reach the already-sent acknowledgment.
async fn log_message_event(
    state: &AppState,
    team_id: &TeamId,
    client: &Arc<SlackClient>,
    event: &MessageEvent,
    event_id: &str,
) {
    tracing::info!(
        team_id = %team_id,
        event_id = %event_id,
        user = event.user.as_ref().map(|u| u.as_str()).unwrap_or_default(),
        channel = event.channel.as_ref().map(|c| c.as_str()).unwrap_or_default(),
        text = event.text.as_deref().unwrap_or_default(),
        "Inbound message"
    );

    if let Some(user) = event.user.as_ref() {
        match client.get_user_info(user).await {
            Ok(info) => tracing::info!(
                team_id = %team_id,
                user_id = %info.id,
                user = %info.label(),
                email = info.email.as_deref().unwrap_or_default(),
                "Message author"
            ),
            Err(e) => tracing::warn!(user_id = %user.as_str(), error = %e, "User lookup failed"),
        }
    }

    if let Some(channel) = event.channel.as_ref() {
        match client.get_channel_info(channel).await {
            Ok(info) => tracing::info!(
                team_id = %team_id,
                channel_id = %info.id,
                channel = info.name.as_deref().unwrap_or_default(),
                is_private = info.is_private,
                "Message channel"
            ),
            Err(e) => {
                tracing::warn!(channel_id = %channel.as_str(), error = %e, "Channel lookup failed")
            }
        }

        if state.settings.history.log_history {
            match client.fetch_history(channel, 10, None).await {
                Ok(messages) => tracing::info!(
                    team_id = %team_id,
                    channel_id = %channel.as_str(),
                    message_count = messages.len(),
                    "Recent channel history"
                ),
                Err(e) => {
                    tracing::warn!(channel_id = %channel.as_str(), error = %e, "History fetch failed")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HistoryConfig, ServerConfig, Settings, SlackConfig};
    use crate::dedup::EventDeduper;
    use crate::forward::Forwarder;
    use crate::http::create_router;
    use crate::registry::ClientRegistry;
    use crate::resolver::ChannelResolver;
    use crate::slack::shared_connector;
    use crate::storage::TokenStore;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    const SECRET: &str = "test-signing-secret";

    fn test_router() -> (Router, tempfile::TempDir) {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let dir = tempfile::tempdir().unwrap();

        let settings = Arc::new(Settings {
            server: ServerConfig {
                port: 0,
                tokens_file: dir.path().join("tokens.json"),
            },
            slack: SlackConfig {
                signing_secret: SECRET.to_string(),
                event_ttl_secs: 300,
                retry_attempts: 2,
            },
            history: HistoryConfig {
                lookback_secs: 12 * 60 * 60,
                log_history: false,
            },
            orgs: Vec::new(),
            forward_rules: Vec::new(),
            oauth: None,
        });

        let registry = Arc::new(ClientRegistry::new(
            shared_connector().unwrap(),
            TokenStore::new(dir.path().join("tokens.json")),
            2,
        ));
        let resolver = Arc::new(ChannelResolver::new());
        let forwarder = Arc::new(Forwarder::new(
            Vec::new(),
            registry.clone(),
            resolver.clone(),
        ));
        let state = AppState {
            settings,
            registry,
            resolver,
            deduper: Arc::new(EventDeduper::new(Duration::from_secs(300))),
            forwarder,
        };
        (create_router(state), dir)
    }

    fn signed_request(body: &str) -> Request<Body> {
        let timestamp = "1700000000";
        let signature = verify::sign(SECRET, timestamp, body);
        Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header("content-type", "application/json")
            .header(TIMESTAMP_HEADER, timestamp)
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_url_verification_echoes_challenge() {
        let (app, _dir) = test_router();
        let body = r#"{"type":"url_verification","challenge":"chal-42"}"#;

        let response = app.oneshot(signed_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["challenge"], "chal-42");
    }

    #[tokio::test]
    async fn test_invalid_signature_is_forbidden() {
        let (app, _dir) = test_router();
        let body = r#"{"type":"url_verification","challenge":"chal-42"}"#;

        let request = Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header(TIMESTAMP_HEADER, "1700000000")
            .header(SIGNATURE_HEADER, "v0=deadbeef")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_missing_signature_is_forbidden() {
        let (app, _dir) = test_router();
        let request = Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header(TIMESTAMP_HEADER, "1700000000")
            .body(Body::from("{}".to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_missing_team_id_is_bad_request() {
        let (app, _dir) = test_router();
        let body = r#"{"type":"event_callback","event_id":"Ev1"}"#;
        let response = app.oneshot(signed_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_workspace_is_acknowledged() {
        let (app, _dir) = test_router();
        let body = r#"{"type":"event_callback","team_id":"T-unknown","event_id":"Ev1"}"#;
        let response = app.oneshot(signed_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["ignored"], "unknown_team");
    }

    #[tokio::test]
    async fn test_replay_within_ttl_is_marked_duplicate() {
        let (app, _dir) = test_router();
        let body = r#"{"type":"event_callback","team_id":"T-unknown","event_id":"Ev-replay"}"#;

        let response = app.clone().oneshot(signed_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let first = body_json(response).await;
        assert_eq!(first["ok"], true);
        assert!(first.get("duplicate").is_none());

        // Same event id again: still a success acknowledgment, flagged as a
        // duplicate and short-circuited before workspace routing.
        let response = app.oneshot(signed_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let second = body_json(response).await;
        assert_eq!(second["ok"], true);
        assert_eq!(second["duplicate"], true);
    }

    #[tokio::test]
    async fn test_empty_body_is_bad_request() {
        let (app, _dir) = test_router();
        let timestamp = "1700000000";
        let request = Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header(TIMESTAMP_HEADER, timestamp)
            .header(SIGNATURE_HEADER, verify::sign(SECRET, timestamp, ""))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
