//! OAuth v2 install completion.
//!
//! Slack redirects here with a short-lived code; exchanging it yields the
//! workspace tokens that register the install with the credential registry.

use crate::error::{MirrorError, Result};
use crate::http::AppState;
use crate::slack::TeamId;
use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::json;

const OAUTH_ACCESS_URL: &str = "https://slack.com/api/oauth.v2.access";

#[derive(Debug, Deserialize)]
pub struct OAuthQuery {
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthAccessResponse {
    ok: bool,
    error: Option<String>,
    /// The bot token (`xoxb-...`).
    access_token: Option<String>,
    team: Option<OAuthTeam>,
    authed_user: Option<OAuthAuthedUser>,
}

#[derive(Debug, Deserialize)]
struct OAuthTeam {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthAuthedUser {
    /// The user token (`xoxp-...`).
    access_token: Option<String>,
}

pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<OAuthQuery>,
) -> Result<Json<serde_json::Value>> {
    let oauth = state
        .settings
        .oauth
        .as_ref()
        .ok_or_else(|| MirrorError::Config("OAuth install is not configured".to_string()))?;

    let code = query
        .code
        .ok_or_else(|| MirrorError::BadRequest("Authorization code is missing".to_string()))?;

    let response = reqwest::Client::new()
        .post(OAUTH_ACCESS_URL)
        .query(&[
            ("client_id", oauth.client_id.as_str()),
            ("client_secret", oauth.client_secret.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", oauth.redirect_uri.as_str()),
        ])
        .send()
        .await
        .map_err(|e| MirrorError::ServiceUnavailable(format!("OAuth exchange failed: {e}")))?
        .json::<OAuthAccessResponse>()
        .await
        .map_err(|e| MirrorError::ServiceUnavailable(format!("OAuth response malformed: {e}")))?;

    if !response.ok {
        let reason = response.error.unwrap_or_else(|| "unknown".to_string());
        tracing::error!(error = %reason, "Slack OAuth rejected the code exchange");
        return Err(MirrorError::BadRequest(format!("OAuth failed: {reason}")));
    }

    let team_id = response.team.and_then(|t| t.id);
    let bot_token = response.access_token;
    let user_token = response.authed_user.and_then(|u| u.access_token);

    let Some(team_id) = team_id else {
        return Err(MirrorError::Internal(
            "Invalid Slack OAuth response".to_string(),
        ));
    };
    if bot_token.is_none() && user_token.is_none() {
        return Err(MirrorError::Internal(
            "Invalid Slack OAuth response".to_string(),
        ));
    }

    let team_id = TeamId::new(team_id);
    state
        .registry
        .install(team_id.clone(), bot_token, user_token, true)
        .await;
    tracing::info!(team_id = %team_id, "App installed via OAuth");

    Ok(Json(json!({
        "ok": true,
        "message": "App installed successfully",
        "team_id": team_id.as_str(),
    })))
}
