//! Diagnostic pass-through endpoints for inspecting upstream state.

use crate::error::Result;
use crate::http::AppState;
use crate::slack::{ChannelId, ChannelInfo, TeamId, TeamInfo, UserId, UserInfo};
use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::json;

pub async fn show_user(
    State(state): State<AppState>,
    Path((team_id, user_id)): Path<(String, String)>,
) -> Result<Json<UserInfo>> {
    let team_id = TeamId::new(team_id);
    let client = state.registry.resolve(&team_id)?;
    let info = client.get_user_info(&UserId::new(user_id)).await?;
    tracing::info!(
        team_id = %team_id,
        user_id = %info.id,
        user = %info.label(),
        email = info.email.as_deref().unwrap_or_default(),
        "User information"
    );
    Ok(Json(info))
}

pub async fn show_channel(
    State(state): State<AppState>,
    Path((team_id, channel_id)): Path<(String, String)>,
) -> Result<Json<ChannelInfo>> {
    let team_id = TeamId::new(team_id);
    let client = state.registry.resolve(&team_id)?;
    let info = client.get_channel_info(&ChannelId::new(channel_id)).await?;
    tracing::info!(
        team_id = %team_id,
        channel_id = %info.id,
        channel = info.name.as_deref().unwrap_or_default(),
        is_private = info.is_private,
        is_dm = info.is_dm,
        "Channel information"
    );
    Ok(Json(info))
}

pub async fn show_workspace(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> Result<Json<TeamInfo>> {
    let team_id = TeamId::new(team_id);
    let client = state.registry.resolve(&team_id)?;
    let info = client.get_team_info().await?;
    tracing::info!(
        team_id = %team_id,
        workspace_id = %info.id,
        workspace = info.name.as_deref().unwrap_or_default(),
        domain = info.domain.as_deref().unwrap_or_default(),
        "Workspace information"
    );
    Ok(Json(info))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u16>,
}

pub async fn show_history(
    State(state): State<AppState>,
    Path((team_id, channel_id)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>> {
    let team_id = TeamId::new(team_id);
    let client = state.registry.resolve(&team_id)?;
    let limit = query.limit.unwrap_or(50);
    let messages = client
        .fetch_history(&ChannelId::new(channel_id.clone()), limit, None)
        .await?;
    tracing::info!(
        team_id = %team_id,
        channel_id = %channel_id,
        message_count = messages.len(),
        "Message history"
    );
    Ok(Json(json!({ "messages": messages })))
}
