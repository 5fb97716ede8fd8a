//! Read-model endpoints consumed by the frontend, plus `/reply`.
//!
//! These shape live Slack data into view payloads; nothing here is
//! persisted. History is always fetched upstream, windowed by the
//! configured lookback.

use crate::error::{MirrorError, Result};
use crate::http::AppState;
use crate::logging::Timer;
use crate::slack::{ChannelId, MessageTs, SlackClient, TeamId, ThreadTs, UserId};
use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use slack_morphism::prelude::{SlackConversationType, SlackHistoryMessage};
use std::collections::HashMap;

#[derive(Debug, Serialize)]
pub struct Organization {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub status: String,
    pub initials: String,
    pub accent: String,
}

#[derive(Debug, Serialize)]
pub struct ChatEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub org_id: String,
    pub name: String,
    pub path: String,
    pub owner: String,
    pub preview: String,
    #[serde(rename = "lastMessageAt")]
    pub last_message_at: String,
    pub unread: u64,
    pub team_id: String,
}

#[derive(Debug, Serialize)]
pub struct MessagePayload {
    pub id: String,
    pub chat_id: String,
    pub user: String,
    pub avatar: String,
    pub text: String,
    pub time: String,
    pub attachments: Vec<String>,
    pub reply_count: usize,
    pub thread_ts: String,
}

#[derive(Debug, Serialize)]
pub struct ThreadResponse {
    pub parent: Option<MessagePayload>,
    pub replies: Vec<MessagePayload>,
}

/// Per-request user-label cache so one listing does not re-fetch the same
/// author repeatedly.
type LabelCache = HashMap<String, (String, String)>;

pub async fn list_organizations(State(state): State<AppState>) -> Json<Vec<Organization>> {
    let orgs = state
        .settings
        .orgs
        .iter()
        .map(|org| Organization {
            id: org.id.clone(),
            team_id: org.team_id.as_str().to_string(),
            name: org.name.clone(),
            status: org.status.clone(),
            initials: org.initials.clone(),
            accent: org.accent.clone(),
        })
        .collect();
    Json(orgs)
}

pub async fn list_chats(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
) -> Result<Json<Vec<ChatEntry>>> {
    let _timer = Timer::new("list_chats");
    let org = state
        .settings
        .org_by_id(&org_id)
        .ok_or_else(|| MirrorError::UnknownWorkspace(org_id.clone()))?;
    let client = state.registry.resolve(&org.team_id)?;

    let channels = client
        .list_conversations(vec![
            SlackConversationType::Public,
            SlackConversationType::Private,
        ])
        .await?;
    let dms = client
        .list_conversations(vec![SlackConversationType::Im, SlackConversationType::Mpim])
        .await?;

    let mut labels = LabelCache::new();
    let mut chats = Vec::with_capacity(channels.len() + dms.len());
    for channel in channels {
        chats.push(build_chat_entry(&client, org, &channel, "channel", &mut labels).await);
    }
    for dm in dms {
        chats.push(build_chat_entry(&client, org, &dm, "dm", &mut labels).await);
    }
    Ok(Json(chats))
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub org_id: Option<String>,
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<MessagePayload>>> {
    let _timer = Timer::new("list_messages");
    let org_id = query
        .org_id
        .ok_or_else(|| MirrorError::BadRequest("org_id is required".to_string()))?;
    let org = state
        .settings
        .org_by_id(&org_id)
        .ok_or_else(|| MirrorError::UnknownWorkspace(org_id.clone()))?;
    let client = state.registry.resolve(&org.team_id)?;

    let oldest = chrono::Utc::now().timestamp() - state.settings.history.lookback_secs as i64;
    let oldest = MessageTs::new(oldest.to_string());
    let channel = ChannelId::new(chat_id.clone());
    let raw = client.fetch_history(&channel, 40, Some(&oldest)).await?;

    // Slack returns newest first; the UI wants oldest first.
    let mut labels = LabelCache::new();
    let mut payloads = Vec::with_capacity(raw.len());
    for message in raw.iter().rev() {
        payloads.push(build_message_payload(&client, message, &chat_id, &mut labels).await);
    }
    Ok(Json(payloads))
}

#[derive(Debug, Deserialize)]
pub struct ThreadQuery {
    pub org_id: Option<String>,
    pub thread_ts: Option<String>,
}

pub async fn get_thread(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(query): Query<ThreadQuery>,
) -> Result<Json<ThreadResponse>> {
    let _timer = Timer::new("get_thread");
    let (Some(org_id), Some(thread_ts)) = (query.org_id, query.thread_ts) else {
        return Err(MirrorError::BadRequest(
            "org_id and thread_ts are required".to_string(),
        ));
    };
    let org = state
        .settings
        .org_by_id(&org_id)
        .ok_or_else(|| MirrorError::UnknownWorkspace(org_id.clone()))?;
    let client = state.registry.resolve(&org.team_id)?;

    let channel = ChannelId::new(chat_id.clone());
    let messages = client
        .fetch_replies(&channel, &ThreadTs::new(thread_ts), 40)
        .await?;

    let mut labels = LabelCache::new();
    let mut iter = messages.iter();
    let parent = match iter.next() {
        Some(message) => Some(build_message_payload(&client, message, &chat_id, &mut labels).await),
        None => None,
    };
    let mut replies = Vec::new();
    for message in iter {
        replies.push(build_message_payload(&client, message, &chat_id, &mut labels).await);
    }
    Ok(Json(ThreadResponse { parent, replies }))
}

#[derive(Debug, Deserialize)]
pub struct ReplyPayload {
    pub team_id: Option<String>,
    pub channel: Option<String>,
    pub text: Option<String>,
    pub thread_ts: Option<String>,
}

pub async fn send_reply(
    State(state): State<AppState>,
    Json(payload): Json<ReplyPayload>,
) -> Result<Json<serde_json::Value>> {
    let _timer = Timer::new("send_reply");
    let (Some(team_id), Some(channel), Some(text)) =
        (payload.team_id, payload.channel, payload.text)
    else {
        return Err(MirrorError::BadRequest(
            "team_id, channel, and text are required".to_string(),
        ));
    };

    let team_id = TeamId::new(team_id);
    let client = state.registry.resolve(&team_id)?;
    let channel = ChannelId::new(channel);
    let thread_ts = payload.thread_ts.map(ThreadTs::new);

    let ts = client
        .post_message(&channel, &text, thread_ts.as_ref())
        .await?;

    tracing::info!(
        team_id = %team_id,
        channel = %channel.as_str(),
        ts = %ts.as_str(),
        text = %text,
        "Outbound message"
    );
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn build_chat_entry(
    client: &SlackClient,
    org: &crate::config::OrgConfig,
    channel: &slack_morphism::prelude::SlackChannelInfo,
    chat_type: &str,
    labels: &mut LabelCache,
) -> ChatEntry {
    let (chat_name, path_type) = if chat_type == "dm" {
        let owner_id = channel.creator.as_ref().map(|u| u.to_string());
        let (name, _initials) = user_label(client, owner_id.as_deref(), labels).await;
        (name, "Direct messages")
    } else {
        let name = channel
            .name
            .clone()
            .or_else(|| channel.topic.as_ref().map(|t| t.value.clone()))
            .unwrap_or_else(|| "Channel".to_string());
        (name, "Channels")
    };

    // conversations.list carries no latest message or unread counters, so
    // the listing shows placeholders for those fields.
    ChatEntry {
        id: channel.id.to_string(),
        chat_type: chat_type.to_string(),
        org_id: org.id.clone(),
        name: chat_name.clone(),
        path: format!("{} / {} / {}", org.name, path_type, chat_name),
        owner: chat_name,
        preview: "No messages yet".to_string(),
        last_message_at: String::new(),
        unread: 0,
        team_id: org.team_id.as_str().to_string(),
    }
}

async fn build_message_payload(
    client: &SlackClient,
    message: &SlackHistoryMessage,
    chat_id: &str,
    labels: &mut LabelCache,
) -> MessagePayload {
    let sender_id = message
        .sender
        .user
        .as_ref()
        .map(|u| u.to_string())
        .or_else(|| message.sender.bot_id.as_ref().map(|b| b.to_string()));
    let (user, avatar) = user_label(client, sender_id.as_deref(), labels).await;

    let attachments = message
        .content
        .files
        .as_ref()
        .map(|files| {
            files
                .iter()
                .map(|file| {
                    file.name
                        .clone()
                        .or_else(|| file.title.clone())
                        .unwrap_or_else(|| "attachment".to_string())
                })
                .collect()
        })
        .unwrap_or_default();

    let ts = message.origin.ts.to_string();
    MessagePayload {
        id: ts.clone(),
        chat_id: chat_id.to_string(),
        user,
        avatar,
        text: message.content.text.clone().unwrap_or_default(),
        time: format_clock_time(&ts),
        attachments,
        reply_count: message.parent.reply_count.map(|c| c as usize).unwrap_or(0),
        thread_ts: message
            .origin
            .thread_ts
            .as_ref()
            .map(|t| t.to_string())
            .unwrap_or(ts),
    }
}

/// Resolve a display label and avatar initial for a sender, with a
/// per-request cache. A missing sender id labels the message as the app.
async fn user_label(
    client: &SlackClient,
    user_id: Option<&str>,
    labels: &mut LabelCache,
) -> (String, String) {
    let Some(user_id) = user_id else {
        return ("Slack App".to_string(), "S".to_string());
    };
    if let Some(cached) = labels.get(user_id) {
        return cached.clone();
    }

    let name = match client.get_user_info(&UserId::new(user_id)).await {
        Ok(info) => info.label().to_string(),
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "User lookup failed");
            user_id.to_string()
        }
    };
    let initial = name
        .chars()
        .next()
        .map(|c| c.to_uppercase().to_string())
        .unwrap_or_else(|| "S".to_string());

    let label = (name, initial);
    labels.insert(user_id.to_string(), label.clone());
    label
}

/// Format a Slack timestamp as a local wall-clock time like `3:05 PM`.
/// Unparseable input is returned as-is.
fn format_clock_time(ts: &str) -> String {
    let Ok(seconds) = ts.parse::<f64>() else {
        return ts.to_string();
    };
    match Local.timestamp_opt(seconds as i64, 0) {
        chrono::LocalResult::Single(time) => time.format("%-I:%M %p").to_string(),
        _ => ts.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clock_time_passthrough_on_garbage() {
        assert_eq!(format_clock_time("not-a-ts"), "not-a-ts");
    }

    #[test]
    fn test_format_clock_time_parses_slack_ts() {
        let formatted = format_clock_time("1700000000.000100");
        assert!(formatted.contains(':'));
        assert!(formatted.ends_with("AM") || formatted.ends_with("PM"));
    }

    #[tokio::test]
    async fn test_dm_entry_is_named_after_counterpart() {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let client = SlackClient::new("xoxp-invalid").unwrap();

        let org = crate::config::OrgConfig {
            id: "rtc".to_string(),
            team_id: TeamId::new("T0RTC"),
            name: "RTC League".to_string(),
            status: "Active workspace".to_string(),
            initials: "RL".to_string(),
            accent: "#8E6CF5".to_string(),
            user_token: "xoxp-rtc".to_string(),
            bot_token: None,
        };
        let channel: slack_morphism::prelude::SlackChannelInfo = serde_json::from_value(
            serde_json::json!({
                "id": "D1",
                "created": 1_700_000_000,
                "creator": "U9",
                "is_im": true
            }),
        )
        .unwrap();

        // Pre-warmed label cache, so the lookup never leaves the process.
        let mut labels = LabelCache::new();
        labels.insert("U9".to_string(), ("Ada Lovelace".to_string(), "A".to_string()));

        let entry = build_chat_entry(&client, &org, &channel, "dm", &mut labels).await;
        assert_eq!(entry.chat_type, "dm");
        assert_eq!(entry.name, "Ada Lovelace");
        assert_eq!(entry.path, "RTC League / Direct messages / Ada Lovelace");
        assert_eq!(entry.team_id, "T0RTC");
    }

    #[tokio::test]
    async fn test_user_label_falls_back_and_caches() {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let client = SlackClient::new("xoxp-invalid").unwrap();
        let mut labels = LabelCache::new();

        // No sender id: attributed to the app.
        let (name, initial) = user_label(&client, None, &mut labels).await;
        assert_eq!(name, "Slack App");
        assert_eq!(initial, "S");

        // Lookup fails offline, so the raw id is the label; the fallback is
        // cached like any other label.
        let (name, initial) = user_label(&client, Some("U123"), &mut labels).await;
        assert_eq!(name, "U123");
        assert_eq!(initial, "U");
        assert!(labels.contains_key("U123"));
    }
}
