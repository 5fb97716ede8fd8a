use crate::error::{MirrorError, Result};
use crate::slack::{ChannelId, ChannelInfo, MessageTs, TeamInfo, ThreadTs, UserId, UserInfo};
use slack_morphism::prelude::*;
use std::sync::Arc;

/// Build the hyper connector shared by every workspace client.
///
/// One connector serves all workspaces; each `SlackClient` only differs in
/// the token bound to it.
pub fn shared_connector() -> Result<Arc<SlackHyperClient>> {
    let connector =
        SlackClientHyperConnector::new().map_err(|e| MirrorError::SlackApi(e.to_string()))?;
    Ok(Arc::new(slack_morphism::SlackClient::new(connector)))
}

/// An authenticated handle for one workspace.
///
/// Bound to exactly one token; rebuilt by the registry whenever the
/// workspace's credential is replaced.
pub struct SlackClient {
    client: Arc<SlackHyperClient>,
    token: SlackApiToken,
    retry_attempts: u32,
}

impl SlackClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Ok(Self::with_connector(shared_connector()?, token, 2))
    }

    pub fn with_connector(
        client: Arc<SlackHyperClient>,
        token: impl Into<String>,
        retry_attempts: u32,
    ) -> Self {
        Self {
            client,
            token: SlackApiToken::new(token.into().into()),
            retry_attempts: retry_attempts.max(1),
        }
    }

    /// Send a message to a channel, optionally inside a thread.
    pub async fn post_message(
        &self,
        channel: &ChannelId,
        text: &str,
        thread_ts: Option<&ThreadTs>,
    ) -> Result<MessageTs> {
        let session = self.client.open_session(&self.token);

        let mut request = SlackApiChatPostMessageRequest::new(
            channel.as_str().into(),
            SlackMessageContent::new().with_text(text.into()),
        );

        if let Some(ts) = thread_ts {
            request.thread_ts = Some(ts.as_str().into());
        }

        request.unfurl_links = Some(false);
        request.unfurl_media = Some(false);

        let response = session
            .chat_post_message(&request)
            .await
            .map_err(|e| MirrorError::SlackApi(e.to_string()))?;

        Ok(MessageTs::new(response.ts.to_string()))
    }

    /// Enumerate the workspace's channel directory.
    ///
    /// Pages are merged until Slack stops returning a next cursor. Each page
    /// fetch gets the configured retry budget before the listing surfaces as
    /// a retryable upstream failure.
    pub async fn list_conversations(
        &self,
        types: Vec<SlackConversationType>,
    ) -> Result<Vec<SlackChannelInfo>> {
        let session = self.client.open_session(&self.token);

        let mut channels = Vec::new();
        let mut cursor: Option<SlackCursorId> = None;

        loop {
            let mut request = SlackApiConversationsListRequest::new()
                .with_types(types.clone())
                .with_exclude_archived(true)
                .with_limit(200);
            if let Some(c) = cursor.clone() {
                request = request.with_cursor(c);
            }

            let mut last_err = None;
            let mut page = None;
            for attempt in 1..=self.retry_attempts {
                match session.conversations_list(&request).await {
                    Ok(response) => {
                        page = Some(response);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            attempt = attempt,
                            attempts = self.retry_attempts,
                            error = %e,
                            "Failed to list conversations"
                        );
                        last_err = Some(e);
                    }
                }
            }

            let Some(response) = page else {
                let err = last_err.map(|e| e.to_string()).unwrap_or_default();
                return Err(MirrorError::ServiceUnavailable(format!(
                    "Failed to load Slack conversations: {err}"
                )));
            };

            channels.extend(response.channels);

            cursor = response
                .response_metadata
                .and_then(|m| m.next_cursor)
                .filter(|c| !c.to_string().is_empty());
            if cursor.is_none() {
                break;
            }
        }

        tracing::debug!(channel_count = channels.len(), "Loaded channel directory");
        Ok(channels)
    }

    /// Fetch recent channel history, newest first, with the configured retry
    /// budget (default two attempts, no backoff).
    pub async fn fetch_history(
        &self,
        channel: &ChannelId,
        limit: u16,
        oldest: Option<&MessageTs>,
    ) -> Result<Vec<SlackHistoryMessage>> {
        let session = self.client.open_session(&self.token);

        let mut request = SlackApiConversationsHistoryRequest::new()
            .with_channel(channel.as_str().into())
            .with_limit(limit);
        if let Some(oldest) = oldest {
            request = request.with_oldest(oldest.as_str().into());
        }

        let mut last_err = String::new();
        for attempt in 1..=self.retry_attempts {
            match session.conversations_history(&request).await {
                Ok(response) => return Ok(response.messages),
                Err(e) => {
                    tracing::warn!(
                        channel = %channel.as_str(),
                        attempt = attempt,
                        attempts = self.retry_attempts,
                        error = %e,
                        "Failed to fetch history"
                    );
                    last_err = e.to_string();
                }
            }
        }

        Err(MirrorError::ServiceUnavailable(format!(
            "Failed to load Slack history: {last_err}"
        )))
    }

    /// Fetch a thread's parent and replies (inclusive of the parent).
    pub async fn fetch_replies(
        &self,
        channel: &ChannelId,
        thread_ts: &ThreadTs,
        limit: u16,
    ) -> Result<Vec<SlackHistoryMessage>> {
        let session = self.client.open_session(&self.token);

        let request =
            SlackApiConversationsRepliesRequest::new(channel.as_str().into(), thread_ts.as_str().into())
                .with_limit(limit)
                .with_inclusive(true);

        let response = session.conversations_replies(&request).await.map_err(|e| {
            MirrorError::ServiceUnavailable(format!("Failed to load thread replies: {e}"))
        })?;

        Ok(response.messages)
    }

    /// Get user profile information.
    pub async fn get_user_info(&self, user_id: &UserId) -> Result<UserInfo> {
        let session = self.client.open_session(&self.token);

        let request = SlackApiUsersInfoRequest::new(SlackUserId(user_id.as_str().to_string()));

        let response = session
            .users_info(&request)
            .await
            .map_err(|e| MirrorError::SlackApi(e.to_string()))?;

        let user = response.user;

        Ok(UserInfo {
            id: user.id.to_string(),
            name: user.real_name,
            display_name: user.profile.as_ref().and_then(|p| p.display_name.clone()),
            email: user
                .profile
                .as_ref()
                .and_then(|p| p.email.as_ref().map(|e| e.to_string())),
            is_bot: user.flags.is_bot.unwrap_or(false),
        })
    }

    /// Get channel information.
    pub async fn get_channel_info(&self, channel_id: &ChannelId) -> Result<ChannelInfo> {
        let session = self.client.open_session(&self.token);

        let request =
            SlackApiConversationsInfoRequest::new(SlackChannelId(channel_id.as_str().to_string()));

        let response = session
            .conversations_info(&request)
            .await
            .map_err(|e| MirrorError::SlackApi(e.to_string()))?;

        let channel = response.channel;

        Ok(ChannelInfo {
            id: channel.id.to_string(),
            name: channel.name,
            is_private: channel.flags.is_private.unwrap_or(false),
            is_dm: channel.flags.is_im.unwrap_or(false),
            topic: channel.topic.map(|t| t.value),
        })
    }

    /// Get workspace information.
    pub async fn get_team_info(&self) -> Result<TeamInfo> {
        let session = self.client.open_session(&self.token);

        let request = SlackApiTeamInfoRequest::new();

        let response = session
            .team_info(&request)
            .await
            .map_err(|e| MirrorError::SlackApi(e.to_string()))?;

        let team = response.team;

        Ok(TeamInfo {
            id: team.id.to_string(),
            name: team.name,
            domain: team.domain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_construction() {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let client = SlackClient::new("xoxp-test").unwrap();
        assert_eq!(client.retry_attempts, 2);

        let connector = shared_connector().unwrap();
        let client = SlackClient::with_connector(connector, "xoxb-test", 0);
        // A zero budget is clamped so every call gets at least one attempt.
        assert_eq!(client.retry_attempts, 1);
    }
}
