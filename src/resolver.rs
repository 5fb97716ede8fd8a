//! Channel-name to channel-id resolution with a process-lifetime cache.

use crate::error::{MirrorError, Result};
use crate::slack::{ChannelId, SlackClient, TeamId};
use dashmap::DashMap;
use slack_morphism::prelude::SlackConversationType;

/// Resolves human-readable channel names to Slack channel ids.
///
/// The cache is append-only for the process lifetime: a cached id is never
/// invalidated, so a channel rename upstream requires a restart to pick up.
pub struct ChannelResolver {
    cache: DashMap<(TeamId, String), ChannelId>,
}

impl ChannelResolver {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Resolve `name` within the workspace, listing the channel directory on
    /// a cache miss.
    pub async fn resolve(
        &self,
        client: &SlackClient,
        team_id: &TeamId,
        name: &str,
    ) -> Result<ChannelId> {
        let key = (team_id.clone(), name.to_string());
        if let Some(cached) = self.cache.get(&key) {
            tracing::trace!(
                team_id = %team_id,
                channel = %name,
                channel_id = %cached.as_str(),
                "Channel cache hit"
            );
            return Ok(cached.clone());
        }

        tracing::debug!(
            team_id = %team_id,
            channel = %name,
            "Channel cache miss, listing workspace directory"
        );

        let channels = client
            .list_conversations(vec![
                SlackConversationType::Public,
                SlackConversationType::Private,
            ])
            .await?;

        let matched = channels
            .into_iter()
            .find(|c| c.name.as_deref() == Some(name))
            .ok_or_else(|| MirrorError::ChannelNotFound {
                team: team_id.as_str().to_string(),
                name: name.to_string(),
            })?;

        let channel_id = ChannelId::new(matched.id.to_string());
        self.cache.insert(key, channel_id.clone());
        tracing::info!(
            team_id = %team_id,
            channel = %name,
            channel_id = %channel_id.as_str(),
            "Resolved and cached channel id"
        );
        Ok(channel_id)
    }

    /// Seed a mapping directly, bypassing the directory listing.
    pub fn seed(&self, team_id: TeamId, name: impl Into<String>, channel_id: ChannelId) {
        self.cache.insert((team_id, name.into()), channel_id);
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

impl Default for ChannelResolver {
    fn default() -> Self {
        Self::new()
    }
}
