//! Rule-driven cross-workspace message forwarding.

use crate::error::Result;
use crate::registry::ClientRegistry;
use crate::resolver::ChannelResolver;
use crate::slack::{ChannelId, MessageEvent, SlackClient, TeamId};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A static directive relaying messages from one workspace's channel into
/// another workspace's channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRule {
    pub source_team: TeamId,
    pub source_channel: String,
    pub target_team: TeamId,
    pub target_channel: String,
}

/// A rule plus its lazily resolved channel ids.
///
/// The two slots are filled independently on first use and kept for the
/// process lifetime; a channel rename upstream requires a restart.
struct RuleState {
    rule: ForwardRule,
    source_id: RwLock<Option<ChannelId>>,
    target_id: RwLock<Option<ChannelId>>,
}

pub struct Forwarder {
    rules: Vec<RuleState>,
    registry: Arc<ClientRegistry>,
    resolver: Arc<ChannelResolver>,
}

impl Forwarder {
    pub fn new(
        rules: Vec<ForwardRule>,
        registry: Arc<ClientRegistry>,
        resolver: Arc<ChannelResolver>,
    ) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| RuleState {
                rule,
                source_id: RwLock::new(None),
                target_id: RwLock::new(None),
            })
            .collect();
        Self {
            rules,
            registry,
            resolver,
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Relay a message event through every matching rule.
    ///
    /// Rules are applied independently: one rule's resolution or send
    /// failure is logged and the remaining rules still run.
    pub async fn maybe_forward(&self, team_id: &TeamId, client: &SlackClient, event: &MessageEvent) {
        if !event.is_genuine_message() {
            return;
        }
        let Some(event_channel) = event.channel.as_ref() else {
            return;
        };

        for state in self.rules.iter().filter(|s| &s.rule.source_team == team_id) {
            if let Err(e) = self.apply_rule(state, client, event, event_channel).await {
                tracing::error!(
                    source_team = %state.rule.source_team,
                    source_channel = %state.rule.source_channel,
                    error = %e,
                    "Failed to forward message"
                );
            }
        }
    }

    async fn apply_rule(
        &self,
        state: &RuleState,
        client: &SlackClient,
        event: &MessageEvent,
        event_channel: &ChannelId,
    ) -> Result<()> {
        let source_id = self
            .ensure_channel(
                &state.source_id,
                &state.rule.source_team,
                &state.rule.source_channel,
            )
            .await?;
        let target_id = self
            .ensure_channel(
                &state.target_id,
                &state.rule.target_team,
                &state.rule.target_channel,
            )
            .await?;

        if event_channel != &source_id {
            return Ok(());
        }

        let target_client = self.registry.resolve(&state.rule.target_team)?;
        let author = self.author_label(client, event).await;
        let text = event.text.as_deref().unwrap_or_default();
        let outbound = compose_outbound(&state.rule.source_channel, &author, text);

        target_client
            .post_message(&target_id, &outbound, None)
            .await?;

        let source = format!("{}#{}", state.rule.source_team, state.rule.source_channel);
        let target = format!("{}#{}", state.rule.target_team, state.rule.target_channel);
        tracing::info!(
            ts = event.ts.as_ref().map(|t| t.as_str()).unwrap_or_default(),
            source = %source,
            target = %target,
            "Forwarded message"
        );
        Ok(())
    }

    /// Read a rule's channel-id slot, resolving and filling it on first use.
    async fn ensure_channel(
        &self,
        slot: &RwLock<Option<ChannelId>>,
        team_id: &TeamId,
        name: &str,
    ) -> Result<ChannelId> {
        if let Some(id) = slot.read().await.clone() {
            return Ok(id);
        }
        let client = self.registry.resolve(team_id)?;
        let id = self.resolver.resolve(&client, team_id, name).await?;
        *slot.write().await = Some(id.clone());
        Ok(id)
    }

    async fn author_label(&self, client: &SlackClient, event: &MessageEvent) -> String {
        match event.user.as_ref() {
            Some(user) => match client.get_user_info(user).await {
                Ok(info) => info.label().to_string(),
                Err(e) => {
                    tracing::warn!(
                        user_id = %user.as_str(),
                        error = %e,
                        "Could not fetch author profile, using id"
                    );
                    user.as_str().to_string()
                }
            },
            None => "Slack App".to_string(),
        }
    }
}

fn compose_outbound(source_channel: &str, author: &str, text: &str) -> String {
    format!("[{source_channel}] {author}: {text}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MirrorError;
    use crate::slack::shared_connector;
    use crate::storage::TokenStore;

    fn rule(source_team: &str, source_channel: &str, target_team: &str) -> ForwardRule {
        ForwardRule {
            source_team: TeamId::new(source_team),
            source_channel: source_channel.to_string(),
            target_team: TeamId::new(target_team),
            target_channel: "mirror".to_string(),
        }
    }

    fn fixture(rules: Vec<ForwardRule>) -> (Forwarder, Arc<ClientRegistry>, tempfile::TempDir) {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        let mut registry = ClientRegistry::new(shared_connector().unwrap(), store, 2);
        registry.register_static(TeamId::new("T-src"), "xoxp-src");
        let registry = Arc::new(registry);
        let resolver = Arc::new(ChannelResolver::new());
        let forwarder = Forwarder::new(rules, registry.clone(), resolver);
        (forwarder, registry, dir)
    }

    #[test]
    fn test_compose_outbound() {
        assert_eq!(
            compose_outbound("test-channel", "Ada Lovelace", "hello"),
            "[test-channel] Ada Lovelace: hello"
        );
    }

    #[tokio::test]
    async fn test_bot_and_foreign_events_are_ignored() {
        let (forwarder, registry, _dir) = fixture(vec![rule("T-src", "general", "T-dst")]);
        let client = registry.resolve(&TeamId::new("T-src")).unwrap();

        let bot_event = MessageEvent {
            kind: "message".to_string(),
            bot_id: Some("B1".to_string()),
            channel: Some(ChannelId::new("C1")),
            ..Default::default()
        };
        // Returns without touching any rule slot or the network.
        forwarder
            .maybe_forward(&TeamId::new("T-src"), &client, &bot_event)
            .await;

        let non_message = MessageEvent {
            kind: "reaction_added".to_string(),
            channel: Some(ChannelId::new("C1")),
            ..Default::default()
        };
        forwarder
            .maybe_forward(&TeamId::new("T-src"), &client, &non_message)
            .await;
    }

    #[tokio::test]
    async fn test_unknown_target_workspace_fails_rule() {
        let (forwarder, registry, _dir) = fixture(vec![rule("T-src", "general", "T-unknown")]);
        let client = registry.resolve(&TeamId::new("T-src")).unwrap();

        // Seed the source slot path so the failure is the target lookup.
        forwarder.resolver.seed(
            TeamId::new("T-src"),
            "general",
            ChannelId::new("C-general"),
        );

        let event = MessageEvent {
            kind: "message".to_string(),
            user: Some(crate::slack::UserId::new("U1")),
            channel: Some(ChannelId::new("C-general")),
            text: Some("hi".to_string()),
            ..Default::default()
        };

        let state = &forwarder.rules[0];
        let err = forwarder
            .apply_rule(state, &client, &event, event.channel.as_ref().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::UnknownWorkspace(_)));

        // The engine as a whole swallows the failure and keeps going.
        forwarder
            .maybe_forward(&TeamId::new("T-src"), &client, &event)
            .await;
    }

    #[tokio::test]
    async fn test_failed_rule_does_not_block_later_rules() {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        let mut registry = ClientRegistry::new(shared_connector().unwrap(), store, 2);
        registry.register_static(TeamId::new("T-src"), "xoxp-src");
        registry.register_static(TeamId::new("T-dst"), "xoxp-dst");
        let registry = Arc::new(registry);
        let resolver = Arc::new(ChannelResolver::new());

        // Rule 1 targets a workspace the registry does not know, so it fails
        // during target resolution. Rule 2 is fully resolvable from the
        // seeded cache.
        let bad = rule("T-src", "general", "T-unknown");
        let good = ForwardRule {
            source_team: TeamId::new("T-src"),
            source_channel: "alerts".to_string(),
            target_team: TeamId::new("T-dst"),
            target_channel: "mirror".to_string(),
        };
        resolver.seed(TeamId::new("T-src"), "general", ChannelId::new("C-general"));
        resolver.seed(TeamId::new("T-src"), "alerts", ChannelId::new("C-alerts"));
        resolver.seed(TeamId::new("T-dst"), "mirror", ChannelId::new("C-mirror"));

        let forwarder = Forwarder::new(vec![bad, good], registry.clone(), resolver);
        let client = registry.resolve(&TeamId::new("T-src")).unwrap();

        let event = MessageEvent {
            kind: "message".to_string(),
            user: Some(crate::slack::UserId::new("U1")),
            channel: Some(ChannelId::new("C-general")),
            text: Some("hi".to_string()),
            ..Default::default()
        };
        forwarder
            .maybe_forward(&TeamId::new("T-src"), &client, &event)
            .await;

        // Rule 1 died resolving its target, but rule 2 was still evaluated:
        // both of its channel slots got filled from the cache.
        assert!(forwarder.rules[0].target_id.read().await.is_none());
        assert_eq!(
            forwarder.rules[1].source_id.read().await.clone(),
            Some(ChannelId::new("C-alerts"))
        );
        assert!(forwarder.rules[1].target_id.read().await.is_some());
    }

    #[tokio::test]
    async fn test_rules_for_other_teams_are_skipped() {
        let (forwarder, registry, _dir) = fixture(vec![rule("T-other", "general", "T-dst")]);
        let client = registry.resolve(&TeamId::new("T-src")).unwrap();

        let event = MessageEvent {
            kind: "message".to_string(),
            channel: Some(ChannelId::new("C1")),
            ..Default::default()
        };
        // No rule matches the origin team, so nothing is resolved or sent.
        forwarder
            .maybe_forward(&TeamId::new("T-src"), &client, &event)
            .await;
        assert!(forwarder.rules[0].source_id.read().await.is_none());
    }
}
