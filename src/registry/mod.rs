//! Credential registry: one client handle per workspace.
//!
//! Statically configured workspaces are registered at startup and are
//! checked first on lookup; OAuth-installed workspaces are layered behind
//! them and survive restarts through the token store.

use crate::error::{MirrorError, Result};
use crate::slack::{SlackClient, TeamId};
use crate::storage::{StoredCredential, TokenStore};
use dashmap::DashMap;
use slack_morphism::prelude::SlackHyperClient;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A workspace's tokens as held in memory.
#[derive(Debug, Clone)]
pub struct WorkspaceCredential {
    pub bot_token: Option<String>,
    pub user_token: Option<String>,
}

impl WorkspaceCredential {
    /// The token used for API calls. User tokens carry broader scopes, so
    /// one is preferred over a bot token whenever both are present.
    pub fn preferred(&self) -> Option<&str> {
        self.user_token.as_deref().or(self.bot_token.as_deref())
    }
}

pub struct ClientRegistry {
    connector: Arc<SlackHyperClient>,
    retry_attempts: u32,
    statics: HashMap<TeamId, Arc<SlackClient>>,
    dynamic: DashMap<TeamId, Arc<SlackClient>>,
    /// Dynamically installed credentials, the set rewritten to the store.
    /// The mutex makes each install's read-modify-write of the persisted
    /// collection atomic.
    credentials: Mutex<BTreeMap<TeamId, StoredCredential>>,
    store: TokenStore,
}

impl ClientRegistry {
    pub fn new(connector: Arc<SlackHyperClient>, store: TokenStore, retry_attempts: u32) -> Self {
        Self {
            connector,
            retry_attempts,
            statics: HashMap::new(),
            dynamic: DashMap::new(),
            credentials: Mutex::new(BTreeMap::new()),
            store,
        }
    }

    /// Register a statically configured workspace. Static entries are never
    /// persisted and always win over a dynamic install with the same id.
    pub fn register_static(&mut self, team_id: TeamId, token: impl Into<String>) {
        let client = Arc::new(SlackClient::with_connector(
            self.connector.clone(),
            token,
            self.retry_attempts,
        ));
        self.statics.insert(team_id, client);
    }

    /// Resolve the client handle for a workspace.
    pub fn resolve(&self, team_id: &TeamId) -> Result<Arc<SlackClient>> {
        if let Some(client) = self.statics.get(team_id) {
            return Ok(client.clone());
        }
        if let Some(client) = self.dynamic.get(team_id) {
            return Ok(client.clone());
        }
        Err(MirrorError::UnknownWorkspace(team_id.as_str().to_string()))
    }

    /// Record a workspace install, rebuild its client handle, and (unless
    /// suppressed for bulk load) rewrite the token store.
    ///
    /// A persistence failure is logged, never propagated: the in-memory
    /// registry stays authoritative for the running process.
    pub async fn install(
        &self,
        team_id: TeamId,
        bot_token: Option<String>,
        user_token: Option<String>,
        persist: bool,
    ) {
        let credential = WorkspaceCredential {
            bot_token: bot_token.clone(),
            user_token: user_token.clone(),
        };

        if let Some(token) = credential.preferred() {
            let client = Arc::new(SlackClient::with_connector(
                self.connector.clone(),
                token,
                self.retry_attempts,
            ));
            self.dynamic.insert(team_id.clone(), client);
        }

        let mut credentials = self.credentials.lock().await;
        credentials.insert(
            team_id.clone(),
            StoredCredential {
                bot_token,
                user_token,
            },
        );
        tracing::info!(team_id = %team_id, persist = persist, "Workspace installed");

        if persist {
            // Snapshot under the same lock so concurrent installs cannot
            // interleave their rewrites of the store file.
            if let Err(e) = self.store.save(&credentials).await {
                tracing::error!(error = %e, "Failed to persist workspace tokens");
            }
        }
    }

    /// Load persisted installs at startup, without re-triggering writes.
    pub async fn load_from_store(&self) -> Result<()> {
        let entries = self.store.load().await?;
        for (team_id, credential) in entries {
            self.install(team_id, credential.bot_token, credential.user_token, false)
                .await;
        }
        Ok(())
    }

    /// The in-memory credential for a dynamically installed workspace.
    pub async fn credential(&self, team_id: &TeamId) -> Option<WorkspaceCredential> {
        let credentials = self.credentials.lock().await;
        credentials.get(team_id).map(|c| WorkspaceCredential {
            bot_token: c.bot_token.clone(),
            user_token: c.user_token.clone(),
        })
    }

    pub fn static_team_ids(&self) -> Vec<TeamId> {
        self.statics.keys().cloned().collect()
    }
}
