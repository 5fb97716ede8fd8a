use crate::error::Result;
use crate::slack::TeamId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;

/// One workspace's persisted tokens.
///
/// Field names stay camelCase on disk so the file is interchangeable with
/// earlier deployments of the token store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    #[serde(rename = "botToken", skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(rename = "userToken", skip_serializing_if = "Option::is_none")]
    pub user_token: Option<String>,
}

/// JSON-file store mapping team id to tokens.
///
/// Read once at startup; rewritten in full on every successful install.
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load all persisted credentials. A missing or unreadable file is an
    /// empty store and a malformed record is skipped with a warning; the
    /// token file can never prevent startup.
    pub async fn load(&self) -> Result<Vec<(TeamId, StoredCredential)>> {
        if fs::metadata(&self.path).await.is_err() {
            return Ok(Vec::new());
        }

        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not read workspace tokens, starting with an empty store"
                );
                return Ok(Vec::new());
            }
        };
        let parsed: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Workspace token file is not valid JSON, starting with an empty store"
                );
                return Ok(Vec::new());
            }
        };

        let mut entries = Vec::with_capacity(parsed.len());
        for (team_id, value) in parsed {
            match serde_json::from_value::<StoredCredential>(value) {
                Ok(credential) => entries.push((TeamId::new(team_id), credential)),
                Err(e) => {
                    tracing::warn!(
                        team_id = %team_id,
                        error = %e,
                        "Skipping malformed persisted credential"
                    );
                }
            }
        }

        if !entries.is_empty() {
            tracing::info!(
                team_count = entries.len(),
                path = %self.path.display(),
                "Loaded workspace tokens from disk"
            );
        }
        Ok(entries)
    }

    /// Rewrite the whole store with the given credential set.
    pub async fn save(&self, credentials: &BTreeMap<TeamId, StoredCredential>) -> Result<()> {
        let by_id: BTreeMap<&str, &StoredCredential> = credentials
            .iter()
            .map(|(team_id, credential)| (team_id.as_str(), credential))
            .collect();
        let serialized = serde_json::to_string_pretty(&by_id)?;
        fs::write(&self.path, serialized).await?;
        Ok(())
    }
}
