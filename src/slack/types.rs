use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(pub String);

impl TeamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTs(pub String);

impl MessageTs {
    pub fn new(ts: impl Into<String>) -> Self {
        Self(ts.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadTs(pub String);

impl ThreadTs {
    pub fn new(ts: impl Into<String>) -> Self {
        Self(ts.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Outer envelope of an Events API callback.
///
/// Only the fields the dispatcher routes on are modeled; everything else in
/// the payload is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub challenge: Option<String>,
    pub team_id: Option<TeamId>,
    pub event_id: Option<String>,
    pub event: Option<MessageEvent>,
}

/// Inner event of an Events API callback, as far as the mirror cares.
///
/// Slack delivers many event shapes through this field; unknown kinds
/// deserialize with `kind` set and the rest `None`, and are ignored
/// downstream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub subtype: Option<String>,
    pub user: Option<UserId>,
    pub bot_id: Option<String>,
    pub channel: Option<ChannelId>,
    pub text: Option<String>,
    pub ts: Option<MessageTs>,
    pub thread_ts: Option<ThreadTs>,
}

impl MessageEvent {
    /// A genuine user-authored message: `message` kind without a bot origin
    /// marker. Bot-authored messages are never relayed (loop prevention).
    pub fn is_genuine_message(&self) -> bool {
        self.kind == "message" && self.bot_id.is_none()
    }
}

/// User profile fields surfaced by the read API and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub is_bot: bool,
}

impl UserInfo {
    /// Best human-readable label for the user, falling back to the raw id.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.display_name.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Channel fields surfaced by the read API and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: Option<String>,
    pub is_private: bool,
    pub is_dm: bool,
    pub topic: Option<String>,
}

/// Workspace fields surfaced by diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct TeamInfo {
    pub id: String,
    pub name: Option<String>,
    pub domain: Option<String>,
}
