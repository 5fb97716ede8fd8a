use crate::error::{MirrorError, Result};
use crate::forward::ForwardRule;
use crate::slack::TeamId;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub slack: SlackConfig,
    pub history: HistoryConfig,
    pub orgs: Vec<OrgConfig>,
    pub forward_rules: Vec<ForwardRule>,
    pub oauth: Option<OAuthConfig>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub tokens_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub signing_secret: String,
    pub event_ttl_secs: u64,
    pub retry_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub lookback_secs: u64,
    pub log_history: bool,
}

/// A statically configured workspace plus the display metadata the read API
/// serves for it.
#[derive(Debug, Clone)]
pub struct OrgConfig {
    pub id: String,
    pub team_id: TeamId,
    pub name: String,
    pub status: String,
    pub initials: String,
    pub accent: String,
    pub user_token: String,
    pub bot_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl Settings {
    pub fn org_by_id(&self, org_id: &str) -> Option<&OrgConfig> {
        self.orgs.iter().find(|o| o.id == org_id)
    }

    pub fn org_by_team(&self, team_id: &TeamId) -> Option<&OrgConfig> {
        self.orgs.iter().find(|o| &o.team_id == team_id)
    }
}

pub fn load_settings() -> Result<Settings> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    load_settings_from(&|name| std::env::var(name).ok())
}

/// Load settings through an injectable variable lookup.
fn load_settings_from(get: &dyn Fn(&str) -> Option<String>) -> Result<Settings> {
    let require = |name: &str| {
        get(name).ok_or_else(|| MirrorError::Config(format!("{name} not set")))
    };

    let server = ServerConfig {
        port: get("PORT")
            .unwrap_or_else(|| "8000".to_string())
            .parse()
            .map_err(|_| MirrorError::Config("Invalid PORT".to_string()))?,
        tokens_file: get("TOKENS_FILE")
            .unwrap_or_else(|| "workspaceTokens.json".to_string())
            .into(),
    };

    let slack = SlackConfig {
        signing_secret: require("SLACK_SIGNING_SECRET")?,
        event_ttl_secs: get("EVENT_TTL_SECS")
            .unwrap_or_else(|| "300".to_string())
            .parse()
            .map_err(|_| MirrorError::Config("Invalid EVENT_TTL_SECS".to_string()))?,
        retry_attempts: get("UPSTREAM_RETRY_ATTEMPTS")
            .unwrap_or_else(|| "2".to_string())
            .parse()
            .map_err(|_| MirrorError::Config("Invalid UPSTREAM_RETRY_ATTEMPTS".to_string()))?,
    };

    let history = HistoryConfig {
        lookback_secs: get("HISTORY_LOOKBACK_SECS")
            .unwrap_or_else(|| (12 * 60 * 60).to_string())
            .parse()
            .map_err(|_| MirrorError::Config("Invalid HISTORY_LOOKBACK_SECS".to_string()))?,
        log_history: get("LOG_HISTORY")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false),
    };

    let org_ids = require("SLACK_WORKSPACES")?;
    let mut orgs = Vec::new();
    for org_id in org_ids.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        orgs.push(load_org(org_id, get)?);
    }
    if orgs.is_empty() {
        return Err(MirrorError::Config(
            "SLACK_WORKSPACES must name at least one workspace".to_string(),
        ));
    }

    let forward_rules = match get("FORWARD_RULES") {
        Some(raw) => parse_forward_rules(&raw)?,
        None => Vec::new(),
    };

    let oauth = match (
        get("SLACK_CLIENT_ID"),
        get("SLACK_CLIENT_SECRET"),
        get("REDIRECT_URI"),
    ) {
        (Some(client_id), Some(client_secret), Some(redirect_uri)) => Some(OAuthConfig {
            client_id,
            client_secret,
            redirect_uri,
        }),
        _ => None,
    };

    Ok(Settings {
        server,
        slack,
        history,
        orgs,
        forward_rules,
        oauth,
    })
}

fn load_org(org_id: &str, get: &dyn Fn(&str) -> Option<String>) -> Result<OrgConfig> {
    let suffix = org_id.to_uppercase().replace('-', "_");
    let require = |name: String| {
        get(&name).ok_or_else(|| MirrorError::Config(format!("{name} not set")))
    };

    let name = get(&format!("ORG_NAME_{suffix}")).unwrap_or_else(|| capitalize(org_id));
    let initials = get(&format!("ORG_INITIALS_{suffix}")).unwrap_or_else(|| derive_initials(&name));

    Ok(OrgConfig {
        id: org_id.to_string(),
        team_id: TeamId::new(require(format!("SLACK_TEAM_{suffix}"))?),
        status: get(&format!("ORG_STATUS_{suffix}"))
            .unwrap_or_else(|| "Active workspace".to_string()),
        accent: get(&format!("ORG_ACCENT_{suffix}")).unwrap_or_else(|| "#8E6CF5".to_string()),
        user_token: require(format!("SLACK_USER_TOKEN_{suffix}"))?,
        bot_token: get(&format!("SLACK_BOT_TOKEN_{suffix}")),
        name,
        initials,
    })
}

/// Parse the static forwarding table.
///
/// Format: `sourceTeam#sourceChannel->targetTeam#targetChannel`, entries
/// separated by `;`.
pub fn parse_forward_rules(raw: &str) -> Result<Vec<ForwardRule>> {
    let mut rules = Vec::new();
    for entry in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (source, target) = entry.split_once("->").ok_or_else(|| {
            MirrorError::Config(format!("Forward rule missing '->': {entry}"))
        })?;
        let parse_side = |side: &str| -> Result<(TeamId, String)> {
            let (team, channel) = side.trim().split_once('#').ok_or_else(|| {
                MirrorError::Config(format!("Forward rule side missing '#': {side}"))
            })?;
            if team.is_empty() || channel.is_empty() {
                return Err(MirrorError::Config(format!(
                    "Forward rule side is incomplete: {side}"
                )));
            }
            Ok((TeamId::new(team.trim()), channel.trim().to_string()))
        };
        let (source_team, source_channel) = parse_side(source)?;
        let (target_team, target_channel) = parse_side(target)?;
        rules.push(ForwardRule {
            source_team,
            source_channel,
            target_team,
            target_channel,
        });
    }
    Ok(rules)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn derive_initials(name: &str) -> String {
    let initials: String = name
        .split_whitespace()
        .take(2)
        .filter_map(|word| word.chars().next())
        .flat_map(|c| c.to_uppercase())
        .collect();
    if initials.is_empty() {
        "?".to_string()
    } else {
        initials
    }
}
