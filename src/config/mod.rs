pub mod settings;

pub use settings::{
    HistoryConfig, OAuthConfig, OrgConfig, ServerConfig, Settings, SlackConfig, load_settings,
    parse_forward_rules,
};
