pub mod client;
pub mod types;
pub mod verify;

pub use client::{SlackClient, shared_connector};
pub use types::{
    ChannelId, ChannelInfo, EventEnvelope, MessageEvent, MessageTs, TeamId, TeamInfo, ThreadTs,
    UserId, UserInfo,
};
