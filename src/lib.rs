pub mod config;
pub mod dedup;
pub mod error;
pub mod forward;
pub mod http;
pub mod logging;
pub mod registry;
pub mod resolver;
pub mod slack;
pub mod storage;

pub use error::{MirrorError, Result};
