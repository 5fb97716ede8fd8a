pub mod api;
pub mod diag;
pub mod events;
pub mod oauth;

use crate::config::Settings;
use crate::dedup::EventDeduper;
use crate::forward::Forwarder;
use crate::registry::ClientRegistry;
use crate::resolver::ChannelResolver;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state, built once at startup and injected into every
/// handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<ClientRegistry>,
    pub resolver: Arc<ChannelResolver>,
    pub deduper: Arc<EventDeduper>,
    pub forwarder: Arc<Forwarder>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/organizations", get(api::list_organizations))
        .route("/api/orgs/{org_id}/chats", get(api::list_chats))
        .route("/api/chats/{chat_id}/messages", get(api::list_messages))
        .route("/api/chats/{chat_id}/thread", get(api::get_thread))
        .route("/reply", post(api::send_reply))
        .route("/slack/events", post(events::slack_events))
        .route("/oauth/callback", get(oauth::oauth_callback))
        .route("/test/user/{team_id}/{user_id}", get(diag::show_user))
        .route(
            "/test/channel/{team_id}/{channel_id}",
            get(diag::show_channel),
        )
        .route("/test/workspace/{team_id}", get(diag::show_workspace))
        .route(
            "/test/history/{team_id}/{channel_id}",
            get(diag::show_history),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
