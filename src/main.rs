use slack_mirror::config::load_settings;
use slack_mirror::dedup::EventDeduper;
use slack_mirror::forward::Forwarder;
use slack_mirror::http::{AppState, create_router};
use slack_mirror::registry::ClientRegistry;
use slack_mirror::resolver::ChannelResolver;
use slack_mirror::slack::shared_connector;
use slack_mirror::storage::TokenStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize rustls crypto provider
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("slack_mirror=debug,tower_http=info")),
        )
        .with_target(true)
        .with_line_number(true)
        .init();

    tracing::info!("Starting Slack mirror backend");

    let settings = Arc::new(load_settings()?);
    tracing::info!(
        org_count = settings.orgs.len(),
        rule_count = settings.forward_rules.len(),
        oauth_enabled = settings.oauth.is_some(),
        "Configuration loaded"
    );

    let connector = shared_connector()?;
    let store = TokenStore::new(settings.server.tokens_file.clone());

    let mut registry = ClientRegistry::new(connector, store, settings.slack.retry_attempts);
    for org in &settings.orgs {
        registry.register_static(org.team_id.clone(), org.user_token.clone());
        tracing::info!(org = %org.id, team_id = %org.team_id, "Registered static workspace");
    }
    let registry = Arc::new(registry);

    // Persisted installs must be visible before any webhook traffic lands.
    registry.load_from_store().await?;

    let resolver = Arc::new(ChannelResolver::new());
    let deduper = Arc::new(EventDeduper::new(Duration::from_secs(
        settings.slack.event_ttl_secs,
    )));
    let forwarder = Arc::new(Forwarder::new(
        settings.forward_rules.clone(),
        registry.clone(),
        resolver.clone(),
    ));
    tracing::info!(rule_count = forwarder.rule_count(), "Forwarding engine ready");

    let state = AppState {
        settings: settings.clone(),
        registry,
        resolver,
        deduper,
        forwarder,
    };
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Slack mirror backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve on SIGINT (Ctrl+C) or SIGTERM on Unix; Ctrl+C elsewhere.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down"),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        tracing::info!("Received Ctrl+C, shutting down");
    }
}
