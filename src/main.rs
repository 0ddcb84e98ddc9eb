//! TutorLink real-time session server.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tutorlink_session::auth::AllowAll;
use tutorlink_session::config::Config;
use tutorlink_session::server;
use tutorlink_session::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Booking membership is checked upstream; the server itself admits any
    // verified identity the gateway lets through.
    let state = Arc::new(AppState::new(config, Arc::new(AllowAll)));
    server::run(state).await
}
