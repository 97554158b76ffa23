use std::sync::Arc;

use tower_http::trace::TraceLayer;

use aicon::config::ServiceConfig;
use aicon::error::Result;
use aicon::store::{Database, LibSqlBackend};
use aicon::webhook::{WebhookState, webhook_routes};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServiceConfig::from_env()?;

    eprintln!("📞 Aicon v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhooks: http://0.0.0.0:{}/voice, /sms, /twilio", config.port);
    eprintln!("   Database: {}", config.db_path.display());
    match &config.onboarding_number {
        Some(number) => eprintln!("   Onboarding line: {number}"),
        None => eprintln!("   Onboarding line: (not configured)"),
    }

    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);

    let port = config.port;
    let app = webhook_routes(WebhookState::new(db, config)).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(port, "Webhook server started");
    axum::serve(listener, app).await?;

    Ok(())
}
