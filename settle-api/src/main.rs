use settle_api::{app, AppState, AuthConfig};
use settle_core::{SystemClock, UuidGenerator};
use settle_order::{Collaborators, OrderOrchestrator, SandboxPaymentGateway};
use settle_store::app_config::Config;
use settle_store::{DbClient, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "settle_api=debug,settle_order=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("Starting Settle API on port {}", config.server.port);

    // Database Connection
    let db = DbClient::new(&config.database.url, config.database.max_connections).await?;
    db.migrate().await?;

    // Redis Connection
    let redis = RedisClient::new(&config.redis.url).await?;
    redis.ping().await?;

    let orchestrator = OrderOrchestrator::new(
        Collaborators {
            repository: Arc::new(db.order_repository()),
            transactions: Arc::new(db.transaction_runner()),
            gateway: Arc::new(SandboxPaymentGateway::new()),
            lock: Arc::new(redis),
            clock: Arc::new(SystemClock),
            ids: Some(Arc::new(UuidGenerator)),
        },
        config.payments.to_policy(),
    );

    let app_state = AppState {
        orchestrator: Arc::new(orchestrator),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            admin_role: config.auth.admin_role.clone(),
        },
        request_timeout: Duration::from_millis(config.server.request_timeout_ms),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
