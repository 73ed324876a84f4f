use {
    market_core::{
        AppState,
        adapters::stripe::gateway::StripeGateway,
        config::Config,
        infra::{
            alerts::TracingAlertSink,
            postgres::{PgStore, schema_probe, session_auth::PgSessionAuth},
            rate_limit::FixedWindowLimiter,
            storage::HmacUrlSigner,
        },
        transport::http::router::router,
    },
    sqlx::postgres::PgPoolOptions,
    std::{sync::Arc, time::Duration},
    tokio::signal,
    tracing_subscriber::EnvFilter,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("invalid configuration");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");
    schema_probe::require_current(&pool)
        .await
        .expect("database schema is behind this build");

    let state = AppState {
        store: Arc::new(PgStore::new(pool.clone())),
        auth: Arc::new(PgSessionAuth::new(pool)),
        gateway: Arc::new(StripeGateway::new(&config.stripe_secret_key)),
        blobs: Arc::new(HmacUrlSigner::new(&config.storage)),
        rate_limiter: Arc::new(FixedWindowLimiter::new()),
        alerts: Arc::new(TracingAlertSink),
        settings: Arc::new(config.settings),
    };

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind listener");
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
