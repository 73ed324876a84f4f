use {
    super::{downloads, health, integrity, orders, webhook},
    crate::AppState,
    axum::{
        Router,
        extract::DefaultBodyLimit,
        http::StatusCode,
        routing::{get, post},
    },
    std::time::Duration,
    tower_http::timeout::TimeoutLayer,
};

/// Stripe events are typically well under 20 KiB.
pub const BODY_LIMIT: usize = 64 * 1024;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/orders", post(orders::create_order))
        .route("/payments/webhook", post(webhook::stripe_webhook))
        .route("/files/download", post(downloads::download))
        .route("/integrity-check", get(integrity::integrity_check))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .with_state(state)
}
