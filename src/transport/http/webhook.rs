use {
    super::errors::ApiError,
    crate::{AppState, services::reconciler::handle_event},
    axum::{Json, extract::State, http::HeaderMap},
    serde_json::json,
};

/// Acknowledges with the outcome label only; skip reasons stay in the logs.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = headers.get("Stripe-Signature").and_then(|v| v.to_str().ok());

    let outcome = handle_event(&state, &body, signature).await?;
    Ok(Json(json!({ "received": true, "status": outcome.label() })))
}
