use {
    crate::AppState,
    axum::{
        Json,
        extract::{Query, State},
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    chrono::Utc,
    serde::Deserialize,
    serde_json::json,
};

#[derive(Debug, Default, Deserialize)]
pub struct HealthQuery {
    deep: Option<String>,
}

pub async fn health(State(state): State<AppState>, Query(query): Query<HealthQuery>) -> Response {
    let deep = matches!(query.deep.as_deref(), Some("1" | "true"));
    let version = env!("CARGO_PKG_VERSION");

    if deep {
        if let Err(e) = state.store.ping().await {
            tracing::error!(error = %e, "deep health check failed");
            let body = json!({
                "status": "degraded",
                "timestamp": Utc::now(),
                "version": version,
                "database": "unreachable",
            });
            return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
        }
    }

    Json(json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "version": version,
    }))
    .into_response()
}
