use {
    crate::{
        AppState,
        domain::principal::bearer_token,
        services::integrity::{authorize, run_integrity_check},
    },
    axum::{
        Json,
        extract::{Query, State},
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
    },
    serde::Deserialize,
    serde_json::json,
};

#[derive(Debug, Default, Deserialize)]
pub struct IntegrityQuery {
    secret: Option<String>,
}

/// First non-empty of bearer token, `x-cron-secret`, `?secret=`.
fn provided_secret<'a>(headers: &'a HeaderMap, query: &'a IntegrityQuery) -> Option<&'a str> {
    bearer_token(headers)
        .or_else(|| {
            headers
                .get("x-cron-secret")
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.trim().is_empty())
        })
        .or_else(|| query.secret.as_deref().filter(|v| !v.trim().is_empty()))
}

pub async fn integrity_check(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<IntegrityQuery>,
) -> Response {
    let provided = provided_secret(&headers, &query);
    if !authorize(provided, state.settings.cron_secret.as_deref()) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" }))).into_response();
    }

    match run_integrity_check(&state).await {
        Ok(report) => {
            let mut body = json!({ "status": "ok" });
            if let (Some(map), Ok(serde_json::Value::Object(fields))) =
                (body.as_object_mut(), serde_json::to_value(&report))
            {
                map.extend(fields);
            }
            Json(body).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "integrity check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": "integrity check failed" })),
            )
                .into_response()
        }
    }
}
