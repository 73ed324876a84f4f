use {
    crate::domain::error::{MarketError, PurchaseRejection},
    axum::{
        Json,
        http::{HeaderValue, StatusCode, header},
        response::{IntoResponse, Response},
    },
};

pub struct ApiError(pub MarketError);

impl From<MarketError> for ApiError {
    fn from(err: MarketError) -> Self {
        Self(err)
    }
}

fn purchase_status(rejection: PurchaseRejection) -> (StatusCode, &'static str) {
    match rejection {
        PurchaseRejection::EmailNotVerified => (StatusCode::FORBIDDEN, "email_not_verified"),
        PurchaseRejection::ListingUnavailable => (StatusCode::NOT_FOUND, "listing_unavailable"),
        PurchaseRejection::SelfPurchase => (StatusCode::FORBIDDEN, "self_purchase"),
        PurchaseRejection::AlreadyPurchased => (StatusCode::CONFLICT, "already_purchased"),
        PurchaseRejection::OrderInProgress => (StatusCode::CONFLICT, "order_in_progress"),
        PurchaseRejection::InvalidPrice => (StatusCode::BAD_REQUEST, "invalid_price"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut retry_after = None;

        let (status, error_code, message) = match &self.0 {
            MarketError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            MarketError::WebhookSignature(reason) => {
                tracing::warn!(%reason, "webhook signature rejected");
                (
                    StatusCode::BAD_REQUEST,
                    "webhook_error",
                    "invalid webhook signature".to_string(),
                )
            }
            MarketError::Authentication => (
                StatusCode::UNAUTHORIZED,
                "authentication_required",
                "authentication required".to_string(),
            ),
            MarketError::Purchase(rejection) => {
                let (status, code) = purchase_status(*rejection);
                (status, code, rejection.user_message().to_string())
            }
            MarketError::AccessDenied(_) => (
                StatusCode::FORBIDDEN,
                "access_denied",
                "access denied".to_string(),
            ),
            MarketError::NotFound(_) => {
                (StatusCode::NOT_FOUND, "not_found", "not found".to_string())
            }
            MarketError::RateLimited { retry_after_secs } => {
                retry_after = Some(*retry_after_secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limited",
                    "too many requests, try again later".to_string(),
                )
            }
            MarketError::ExternalService(err) => {
                tracing::error!("external service error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "payment_error",
                    "payment error, try again".to_string(),
                )
            }
            MarketError::Database(err) => {
                tracing::error!("database error: {err}");
                internal()
            }
            MarketError::Serialization(err) => {
                tracing::error!("serialization error: {err}");
                internal()
            }
            MarketError::Store(err) => {
                tracing::error!("store error: {err}");
                internal()
            }
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal error".to_string(),
    )
}
