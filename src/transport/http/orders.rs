use {
    super::{errors::ApiError, parse_json},
    crate::{
        AppState,
        domain::{id::ListingId, principal::RequestContext},
        services::checkout::start_checkout,
    },
    axum::{
        Json,
        body::Bytes,
        extract::State,
        http::{HeaderMap, StatusCode},
    },
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub listing_id: ListingId,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub listing_id: String,
    pub amount: Decimal,
    pub currency: &'static str,
    pub client_secret: String,
}

pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiError> {
    let principal = state.auth.current_principal(&headers).await?;
    let request: CreateOrderRequest = parse_json(&body)?;
    let ctx = RequestContext::from_headers(&headers);

    let session = start_checkout(&state, principal.as_ref(), request.listing_id, &ctx).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            order_id: session.order_id.to_string(),
            listing_id: session.listing_id.to_string(),
            amount: session.amount,
            currency: session.currency.code(),
            client_secret: session.client_secret,
        }),
    ))
}
