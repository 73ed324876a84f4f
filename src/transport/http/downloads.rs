use {
    super::{errors::ApiError, parse_json},
    crate::{
        AppState,
        domain::{
            id::{DeliverableId, OrderId},
            principal::RequestContext,
        },
        services::download_gate::resolve_download,
    },
    axum::{Json, body::Bytes, extract::State, http::HeaderMap},
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub deliverable_id: DeliverableId,
    #[serde(default)]
    pub order_id: Option<OrderId>,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub download_url: String,
    pub file_name: String,
    pub expires_in: u64,
}

pub async fn download(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DownloadResponse>, ApiError> {
    let principal = state.auth.current_principal(&headers).await?;
    let request: DownloadRequest = parse_json(&body)?;
    let ctx = RequestContext::from_headers(&headers);

    let signed = resolve_download(
        &state,
        principal.as_ref(),
        request.deliverable_id,
        request.order_id,
        &ctx,
    )
    .await?;

    Ok(Json(DownloadResponse {
        download_url: signed.download_url,
        file_name: signed.file_name,
        expires_in: signed.expires_in_secs,
    }))
}
