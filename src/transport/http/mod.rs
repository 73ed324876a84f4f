pub mod downloads;
pub mod errors;
pub mod health;
pub mod integrity;
pub mod orders;
pub mod router;
pub mod webhook;

use {crate::domain::error::MarketError, serde::de::DeserializeOwned};

/// Parses a JSON body so that malformed input is a 400 in our error shape
/// rather than axum's plain-text rejection.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, MarketError> {
    serde_json::from_slice(body).map_err(|e| MarketError::Validation(format!("invalid request body: {e}")))
}
