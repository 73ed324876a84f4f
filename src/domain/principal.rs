use {
    super::error::MarketError,
    super::id::UserId,
    async_trait::async_trait,
    axum::http::{HeaderMap, header},
};

/// Authenticated caller as resolved by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: UserId,
    pub email: String,
    pub email_verified: bool,
}

#[derive(Debug, Clone)]
pub enum Credentials {
    SessionToken(String),
}

/// Caller metadata recorded on audit and download rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// First `x-forwarded-for` hop, then the usual single-value proxy headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let value = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let ip = value("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
            .filter(|v| !v.is_empty())
            .or_else(|| value("x-real-ip"))
            .or_else(|| value("cf-connecting-ip"))
            .or_else(|| value("x-client-ip"));

        Self {
            ip,
            user_agent: value(header::USER_AGENT.as_str()),
        }
    }

    /// Rate-limit key component; unknown callers share one bucket.
    pub fn ip_or_unknown(&self) -> &str {
        self.ip.as_deref().unwrap_or("unknown")
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Identity provider contract. Session issuance and password checks live
/// behind it.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Fails with `MarketError::Authentication` for unknown or expired
    /// credentials.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Principal, MarketError>;

    async fn current_principal(&self, headers: &HeaderMap) -> Result<Option<Principal>, MarketError> {
        let Some(token) = bearer_token(headers) else {
            return Ok(None);
        };
        match self
            .authenticate(&Credentials::SessionToken(token.to_string()))
            .await
        {
            Ok(principal) => Ok(Some(principal)),
            Err(MarketError::Authentication) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
