use {
    crate::domain::{
        error::MarketError,
        id::UserId,
        principal::{AuthProvider, Credentials, Principal},
    },
    async_trait::async_trait,
    sha2::{Digest, Sha256},
    sqlx::PgPool,
    uuid::Uuid,
};

/// Resolves opaque session tokens against the `sessions` table. Only the
/// SHA-256 of a token is stored.
#[derive(Clone)]
pub struct PgSessionAuth {
    pool: PgPool,
}

impl PgSessionAuth {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[derive(sqlx::FromRow)]
struct SessionPrincipalRow {
    id: Uuid,
    email: String,
    email_verified: bool,
}

#[async_trait]
impl AuthProvider for PgSessionAuth {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Principal, MarketError> {
        let Credentials::SessionToken(token) = credentials;
        if token.is_empty() {
            return Err(MarketError::Authentication);
        }

        let row = sqlx::query_as::<_, SessionPrincipalRow>(
            r#"
            SELECT u.id, u.email, (u.email_verified_at IS NOT NULL) AS email_verified
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = $1 AND s.expires_at > now()
            "#,
        )
        .bind(hash_token(token))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(MarketError::Authentication)?;

        Ok(Principal {
            id: UserId::from_uuid(row.id),
            email: row.email,
            email_verified: row.email_verified,
        })
    }
}
