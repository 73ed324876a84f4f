use {
    crate::{config::StorageConfig, domain::error::MarketError, domain::ports::BlobStore},
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    hmac::{Hmac, Mac},
    sha2::Sha256,
    std::time::Duration,
};

type HmacSha256 = Hmac<Sha256>;

/// Issues short-lived object URLs signed with a key shared with the storage
/// edge: `<base>/object/sign/<bucket>/<key>?expires=<unix>&signature=<hex>`,
/// where the MAC covers `"<bucket>/<key>:<expires>"`.
#[derive(Debug, Clone)]
pub struct HmacUrlSigner {
    base_url: String,
    bucket: String,
    signing_key: String,
}

impl HmacUrlSigner {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            signing_key: config.signing_key.clone(),
        }
    }

    pub fn sign_at(
        &self,
        object_path: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, MarketError> {
        let key = object_path.trim_start_matches('/');
        if key.is_empty() || key.split('/').any(|seg| seg == "..") {
            return Err(MarketError::Store(format!("invalid object path: {object_path}")));
        }
        let expires = i64::try_from(ttl.as_secs())
            .ok()
            .and_then(|ttl| now.timestamp().checked_add(ttl))
            .ok_or_else(|| MarketError::Store("signed url ttl out of range".into()))?;
        let signature = self.mac(key, expires)?;
        Ok(format!(
            "{}/object/sign/{}/{key}?expires={expires}&signature={signature}",
            self.base_url, self.bucket
        ))
    }

    /// Checks a signature the way the storage edge does.
    pub fn verify_at(
        &self,
        object_path: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if now.timestamp() > expires {
            return false;
        }
        match self.mac(object_path, expires) {
            Ok(expected) => expected == signature,
            Err(_) => false,
        }
    }

    fn mac(&self, key: &str, expires: i64) -> Result<String, MarketError> {
        let mut mac = HmacSha256::new_from_slice(self.signing_key.as_bytes())
            .map_err(|_| MarketError::Store("invalid storage signing key".into()))?;
        mac.update(format!("{}/{key}:{expires}", self.bucket).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl BlobStore for HmacUrlSigner {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn issue_temporary_download_url(
        &self,
        object_path: &str,
        ttl: Duration,
    ) -> Result<String, MarketError> {
        self.sign_at(object_path, ttl, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> HmacUrlSigner {
        HmacUrlSigner::new(&StorageConfig {
            base_url: "https://files.example.com/storage/v1/".to_string(),
            bucket: "project-files".to_string(),
            signing_key: "k3y".to_string(),
        })
    }

    #[test]
    fn signed_url_carries_expiry_and_verifies() {
        let now = Utc::now();
        let url = signer()
            .sign_at("a/b.zip", Duration::from_secs(60), now)
            .unwrap();
        assert!(url.starts_with("https://files.example.com/storage/v1/object/sign/project-files/a/b.zip?"));

        let expires = now.timestamp() + 60;
        assert!(url.contains(&format!("expires={expires}")));
        let signature = url.rsplit_once("signature=").unwrap().1;
        assert!(signer().verify_at("a/b.zip", expires, signature, now));
        assert!(!signer().verify_at("a/c.zip", expires, signature, now));
    }

    #[test]
    fn signed_url_expires() {
        let now = Utc::now();
        let url = signer().sign_at("a.zip", Duration::from_secs(60), now).unwrap();
        let signature = url.rsplit_once("signature=").unwrap().1;
        let later = now + chrono::Duration::seconds(61);
        assert!(!signer().verify_at("a.zip", now.timestamp() + 60, signature, later));
    }

    #[test]
    fn traversal_and_empty_paths_are_rejected() {
        let now = Utc::now();
        assert!(signer().sign_at("", Duration::from_secs(60), now).is_err());
        assert!(signer().sign_at("../secrets", Duration::from_secs(60), now).is_err());
    }

    #[test]
    fn oversized_ttl_is_an_error() {
        let now = Utc::now();
        let too_long = Duration::from_secs(i64::MAX as u64);
        assert!(signer().sign_at("a.zip", too_long, now).is_err());
        assert!(signer().sign_at("a.zip", Duration::MAX, now).is_err());
    }
}
