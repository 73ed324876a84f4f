use {
    super::id::{DeliverableId, OrderId},
    chrono::{DateTime, Utc},
};

/// File handed to the buyer of an order. Only reachable through the
/// download gate, never by its raw storage path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deliverable {
    pub id: DeliverableId,
    pub order_id: OrderId,
    /// Object key or full storage URL, as uploaded.
    pub storage_path: String,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Append-only download trail row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadAudit {
    pub order_id: OrderId,
    pub deliverable_id: DeliverableId,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Reduces a stored deliverable location to an object key inside `bucket`.
///
/// Bare keys lose their leading slashes. Full URLs must follow the storage
/// layout `.../object/{public|sign}/<bucket>/<key>` or `.../object/<bucket>/<key>`;
/// anything else yields `None`.
pub fn normalize_storage_path(url_or_path: &str, bucket: &str) -> Option<String> {
    let trimmed = url_or_path.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Some((_, rest)) = trimmed.split_once("://") else {
        let key = trimmed.trim_start_matches('/');
        return (!key.is_empty()).then(|| key.to_string());
    };

    let path = rest
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    // Drop the authority component.
    let (_, path) = path.split_once('/')?;
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();

    let object_idx = parts.iter().position(|p| *p == "object")?;
    let after = &parts[object_idx + 1..];
    let bucket_idx = if after.first() == Some(&bucket) {
        0
    } else if after.get(1) == Some(&bucket) {
        1
    } else {
        return None;
    };

    let key = after[bucket_idx + 1..].join("/");
    (!key.is_empty()).then_some(key)
}

/// Display name for a download: the last path segment.
pub fn file_name(object_path: &str) -> &str {
    object_path
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or("download")
}
