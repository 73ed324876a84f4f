use {
    crate::{
        AppState,
        config::normalize_secret,
        domain::{
            audit::{ACTOR_INTEGRITY, NewAuditEntry},
            error::MarketError,
            integrity::IntegrityReport,
        },
    },
    chrono::{TimeDelta, Utc},
    sha2::{Digest, Sha256, digest::Output},
};

/// Upper bound on stale event ids listed in one report.
pub const STALE_EVENT_LIMIT: i64 = 200;

/// Checks a caller-supplied secret against the configured one. Both sides
/// are normalized; an unset or empty secret authorizes nobody.
pub fn authorize(provided: Option<&str>, configured: Option<&str>) -> bool {
    let Some(configured) = configured.map(normalize_secret).filter(|s| !s.is_empty()) else {
        return false;
    };
    let Some(provided) = provided.map(normalize_secret).filter(|s| !s.is_empty()) else {
        return false;
    };
    // Compare fixed-size digests so timing does not depend on the prefix match.
    digest(&provided) == digest(&configured)
}

fn digest(value: &str) -> Output<Sha256> {
    Sha256::digest(value.as_bytes())
}

/// Scans for drift over the lookback window, records the run in the audit
/// log and alerts on any finding. Never modifies orders, grants or events.
#[tracing::instrument(skip_all)]
pub async fn run_integrity_check(state: &AppState) -> Result<IntegrityReport, MarketError> {
    let settings = &state.settings;
    let now = Utc::now();
    let since = TimeDelta::try_days(settings.integrity_lookback_days)
        .filter(|window| *window > TimeDelta::zero())
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| {
            MarketError::Validation(format!(
                "integrity lookback out of range: {} days",
                settings.integrity_lookback_days
            ))
        })?;
    let stale_before = TimeDelta::from_std(settings.integrity_stale_after)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .ok_or_else(|| {
            MarketError::Validation(format!(
                "integrity staleness out of range: {:?}",
                settings.integrity_stale_after
            ))
        })?;

    let store = &state.store;
    let report = IntegrityReport::new(
        settings.integrity_lookback_days,
        store.paid_orders_missing_grants(since).await?,
        store.grants_without_paid_order(since).await?,
        store.deliverables_without_paid_order(since).await?,
        store
            .stale_received_events(stale_before, STALE_EVENT_LIMIT)
            .await?
            .into_iter()
            .map(|id| id.into_inner())
            .collect(),
    );

    let entry = NewAuditEntry::new(ACTOR_INTEGRITY, "cron_integrity_check", "system")
        .after(serde_json::to_value(&report)?);
    store.record(&entry).await?;

    if report.has_drift() {
        state.alerts.raise(&report).await;
    } else {
        tracing::info!(lookback_days = report.lookback_days, "integrity check clean");
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_secrets_authorize_after_normalization() {
        assert!(authorize(Some("\"s3cret\""), Some("s3cret\\n")));
        assert!(authorize(Some("s3cret"), Some(" s3cret ")));
    }

    #[test]
    fn missing_or_wrong_secrets_are_rejected() {
        assert!(!authorize(Some("nope"), Some("s3cret")));
        assert!(!authorize(None, Some("s3cret")));
        assert!(!authorize(Some(""), Some("s3cret")));
    }

    #[test]
    fn unset_secret_rejects_everything() {
        assert!(!authorize(Some("anything"), None));
        assert!(!authorize(Some(""), Some("")));
        assert!(!authorize(Some("\"\""), Some("\"\"")));
    }
}
