use {
    crate::domain::{integrity::IntegrityReport, ports::AlertSink},
    async_trait::async_trait,
};

/// Emits integrity drift as a structured warning for the log pipeline to
/// route to whoever is on call.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn raise(&self, report: &IntegrityReport) {
        tracing::warn!(
            lookback_days = report.lookback_days,
            paid_orders_missing_purchases = report.counts.paid_orders_missing_purchases,
            purchases_without_paid_order = report.counts.purchases_without_paid_order,
            deliverables_without_paid_order = report.counts.deliverables_without_paid_order,
            pending_payment_events = report.counts.pending_payment_events,
            "integrity drift detected"
        );
    }
}
