use {
    super::id::{DeliverableId, OrderId},
    serde::Serialize,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityCounts {
    pub paid_orders_missing_purchases: usize,
    pub purchases_without_paid_order: usize,
    pub deliverables_without_paid_order: usize,
    pub pending_payment_events: usize,
}

/// Drift between orders, grants, deliverables and the event ledger.
/// Detection only; nothing here is ever repaired automatically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub lookback_days: i64,
    pub paid_orders_missing_purchases: Vec<OrderId>,
    /// Order ids of grants whose order is missing or not `paid`.
    pub purchases_without_paid_order: Vec<OrderId>,
    pub deliverables_without_paid_order: Vec<DeliverableId>,
    pub pending_payment_events: Vec<String>,
    pub counts: IntegrityCounts,
}

impl IntegrityReport {
    pub fn new(
        lookback_days: i64,
        paid_orders_missing_purchases: Vec<OrderId>,
        purchases_without_paid_order: Vec<OrderId>,
        deliverables_without_paid_order: Vec<DeliverableId>,
        pending_payment_events: Vec<String>,
    ) -> Self {
        let counts = IntegrityCounts {
            paid_orders_missing_purchases: paid_orders_missing_purchases.len(),
            purchases_without_paid_order: purchases_without_paid_order.len(),
            deliverables_without_paid_order: deliverables_without_paid_order.len(),
            pending_payment_events: pending_payment_events.len(),
        };
        Self {
            lookback_days,
            paid_orders_missing_purchases,
            purchases_without_paid_order,
            deliverables_without_paid_order,
            pending_payment_events,
            counts,
        }
    }

    pub fn has_drift(&self) -> bool {
        let c = &self.counts;
        c.paid_orders_missing_purchases > 0
            || c.purchases_without_paid_order > 0
            || c.deliverables_without_paid_order > 0
            || c.pending_payment_events > 0
    }
}
