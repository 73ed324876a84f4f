pub mod checkout;
pub mod download_gate;
pub mod integrity;
pub mod order_ledger;
pub mod payment_bridge;
pub mod reconciler;
