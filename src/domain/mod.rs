pub mod audit;
pub mod deliverable;
pub mod error;
pub mod grant;
pub mod id;
pub mod integrity;
pub mod listing;
pub mod money;
pub mod order;
pub mod payment_event;
pub mod ports;
pub mod principal;
pub mod provider;
pub mod store;
