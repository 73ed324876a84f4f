pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;
pub mod transport;

use {
    config::Settings,
    domain::{
        ports::{AlertSink, BlobStore, RateLimiter},
        principal::AuthProvider,
        provider::PaymentGateway,
        store::Datastore,
    },
    std::sync::Arc,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Datastore>,
    pub auth: Arc<dyn AuthProvider>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub blobs: Arc<dyn BlobStore>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub alerts: Arc<dyn AlertSink>,
    pub settings: Arc<Settings>,
}
