pub mod alerts;
pub mod memory;
pub mod postgres;
pub mod rate_limit;
pub mod storage;
