pub mod liveness;
pub mod metrics;
pub mod retry;
pub mod store;
pub mod telegram;
