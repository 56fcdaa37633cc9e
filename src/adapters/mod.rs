// Adapters layer: in-process implementations of the domain ports.

pub mod broker;
pub mod cache;
pub mod metrics;
pub mod store;
