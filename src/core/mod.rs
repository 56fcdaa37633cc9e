pub mod catalog_reader;
pub mod circuit_breaker;
pub mod consumer;
pub mod producer;
pub mod selection;

pub use crate::domain::model::{
    BrokerMessage, OptimizationQuery, OptimizationRequestEvent, OptimizationResult, Project,
};
pub use crate::domain::ports::{Cache, CatalogStore, MessageBroker, MetricsSink, PARTITION_KEY_HEADER};
pub use crate::utils::error::Result;
