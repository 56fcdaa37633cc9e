pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use config::PlannerConfig;
pub use core::catalog_reader::ResilientCatalogReader;
pub use core::consumer::{EventConsumer, PartitionListener, RetryPolicy};
pub use core::producer::EventProducer;
pub use core::selection::SelectionEngine;
pub use domain::model::{OptimizationQuery, OptimizationRequestEvent, OptimizationResult, Project};
pub use utils::error::{PlannerError, Result};
