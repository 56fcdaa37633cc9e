use crate::domain::model::{BrokerMessage, Project};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

/// Header carrying the routing key of a published message.
pub const PARTITION_KEY_HEADER: &str = "PARTITION_KEY";

/// Durable project storage. Owns version and audit timestamps.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Project>>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Project>>;
    async fn save(&self, project: Project) -> Result<Project>;
    async fn save_all(&self, projects: Vec<Project>) -> Result<Vec<Project>>;
}

/// Key/value cache holding serialized values with a per-entry time-to-live.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
}

pub trait MetricsSink: Send + Sync {
    fn record_gauge(&self, name: &str, value: f64, tags: &[(&str, String)]);
}

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Returns `Ok(false)` when the broker refused the message and an error
    /// when it could not be reached.
    async fn send(&self, message: BrokerMessage) -> Result<bool>;
}
