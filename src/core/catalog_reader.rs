use crate::core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::core::{Cache, CatalogStore, Project};
use crate::utils::error::{PlannerError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CatalogReaderConfig {
    pub timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_key_prefix: String,
    pub max_batch_size: usize,
}

impl Default for CatalogReaderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            cache_ttl: Duration::from_secs(600),
            cache_key_prefix: "project-id-cache".to_string(),
            max_batch_size: 100,
        }
    }
}

/// Catalog access with cache-aside reads, per-call timeouts and a circuit
/// breaker around the store.
pub struct ResilientCatalogReader {
    store: Arc<dyn CatalogStore>,
    cache: Arc<dyn Cache>,
    breaker: CircuitBreaker,
    config: CatalogReaderConfig,
}

impl ResilientCatalogReader {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        cache: Arc<dyn Cache>,
        config: CatalogReaderConfig,
        breaker_config: CircuitBreakerConfig,
    ) -> Self {
        Self {
            store,
            cache,
            breaker: CircuitBreaker::new("catalog-store", breaker_config),
            config,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn cache_key(&self, id: Uuid) -> String {
        format!("{}:{}", self.config.cache_key_prefix, id)
    }

    /// Looks a project up, preferring the cache.
    ///
    /// When the store call times out or the circuit is open, a cached copy is
    /// returned if one exists; otherwise the timeout or circuit-open error is.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Project> {
        let Some(permit) = self.breaker.allow_call() else {
            let error = PlannerError::CircuitOpen {
                resource: self.breaker.resource().to_string(),
            };
            tracing::warn!(%id, "Catalog circuit open, checking cache as fallback");
            return self.fallback_to_cache(id, error).await;
        };

        match tokio::time::timeout(self.config.timeout, self.read_through(id)).await {
            Ok(Ok(project)) => {
                permit.record_success();
                Ok(project)
            }
            Ok(Err(error @ PlannerError::NotFound { .. })) => {
                // the store answered; a missing record is not a store failure
                permit.record_success();
                Err(error)
            }
            Ok(Err(error)) => {
                permit.record_failure();
                tracing::error!(%id, error = %error, "Project lookup failed");
                Err(error)
            }
            Err(_) => {
                permit.record_failure();
                let error = PlannerError::Timeout {
                    operation: format!("find_by_id({})", id),
                    after: self.config.timeout,
                };
                tracing::warn!(%id, timeout = ?self.config.timeout, "Project lookup timed out, checking cache as fallback");
                self.fallback_to_cache(id, error).await
            }
        }
    }

    /// Full catalog scan. Bounded by the call timeout but not routed through
    /// the breaker, so scan failures never block point lookups.
    pub async fn find_all(&self) -> Result<Vec<Project>> {
        let projects = self.with_timeout("find_all", self.store.find_all()).await?;
        tracing::debug!(count = projects.len(), "Fetched project catalog");
        Ok(projects)
    }

    pub async fn save(&self, project: Project) -> Result<Project> {
        project.validate()?;
        self.with_timeout("save", self.store.save(project)).await
    }

    pub async fn save_all(&self, projects: Vec<Project>) -> Result<Vec<Project>> {
        if projects.is_empty() {
            return Err(PlannerError::InvalidProject {
                message: "Project collection must not be empty".to_string(),
            });
        }
        if projects.len() > self.config.max_batch_size {
            return Err(PlannerError::TooManyProjects {
                limit: self.config.max_batch_size,
                actual: projects.len(),
            });
        }
        for project in &projects {
            project.validate()?;
        }

        tracing::info!(count = projects.len(), "Saving projects");
        self.with_timeout("save_all", self.store.save_all(projects))
            .await
    }

    /// Drops the cached copy of a project. Failures are logged and reported
    /// as `false`.
    pub async fn evict(&self, id: Uuid) -> bool {
        let key = self.cache_key(id);
        match self.cache.delete(&key).await {
            Ok(removed) => {
                tracing::debug!(key = %key, removed, "Cache eviction completed");
                removed
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Error evicting project from cache");
                false
            }
        }
    }

    async fn read_through(&self, id: Uuid) -> Result<Project> {
        if let Some(project) = self.cached(id).await {
            tracing::debug!(%id, "Cache hit");
            return Ok(project);
        }

        tracing::debug!(%id, "Cache miss, reading from store");
        let project = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(PlannerError::NotFound { id })?;

        self.populate(&project).await;
        Ok(project)
    }

    async fn fallback_to_cache(&self, id: Uuid, error: PlannerError) -> Result<Project> {
        match self.cached(id).await {
            Some(project) => {
                tracing::info!(%id, "Serving project from cache after {}", error);
                Ok(project)
            }
            None => Err(error),
        }
    }

    /// Cache read that treats any cache failure as a miss.
    async fn cached(&self, id: Uuid) -> Option<Project> {
        let key = self.cache_key(id);
        let raw = match self.cache.get(&key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<Project>(&raw) {
            Ok(project) => Some(project),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Write-through on miss. A failed cache write never fails the read.
    async fn populate(&self, project: &Project) {
        let key = self.cache_key(project.id);
        let value = match serde_json::to_string(project) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Could not encode project for cache");
                return;
            }
        };

        if let Err(e) = self.cache.set(&key, value, self.config.cache_ttl).await {
            tracing::warn!(key = %key, error = %e, "Error caching project");
        }
    }

    async fn with_timeout<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.config.timeout, call)
            .await
            .map_err(|_| PlannerError::Timeout {
                operation: operation.to_string(),
                after: self.config.timeout,
            })?
    }
}
