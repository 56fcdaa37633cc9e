use crate::core::catalog_reader::ResilientCatalogReader;
use crate::core::selection::SelectionEngine;
use crate::core::{
    BrokerMessage, MessageBroker, MetricsSink, OptimizationQuery, OptimizationRequestEvent,
    OptimizationResult,
};
use crate::utils::error::{ErrorCategory, PlannerError, Result};
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub delay: Duration,
    /// Give up immediately on an empty catalog instead of retrying it like a
    /// transient failure.
    pub fail_fast_on_structural: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(2),
            fail_fast_on_structural: false,
        }
    }
}

impl RetryPolicy {
    fn should_retry(&self, error: &PlannerError, retries_done: u32) -> bool {
        if retries_done >= self.max_retries || !error.is_retryable() {
            return false;
        }
        !(self.fail_fast_on_structural && error.category() == ErrorCategory::Structural)
    }
}

/// Turns optimization requests into results: catalog lookup, greedy
/// selection, metrics. Every event is acknowledged whatever the outcome.
pub struct EventConsumer {
    reader: Arc<ResilientCatalogReader>,
    engine: SelectionEngine,
    metrics: Arc<dyn MetricsSink>,
    retry: RetryPolicy,
}

impl EventConsumer {
    pub fn new(
        reader: Arc<ResilientCatalogReader>,
        engine: SelectionEngine,
        metrics: Arc<dyn MetricsSink>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            reader,
            engine,
            metrics,
            retry,
        }
    }

    /// Handles one raw broker payload. Malformed payloads are dropped without
    /// retry; pipeline failures are retried per policy and then dropped.
    pub async fn on_event(&self, payload: &str, partition: usize) {
        tracing::info!(partition, payload, "Received optimization request");

        let event = match OptimizationRequestEvent::from_json(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(partition, payload, error = %e, "Dropping malformed optimization request");
                return;
            }
        };

        if let Err(e) = self.execute(&event, partition).await {
            tracing::error!(
                partition,
                payload,
                error = %e,
                category = ?e.category(),
                "Final failure processing optimization request"
            );
            self.metrics.record_gauge(
                "optimization.failures",
                1.0,
                &[
                    ("partition", partition.to_string()),
                    ("category", format!("{:?}", e.category())),
                ],
            );
        }
    }

    /// Runs the request under the retry policy and records the result gauges.
    pub async fn execute(
        &self,
        event: &OptimizationRequestEvent,
        partition: usize,
    ) -> Result<OptimizationResult> {
        let result = self.process_with_retry(event, partition).await?;
        self.record_result(event, &result, partition);
        Ok(result)
    }

    async fn process_with_retry(
        &self,
        event: &OptimizationRequestEvent,
        partition: usize,
    ) -> Result<OptimizationResult> {
        let mut retries_done = 0;
        loop {
            match self.process(event).await {
                Ok(result) => return Ok(result),
                Err(e) if self.retry.should_retry(&e, retries_done) => {
                    retries_done += 1;
                    tracing::warn!(
                        partition,
                        attempt = retries_done,
                        max_retries = self.retry.max_retries,
                        error = %e,
                        "Optimization failed, retrying in {:?}",
                        self.retry.delay
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One attempt: resolve the catalog and run the engine.
    pub async fn process(&self, event: &OptimizationRequestEvent) -> Result<OptimizationResult> {
        let projects = self.reader.find_all().await?;
        if projects.is_empty() {
            tracing::warn!("No projects available for capital maximization");
            return Err(PlannerError::CatalogEmpty);
        }

        tracing::info!(
            max_selections = event.max_selections,
            initial_capital = %event.initial_capital,
            available_projects = projects.len(),
            "Processing optimization request"
        );

        let max_selections =
            usize::try_from(event.max_selections).map_err(|_| PlannerError::InvalidEvent {
                message: format!("maxSelections out of range: {}", event.max_selections),
            })?;
        let query = OptimizationQuery::new(projects, max_selections, event.initial_capital)?;
        self.engine.maximize(query).await
    }

    fn record_result(
        &self,
        event: &OptimizationRequestEvent,
        result: &OptimizationResult,
        partition: usize,
    ) {
        let selected = result.selected_names().join(",");
        tracing::info!(
            partition,
            final_capital = %result.final_capital,
            selected_count = result.selected_projects.len(),
            selected = %selected,
            "Optimization completed"
        );

        let tags = [
            ("partition", partition.to_string()),
            ("max_selections", event.max_selections.to_string()),
            ("initial_capital", event.initial_capital.to_string()),
            ("selected", selected),
        ];
        self.metrics.record_gauge(
            "optimization.final_capital",
            result.final_capital.to_f64().unwrap_or(f64::NAN),
            &tags,
        );
        self.metrics.record_gauge(
            "optimization.selected_count",
            result.selected_projects.len() as f64,
            &tags,
        );
    }
}

/// Consumes one partition sequentially, preserving the partition's order.
///
/// Each message runs in its own task; if that task panics the raw message is
/// forwarded to the dead-letter topic.
pub struct PartitionListener {
    consumer: Arc<EventConsumer>,
    broker: Arc<dyn MessageBroker>,
    dead_letter_topic: String,
    partition: usize,
}

impl PartitionListener {
    pub fn new(
        consumer: Arc<EventConsumer>,
        broker: Arc<dyn MessageBroker>,
        dead_letter_topic: impl Into<String>,
        partition: usize,
    ) -> Self {
        Self {
            consumer,
            broker,
            dead_letter_topic: dead_letter_topic.into(),
            partition,
        }
    }

    /// Runs until the partition's channel closes; returns the number of
    /// messages handled.
    pub fn spawn(self, mut messages: UnboundedReceiver<BrokerMessage>) -> JoinHandle<usize> {
        tokio::spawn(async move {
            let mut handled = 0;
            while let Some(message) = messages.recv().await {
                self.handle(message).await;
                handled += 1;
            }
            tracing::debug!(partition = self.partition, handled, "Partition listener stopped");
            handled
        })
    }

    async fn handle(&self, message: BrokerMessage) {
        let consumer = Arc::clone(&self.consumer);
        let payload = message.payload.clone();
        let partition = self.partition;

        let outcome =
            tokio::spawn(async move { consumer.on_event(&payload, partition).await }).await;

        if let Err(e) = outcome {
            tracing::error!(partition, error = %e, "Handler crashed, forwarding message to dead-letter topic");
            let dead_letter = BrokerMessage {
                topic: self.dead_letter_topic.clone(),
                ..message
            };
            if let Err(e) = self.broker.send(dead_letter).await {
                tracing::error!(partition, error = %e, "Could not dead-letter message");
            }
        }
    }
}
