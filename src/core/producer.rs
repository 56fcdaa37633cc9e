use crate::core::{BrokerMessage, MessageBroker, OptimizationRequestEvent, PARTITION_KEY_HEADER};
use crate::utils::error::{PlannerError, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Routing key for an event: a stable hash of its parameters reduced modulo
/// `partition_count`.
///
/// Structurally equal events (same selection count, numerically equal
/// capital) always land on the same partition, so identical requests keep
/// their relative order. The hash is computed from the values themselves and
/// does not change between processes or builds.
pub fn partition_key(event: &OptimizationRequestEvent, partition_count: u32) -> u32 {
    let selections = event.max_selections as u64;
    let selections_hash = (selections ^ (selections >> 32)) as u32;

    let capital = event.initial_capital.normalize().to_string();
    let capital_hash = capital
        .bytes()
        .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32));

    let hash = 31u32
        .wrapping_add(selections_hash)
        .wrapping_mul(31)
        .wrapping_add(capital_hash);

    hash % partition_count.max(1)
}

/// Outcome of an in-flight publish.
pub struct PublishHandle {
    partition_key: u32,
    handle: JoinHandle<Result<bool>>,
}

impl PublishHandle {
    pub fn partition_key(&self) -> u32 {
        self.partition_key
    }

    /// `true` when the broker accepted the message, `false` when it refused
    /// it, an error when it could not be reached.
    pub async fn outcome(self) -> Result<bool> {
        self.handle.await.map_err(|e| PlannerError::Internal {
            message: format!("Publish task failed: {}", e),
        })?
    }
}

pub struct EventProducer {
    broker: Arc<dyn MessageBroker>,
    topic: String,
    partition_count: u32,
}

impl EventProducer {
    pub fn new(broker: Arc<dyn MessageBroker>, topic: impl Into<String>, partition_count: u32) -> Self {
        Self {
            broker,
            topic: topic.into(),
            partition_count,
        }
    }

    /// Validates and serializes `event` before anything is dispatched, then
    /// sends it in the background. Must be called from within a tokio runtime.
    pub fn publish(&self, event: &OptimizationRequestEvent) -> Result<PublishHandle> {
        event.validate()?;
        let payload = event.to_json().map_err(|e| PlannerError::InvalidEvent {
            message: format!("Event could not be serialized: {}", e),
        })?;

        let key = partition_key(event, self.partition_count);
        tracing::info!(
            max_selections = event.max_selections,
            initial_capital = %event.initial_capital,
            partition_key = key,
            "Publishing optimization request"
        );

        let message =
            BrokerMessage::new(self.topic.clone(), payload).with_header(PARTITION_KEY_HEADER, key.to_string());
        let broker = Arc::clone(&self.broker);

        let handle = tokio::spawn(async move {
            match broker.send(message).await {
                Ok(true) => {
                    tracing::info!(partition_key = key, "Optimization request sent");
                    Ok(true)
                }
                Ok(false) => {
                    tracing::warn!(partition_key = key, "Broker refused optimization request");
                    Ok(false)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to publish optimization request");
                    Err(e)
                }
            }
        });

        Ok(PublishHandle {
            partition_key: key,
            handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::broker::InMemoryBroker;
    use rust_decimal_macros::dec;

    fn event(max: i64, capital: rust_decimal::Decimal) -> OptimizationRequestEvent {
        OptimizationRequestEvent::new(max, capital).unwrap()
    }

    #[test]
    fn test_partition_key_is_deterministic_and_bounded() {
        let a = event(3, dec!(150.5));
        let b = event(3, dec!(150.5));

        assert_eq!(partition_key(&a, 10), partition_key(&b, 10));
        for max in 1..50 {
            assert!(partition_key(&event(max, dec!(12.34)), 10) < 10);
        }
    }

    #[test]
    fn test_partition_key_ignores_decimal_scale() {
        assert_eq!(
            partition_key(&event(2, dec!(100)), 10),
            partition_key(&event(2, dec!(100.00)), 10)
        );
    }

    #[test]
    fn test_partition_key_spreads_distinct_requests() {
        let keys: std::collections::HashSet<u32> =
            (1..=40).map(|max| partition_key(&event(max, dec!(0)), 10)).collect();
        assert!(keys.len() > 1);
    }

    #[tokio::test]
    async fn test_publish_routes_to_key_partition() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.provision("requests", 10).unwrap();
        let producer = EventProducer::new(broker.clone(), "requests", 10);
        let request = event(2, dec!(0));
        let expected = partition_key(&request, 10) as usize;
        let mut rx = broker.subscribe("requests", expected).unwrap();

        let handle = producer.publish(&request).unwrap();
        assert_eq!(handle.partition_key() as usize, expected);
        assert!(handle.outcome().await.unwrap());

        let message = rx.recv().await.unwrap();
        assert_eq!(message.header(PARTITION_KEY_HEADER), Some(expected.to_string().as_str()));
        assert_eq!(
            OptimizationRequestEvent::from_json(&message.payload).unwrap(),
            request
        );
    }

    #[tokio::test]
    async fn test_invalid_event_rejected_before_dispatch() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.provision("requests", 10).unwrap();
        let producer = EventProducer::new(broker, "requests", 10);

        let malformed = OptimizationRequestEvent {
            max_selections: 0,
            initial_capital: dec!(10),
        };

        assert!(matches!(
            producer.publish(&malformed),
            Err(PlannerError::InvalidEvent { .. })
        ));
    }

    #[tokio::test]
    async fn test_broker_failure_surfaces_in_outcome() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.provision("requests", 10).unwrap();
        broker.set_available(false);
        let producer = EventProducer::new(broker, "requests", 10);

        let handle = producer.publish(&event(1, dec!(5))).unwrap();

        assert!(matches!(
            handle.outcome().await,
            Err(PlannerError::BrokerUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_broker_reports_not_sent() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.provision("requests", 10).unwrap();
        broker.close();
        let producer = EventProducer::new(broker, "requests", 10);

        let handle = producer.publish(&event(1, dec!(5))).unwrap();

        assert!(!handle.outcome().await.unwrap());
    }
}
