use crate::config::BrokerConfig;
use crate::domain::model::BrokerMessage;
use crate::domain::ports::{MessageBroker, PARTITION_KEY_HEADER};
use crate::utils::error::{PlannerError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

struct Topic {
    senders: Vec<UnboundedSender<BrokerMessage>>,
    receivers: Vec<Option<UnboundedReceiver<BrokerMessage>>>,
}

/// Partitioned topics backed by unbounded channels. Each partition delivers
/// in send order to a single subscriber.
pub struct InMemoryBroker {
    topics: Mutex<HashMap<String, Topic>>,
    available: AtomicBool,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Provisions the request topic and its single-partition dead-letter topic.
    pub fn from_config(config: &BrokerConfig) -> Result<Self> {
        let broker = Self::new();
        broker.provision(&config.topic, config.partition_count)?;
        broker.provision(&config.dead_letter_topic, 1)?;
        Ok(broker)
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, Topic>> {
        self.topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn provision(&self, name: &str, partitions: usize) -> Result<()> {
        if partitions == 0 {
            return Err(PlannerError::ConfigError {
                message: format!("Topic '{}' needs at least one partition", name),
            });
        }

        let mut topics = self.topics();
        if topics.contains_key(name) {
            return Err(PlannerError::ConfigError {
                message: format!("Topic '{}' already exists", name),
            });
        }

        let (senders, receivers) = (0..partitions)
            .map(|_| {
                let (tx, rx) = mpsc::unbounded_channel();
                (tx, Some(rx))
            })
            .unzip();
        topics.insert(name.to_string(), Topic { senders, receivers });
        tracing::debug!(topic = name, partitions, "Topic provisioned");
        Ok(())
    }

    pub fn partition_count(&self, topic: &str) -> Option<usize> {
        self.topics().get(topic).map(|t| t.receivers.len())
    }

    /// Hands out the receiving end of one partition. Each partition has
    /// exactly one subscriber.
    pub fn subscribe(&self, topic: &str, partition: usize) -> Result<UnboundedReceiver<BrokerMessage>> {
        let mut topics = self.topics();
        let entry = topics
            .get_mut(topic)
            .ok_or_else(|| PlannerError::BrokerUnavailable {
                message: format!("unknown topic '{}'", topic),
            })?;

        entry
            .receivers
            .get_mut(partition)
            .and_then(Option::take)
            .ok_or_else(|| PlannerError::ConfigError {
                message: format!(
                    "partition {} of '{}' does not exist or is already subscribed",
                    partition, topic
                ),
            })
    }

    /// Simulates losing (or regaining) the broker connection.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Stops accepting messages. Subscribers drain what was already sent and
    /// then see their channel close.
    pub fn close(&self) {
        for topic in self.topics().values_mut() {
            topic.senders.clear();
        }
    }

    fn partition_for(message: &BrokerMessage, partitions: usize) -> usize {
        message
            .header(PARTITION_KEY_HEADER)
            .and_then(|key| key.parse::<usize>().ok())
            .map(|key| key % partitions)
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn send(&self, message: BrokerMessage) -> Result<bool> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(PlannerError::BrokerUnavailable {
                message: "broker connection lost".to_string(),
            });
        }

        let topics = self.topics();
        let topic = topics
            .get(&message.topic)
            .ok_or_else(|| PlannerError::BrokerUnavailable {
                message: format!("unknown topic '{}'", message.topic),
            })?;

        if topic.senders.is_empty() {
            tracing::warn!(topic = %message.topic, "Broker closed, message refused");
            return Ok(false);
        }

        let partition = Self::partition_for(&message, topic.senders.len());
        Ok(topic.senders[partition].send(message).is_ok())
    }
}
