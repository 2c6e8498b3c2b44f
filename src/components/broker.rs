//! Message broker contract and in-memory implementation.

use std::collections::BTreeMap;
use std::sync::RwLock;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::error::{Error, Result};

/// Buffered messages per topic before slow subscribers start lagging.
const TOPIC_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl Message {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BrokerOptions {
    pub address: String,
}

#[derive(Debug, Clone)]
pub enum BrokerOption {
    Address(String),
}

pub trait Broker: Send + Sync {
    fn init(&self, opts: Vec<BrokerOption>) -> Result<()>;

    fn options(&self) -> BrokerOptions;

    /// Publish to `topic`; returns how many subscribers received it.
    fn publish(&self, topic: &str, message: Message) -> Result<usize>;

    fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<Message>>;

    fn name(&self) -> &'static str;
}

/// Process-local broker backed by one broadcast channel per topic.
#[derive(Default)]
pub struct MemoryBroker {
    options: RwLock<BrokerOptions>,
    topics: DashMap<String, broadcast::Sender<Message>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Broker for MemoryBroker {
    fn init(&self, opts: Vec<BrokerOption>) -> Result<()> {
        let mut options = self
            .options
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for opt in opts {
            match opt {
                BrokerOption::Address(address) => options.address = address,
            }
        }
        Ok(())
    }

    fn options(&self) -> BrokerOptions {
        self.options
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, topic: &str, message: Message) -> Result<usize> {
        if topic.is_empty() {
            return Err(Error::Broker("topic must not be empty".into()));
        }
        // No subscribers is not an error for fire-and-forget publishing.
        Ok(self
            .topics
            .get(topic)
            .and_then(|tx| tx.send(message).ok())
            .unwrap_or(0))
    }

    fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<Message>> {
        if topic.is_empty() {
            return Err(Error::Broker("topic must not be empty".into()));
        }
        Ok(self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
