//! Service registry contract and in-memory implementation.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rpc::Client;

/// One running instance of a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A service version and the nodes serving it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    pub client: Option<Client>,
}

#[derive(Debug, Clone)]
pub enum RegistryOption {
    WithClient(Client),
}

pub trait Registry: Send + Sync {
    fn init(&self, opts: Vec<RegistryOption>) -> Result<()>;

    fn options(&self) -> RegistryOptions;

    /// Register (or refresh) every node of `service`. A zero `ttl` never expires.
    fn register(&self, service: &ServiceRecord, ttl: Duration) -> Result<()>;

    fn deregister(&self, service: &ServiceRecord) -> Result<()>;

    /// All live versions of `name`, each with its live nodes.
    fn get_service(&self, name: &str) -> Result<Vec<ServiceRecord>>;

    fn list_services(&self) -> Result<Vec<ServiceRecord>>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone)]
struct Entry {
    version: String,
    endpoints: Vec<String>,
    node: Node,
    expires: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires.map_or(true, |at| at > now)
    }
}

/// Process-local registry.
#[derive(Default)]
pub struct MemoryRegistry {
    options: RwLock<RegistryOptions>,
    services: DashMap<String, Vec<Entry>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect(name: &str, entries: &[Entry]) -> Vec<ServiceRecord> {
        let now = Instant::now();
        let mut versions: BTreeMap<&str, ServiceRecord> = BTreeMap::new();

        for entry in entries.iter().filter(|e| e.is_live(now)) {
            let record = versions
                .entry(entry.version.as_str())
                .or_insert_with(|| ServiceRecord {
                    name: name.to_string(),
                    version: entry.version.clone(),
                    endpoints: entry.endpoints.clone(),
                    nodes: Vec::new(),
                });
            record.nodes.push(entry.node.clone());
        }

        versions.into_values().collect()
    }
}

impl Registry for MemoryRegistry {
    fn init(&self, opts: Vec<RegistryOption>) -> Result<()> {
        let mut options = self
            .options
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for opt in opts {
            match opt {
                RegistryOption::WithClient(client) => options.client = Some(client),
            }
        }
        Ok(())
    }

    fn options(&self) -> RegistryOptions {
        self.options
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn register(&self, service: &ServiceRecord, ttl: Duration) -> Result<()> {
        if service.name.is_empty() {
            return Err(Error::Registry("service name must not be empty".into()));
        }

        let expires = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        let mut entries = self.services.entry(service.name.clone()).or_default();

        for node in &service.nodes {
            entries.retain(|e| e.node.id != node.id);
            entries.push(Entry {
                version: service.version.clone(),
                endpoints: service.endpoints.clone(),
                node: node.clone(),
                expires,
            });
        }

        tracing::debug!(service = %service.name, nodes = service.nodes.len(), "Registered service");
        Ok(())
    }

    fn deregister(&self, service: &ServiceRecord) -> Result<()> {
        if let Some(mut entries) = self.services.get_mut(&service.name) {
            entries.retain(|e| !service.nodes.iter().any(|n| n.id == e.node.id));
        }
        self.services.remove_if(&service.name, |_, entries| entries.is_empty());

        tracing::debug!(service = %service.name, "Deregistered service");
        Ok(())
    }

    fn get_service(&self, name: &str) -> Result<Vec<ServiceRecord>> {
        Ok(self
            .services
            .get(name)
            .map(|entries| Self::collect(name, &entries))
            .unwrap_or_default())
    }

    fn list_services(&self) -> Result<Vec<ServiceRecord>> {
        let mut all: Vec<ServiceRecord> = self
            .services
            .iter()
            .flat_map(|r| Self::collect(r.key(), r.value()))
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
        Ok(all)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
