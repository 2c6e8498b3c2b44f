//! Key-value store contract and in-memory implementation.
//!
//! Records are scoped by the `(database, table)` pair currently configured;
//! `Service::init` binds the table to the service name.

use std::sync::RwLock;

use bytes::Bytes;
use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::rpc::Client;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub value: Bytes,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub database: String,
    pub table: String,
    pub client: Option<Client>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            database: "servicekit".to_string(),
            table: "servicekit".to_string(),
            client: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum StoreOption {
    Database(String),
    Table(String),
    WithClient(Client),
}

pub trait Store: Send + Sync {
    fn init(&self, opts: Vec<StoreOption>) -> Result<()>;

    fn options(&self) -> StoreOptions;

    fn read(&self, key: &str) -> Result<Option<Record>>;

    fn write(&self, record: Record) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;

    /// Keys in the current table, sorted.
    fn list(&self) -> Result<Vec<String>>;

    fn name(&self) -> &'static str;
}

type Scope = (String, String);

/// Process-local store.
#[derive(Default)]
pub struct MemoryStore {
    options: RwLock<StoreOptions>,
    records: DashMap<Scope, DashMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn scope(&self) -> Scope {
        let opts = self.options();
        (opts.database, opts.table)
    }
}

impl Store for MemoryStore {
    fn init(&self, opts: Vec<StoreOption>) -> Result<()> {
        let mut options = self
            .options
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for opt in opts {
            match opt {
                StoreOption::Database(db) if db.is_empty() => {
                    return Err(Error::Store("database must not be empty".into()));
                }
                StoreOption::Table(table) if table.is_empty() => {
                    return Err(Error::Store("table must not be empty".into()));
                }
                StoreOption::Database(db) => options.database = db,
                StoreOption::Table(table) => options.table = table,
                StoreOption::WithClient(client) => options.client = Some(client),
            }
        }
        Ok(())
    }

    fn options(&self) -> StoreOptions {
        self.options
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn read(&self, key: &str) -> Result<Option<Record>> {
        Ok(self.records.get(&self.scope()).and_then(|table| {
            table
                .get(key)
                .map(|value| Record::new(key, value.value().clone()))
        }))
    }

    fn write(&self, record: Record) -> Result<()> {
        if record.key.is_empty() {
            return Err(Error::Store("key must not be empty".into()));
        }
        self.records
            .entry(self.scope())
            .or_default()
            .insert(record.key, record.value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        if let Some(table) = self.records.get(&self.scope()) {
            table.remove(key);
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .records
            .get(&self.scope())
            .map(|table| table.iter().map(|r| r.key().clone()).collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
