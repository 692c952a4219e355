//! Scriptable in-memory attribute source for tests and offline runs.

use crate::domain::errors::SourceError;
use crate::domain::ports::{AttributeSource, SourceConnector};
use crate::domain::types::{AttributeMap, EngineEndpoint, MetricCategory, ObjectIdentifier};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

struct MockEntity {
    pattern: String,
    id: ObjectIdentifier,
    attrs: AttributeMap,
}

/// Shared state of one simulated engine. Tests script it up front and
/// inspect the counters afterwards.
pub struct MockEngine {
    entities: RwLock<Vec<MockEntity>>,
    fail_fetch: RwLock<HashSet<String>>,
    fail_queries: RwLock<HashSet<String>>,
    fail_resets: AtomicBool,
    refuse_connections: AtomicBool,
    query_delay: RwLock<Duration>,
    connect_count: AtomicUsize,
    query_count: AtomicUsize,
    reset_count: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entities: RwLock::new(Vec::new()),
            fail_fetch: RwLock::new(HashSet::new()),
            fail_queries: RwLock::new(HashSet::new()),
            fail_resets: AtomicBool::new(false),
            refuse_connections: AtomicBool::new(false),
            query_delay: RwLock::new(Duration::ZERO),
            connect_count: AtomicUsize::new(0),
            query_count: AtomicUsize::new(0),
            reset_count: AtomicUsize::new(0),
        })
    }

    /// Register an entity answering the given category's object query.
    pub fn add_entity(&self, category: MetricCategory, id: &str, attrs: AttributeMap) {
        self.entities.write().unwrap().push(MockEntity {
            pattern: category.query_pattern().to_string(),
            id: ObjectIdentifier::new(id),
            attrs,
        });
    }

    /// Make attribute fetches for one identifier fail.
    pub fn fail_attributes_for(&self, id: &str) {
        self.fail_fetch.write().unwrap().insert(id.to_string());
    }

    /// Make object queries for one category fail.
    pub fn fail_queries_for(&self, category: MetricCategory) {
        self.fail_queries
            .write()
            .unwrap()
            .insert(category.query_pattern().to_string());
    }

    pub fn clear_query_failures(&self) {
        self.fail_queries.write().unwrap().clear();
    }

    pub fn set_fail_resets(&self, fail: bool) {
        self.fail_resets.store(fail, Ordering::SeqCst);
    }

    pub fn set_refuse_connections(&self, refuse: bool) {
        self.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// Slow down object queries to simulate a sluggish engine.
    pub fn set_query_delay(&self, delay: Duration) {
        *self.query_delay.write().unwrap() = delay;
    }

    /// How many times a connection was opened against this engine.
    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// How many object queries were served.
    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }

    /// How many stats resets were invoked.
    pub fn reset_count(&self) -> usize {
        self.reset_count.load(Ordering::SeqCst)
    }
}

/// Connector handing out sources backed by one [`MockEngine`].
pub struct MockConnector {
    engine: Arc<MockEngine>,
}

impl MockConnector {
    pub fn new(engine: Arc<MockEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl SourceConnector for MockConnector {
    async fn connect(
        &self,
        endpoint: &EngineEndpoint,
    ) -> Result<Box<dyn AttributeSource>, SourceError> {
        if self.engine.refuse_connections.load(Ordering::SeqCst) {
            return Err(SourceError::Connection {
                reason: format!("{} unreachable", endpoint),
            });
        }
        self.engine.connect_count.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockAttributeSource {
            engine: self.engine.clone(),
        }))
    }
}

struct MockAttributeSource {
    engine: Arc<MockEngine>,
}

#[async_trait]
impl AttributeSource for MockAttributeSource {
    async fn list_identifiers(
        &self,
        pattern: &str,
    ) -> Result<Vec<ObjectIdentifier>, SourceError> {
        let delay = *self.engine.query_delay.read().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.engine.query_count.fetch_add(1, Ordering::SeqCst);
        if self.engine.fail_queries.read().unwrap().contains(pattern) {
            return Err(SourceError::Query {
                pattern: pattern.to_string(),
                reason: "simulated query failure".to_string(),
            });
        }
        Ok(self
            .engine
            .entities
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.pattern == pattern)
            .map(|e| e.id.clone())
            .collect())
    }

    async fn get_attributes(&self, id: &ObjectIdentifier) -> Result<AttributeMap, SourceError> {
        if self.engine.fail_fetch.read().unwrap().contains(id.as_str()) {
            return Err(SourceError::AttributeFetch {
                object: id.to_string(),
                reason: "simulated fetch failure".to_string(),
            });
        }
        self.engine
            .entities
            .read()
            .unwrap()
            .iter()
            .find(|e| &e.id == id)
            .map(|e| e.attrs.clone())
            .ok_or_else(|| SourceError::AttributeFetch {
                object: id.to_string(),
                reason: "no such object".to_string(),
            })
    }

    async fn invoke_reset(&self, id: &ObjectIdentifier) -> Result<(), SourceError> {
        if self.engine.fail_resets.load(Ordering::SeqCst) {
            return Err(SourceError::Invoke {
                object: id.to_string(),
                operation: "resetStats".to_string(),
                reason: "simulated reset failure".to_string(),
            });
        }
        self.engine.reset_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
