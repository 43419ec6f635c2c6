//! Shared fakes for the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AyayeError, Result};
use crate::generation::Generator;
use crate::queue::StreamEntry;
use crate::registry::{AppRecord, PeerRecord, Registry};

/// Build a stream entry carrying one payload field.
pub fn entry_with(field: &str, payload: &str) -> StreamEntry {
    StreamEntry {
        stream: "ledger/fact".to_string(),
        id: "1-0".to_string(),
        fields: HashMap::from([(field.to_string(), payload.to_string())]),
    }
}

/// Registry fake with a fixed active-actor set and an in-memory app record.
pub struct MockRegistry {
    active: HashSet<String>,
    app: Mutex<Option<AppRecord>>,
    pub creates: AtomicUsize,
    pub meta_updates: AtomicUsize,
    pub peers_fail: bool,
}

impl MockRegistry {
    pub fn with_active(active: &[&str]) -> Self {
        Self {
            active: active.iter().map(|s| s.to_string()).collect(),
            app: Mutex::new(None),
            creates: AtomicUsize::new(0),
            meta_updates: AtomicUsize::new(0),
            peers_fail: false,
        }
    }

    pub fn with_existing_app(active: &[&str], who: &str) -> Self {
        let registry = Self::with_active(active);
        *registry.app.try_lock().unwrap() = Some(AppRecord {
            id: Uuid::new_v4(),
            who: who.to_string(),
            status: "active".to_string(),
            meta: Value::Null,
        });
        registry
    }

    pub fn failing_peers(mut self) -> Self {
        self.peers_fail = true;
        self
    }

    pub async fn app_record(&self) -> Option<AppRecord> {
        self.app.lock().await.clone()
    }
}

#[async_trait]
impl Registry for MockRegistry {
    async fn lookup_app(&self, who: &str) -> Result<Option<AppRecord>> {
        Ok(self
            .app
            .lock()
            .await
            .clone()
            .filter(|record| record.who == who))
    }

    async fn create_app(&self, who: &str) -> Result<AppRecord> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let record = AppRecord {
            id: Uuid::new_v4(),
            who: who.to_string(),
            status: "active".to_string(),
            meta: Value::Null,
        };
        *self.app.lock().await = Some(record.clone());
        Ok(record)
    }

    async fn update_app_meta(&self, id: Uuid, meta: &Value) -> Result<AppRecord> {
        self.meta_updates.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.app.lock().await;
        let record = guard
            .as_mut()
            .filter(|record| record.id == id)
            .ok_or_else(|| AyayeError::registry("no such app"))?;
        record.meta = meta.clone();
        Ok(record.clone())
    }

    async fn active_origins(&self) -> Result<Vec<PeerRecord>> {
        if self.peers_fail {
            return Err(AyayeError::registry("origin listing unavailable"));
        }
        Ok(vec![PeerRecord {
            id: Uuid::new_v4(),
            status: "active".to_string(),
            meta: json!({"title": "an origin"}),
        }])
    }

    async fn active_apps(&self) -> Result<Vec<PeerRecord>> {
        if self.peers_fail {
            return Err(AyayeError::registry("app listing unavailable"));
        }
        Ok(vec![PeerRecord {
            id: Uuid::new_v4(),
            status: "active".to_string(),
            meta: json!({"title": "a peer app"}),
        }])
    }

    async fn is_active(&self, entity_id: &str) -> Result<bool> {
        Ok(self.active.contains(entity_id))
    }
}

/// Generator fake returning a canned answer or a canned failure.
pub struct MockGenerator {
    response: std::result::Result<String, String>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl MockGenerator {
    pub fn answering(text: &str) -> Self {
        Self {
            response: Ok(text.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, instructions: &str, input: &str) -> Result<String> {
        self.calls
            .lock()
            .await
            .push((instructions.to_string(), input.to_string()));
        match &self.response {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(AyayeError::generation(message.clone())),
        }
    }
}
