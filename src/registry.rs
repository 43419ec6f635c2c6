//! Entity/record store client.
//!
//! The fabric API holds app registrations, origin records, and the "active"
//! status of actors. This daemon upserts its own registration at startup,
//! checks actor activity before dispatching, and pulls active peer metadata
//! as context for command handlers. All calls are plain JSON REST over
//! `reqwest` with a request timeout, so a wedged API cannot stall the loop
//! forever.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::error::{AyayeError, Result};

/// This daemon's registration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppRecord {
    pub id: Uuid,
    pub who: String,
    pub status: String,
    #[serde(default)]
    pub meta: Value,
}

impl AppRecord {
    /// A record is an eligible dispatch target/context source only while
    /// active.
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// An active peer record (origin or app) whose `meta` feeds handler context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: Uuid,
    pub status: String,
    #[serde(default)]
    pub meta: Value,
}

/// Trait for the registration store.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Look up an app registration by its stable short name.
    async fn lookup_app(&self, who: &str) -> Result<Option<AppRecord>>;

    /// Create a registration for `who`.
    async fn create_app(&self, who: &str) -> Result<AppRecord>;

    /// Overwrite the registration's capability metadata.
    async fn update_app_meta(&self, id: Uuid, meta: &Value) -> Result<AppRecord>;

    /// All currently active origin records.
    async fn active_origins(&self) -> Result<Vec<PeerRecord>>;

    /// All currently active app records.
    async fn active_apps(&self) -> Result<Vec<PeerRecord>>;

    /// Whether the actor is currently active.
    async fn is_active(&self, entity_id: &str) -> Result<bool>;
}

#[derive(Deserialize)]
struct AppEnvelope {
    app: AppRecord,
}

#[derive(Deserialize)]
struct AppsEnvelope {
    #[serde(default)]
    apps: Vec<AppRecord>,
}

#[derive(Deserialize)]
struct PeersEnvelope {
    #[serde(default, alias = "apps", alias = "origins")]
    records: Vec<PeerRecord>,
}

#[derive(Deserialize)]
struct EntityEnvelope {
    entity: EntityStatus,
}

#[derive(Deserialize)]
struct EntityStatus {
    status: String,
}

/// REST client against the fabric API.
pub struct RestRegistry {
    http: reqwest::Client,
    base: String,
}

impl RestRegistry {
    /// Build a client from configuration.
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AyayeError::registry_transport("cannot build HTTP client", e))?;
        Ok(Self {
            http,
            base: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| AyayeError::registry_transport(format!("GET {path} failed"), e))?;
        let response = response
            .error_for_status()
            .map_err(|e| AyayeError::registry_transport(format!("GET {path} rejected"), e))?;
        response
            .json()
            .await
            .map_err(|e| AyayeError::registry_transport(format!("GET {path} bad body"), e))
    }
}

#[async_trait]
impl Registry for RestRegistry {
    async fn lookup_app(&self, who: &str) -> Result<Option<AppRecord>> {
        let envelope: AppsEnvelope = self.get_json(&format!("/app?who={who}")).await?;
        Ok(envelope.apps.into_iter().next())
    }

    async fn create_app(&self, who: &str) -> Result<AppRecord> {
        let path = "/app";
        let response = self
            .http
            .post(self.url(path))
            .json(&serde_json::json!({ "app": { "who": who } }))
            .send()
            .await
            .map_err(|e| AyayeError::registry_transport("POST /app failed", e))?
            .error_for_status()
            .map_err(|e| AyayeError::registry_transport("POST /app rejected", e))?;
        let envelope: AppEnvelope = response
            .json()
            .await
            .map_err(|e| AyayeError::registry_transport("POST /app bad body", e))?;
        tracing::info!(who = %who, id = %envelope.app.id, "App registration created");
        Ok(envelope.app)
    }

    async fn update_app_meta(&self, id: Uuid, meta: &Value) -> Result<AppRecord> {
        let path = format!("/app/{id}");
        let response = self
            .http
            .patch(self.url(&path))
            .json(&serde_json::json!({ "app": { "meta": meta } }))
            .send()
            .await
            .map_err(|e| AyayeError::registry_transport("PATCH /app failed", e))?
            .error_for_status()
            .map_err(|e| AyayeError::registry_transport("PATCH /app rejected", e))?;
        let envelope: AppEnvelope = response
            .json()
            .await
            .map_err(|e| AyayeError::registry_transport("PATCH /app bad body", e))?;
        Ok(envelope.app)
    }

    async fn active_origins(&self) -> Result<Vec<PeerRecord>> {
        let envelope: PeersEnvelope = self.get_json("/origin?status=active").await?;
        Ok(envelope.records)
    }

    async fn active_apps(&self) -> Result<Vec<PeerRecord>> {
        let envelope: PeersEnvelope = self.get_json("/app?status=active").await?;
        Ok(envelope.records)
    }

    async fn is_active(&self, entity_id: &str) -> Result<bool> {
        let path = format!("/entity/{entity_id}");
        let response = self
            .http
            .get(self.url(&path))
            .send()
            .await
            .map_err(|e| AyayeError::registry_transport(format!("GET {path} failed"), e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let response = response
            .error_for_status()
            .map_err(|e| AyayeError::registry_transport(format!("GET {path} rejected"), e))?;
        let envelope: EntityEnvelope = response
            .json()
            .await
            .map_err(|e| AyayeError::registry_transport(format!("GET {path} bad body"), e))?;
        Ok(envelope.entity.status == "active")
    }
}
