pub mod bots;
pub mod credentials;
pub mod rest;
pub mod templates;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

pub use rest::RestBackend;

/// Anything cached by a `ResourceStore`: identity is the server-assigned `id`.
pub trait Entity: Clone + Send + Sync + DeserializeOwned + 'static {
    fn id(&self) -> &str;

    fn name(&self) -> Option<&str> {
        None
    }

    fn created_at(&self) -> Option<&str> {
        None
    }

    fn updated_at(&self) -> Option<&str> {
        None
    }
}

/// Opaque backend record: identity, timestamps, everything else kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Entity for Record {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn created_at(&self) -> Option<&str> {
        self.created_at.as_deref()
    }

    fn updated_at(&self) -> Option<&str> {
        self.updated_at.as_deref()
    }
}

pub type Bot = Record;
pub type Step = Record;
pub type Channel = Record;
pub type Request = Record;
pub type Widget = Record;
pub type Template = Record;
pub type Cron = Record;

/// The backend half of a store. Every method yields `None` on any failure;
/// structured errors never cross this seam.
#[async_trait]
pub trait ResourceBackend<T: Entity>: Send + Sync {
    async fn list(&self, params: &[(String, String)]) -> Option<Vec<T>>;
    async fn create(&self, data: &Value) -> Option<T>;
    async fn read(&self, id: &str) -> Option<T>;
    async fn update(&self, id: &str, patch: &Value) -> Option<T>;
    async fn delete(&self, id: &str) -> Option<Value>;
}

/// In-memory cache of one entity type. The cache changes only after the
/// backend confirms, so a failed call leaves it exactly as it was.
pub struct ResourceStore<T: Entity> {
    backend: Arc<dyn ResourceBackend<T>>,
    items: RwLock<Vec<T>>,
}

impl<T: Entity> ResourceStore<T> {
    pub fn new(backend: Arc<dyn ResourceBackend<T>>) -> Self {
        Self {
            backend,
            items: RwLock::new(Vec::new()),
        }
    }

    pub async fn items(&self) -> Vec<T> {
        self.items.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<T> {
        self.items.read().await.iter().find(|i| i.id() == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Replace the cache with the server's list.
    pub async fn list(&self, params: &[(String, String)]) -> Option<Vec<T>> {
        let items = self.backend.list(params).await?;
        *self.items.write().await = items.clone();
        Some(items)
    }

    pub async fn create(&self, data: &Value) -> Option<T> {
        let created = self.backend.create(data).await?;
        self.items.write().await.push(created.clone());
        tracing::debug!(id = created.id(), "cached created entity");
        Some(created)
    }

    /// Fetch one entity without touching the cache.
    pub async fn read(&self, id: &str) -> Option<T> {
        self.backend.read(id).await
    }

    pub async fn update(&self, id: &str, patch: &Value) -> Option<T> {
        let updated = self.backend.update(id, patch).await?;
        self.splice(id, updated.clone()).await;
        Some(updated)
    }

    pub async fn delete(&self, id: &str) -> Option<Value> {
        let response = self.backend.delete(id).await?;
        self.items.write().await.retain(|i| i.id() != id);
        Some(response)
    }

    /// Put a server-confirmed entity in place of the first entry with `id`.
    /// Returns false (cache unchanged) when no entry matches.
    pub async fn splice(&self, id: &str, entity: T) -> bool {
        let mut items = self.items.write().await;
        replace_first(&mut items, id, entity)
    }

    pub async fn append(&self, entity: T) {
        self.items.write().await.push(entity);
    }

    /// Apply `f` to every cached entry in place.
    pub async fn modify_all(&self, f: impl FnMut(&mut T)) {
        self.items.write().await.iter_mut().for_each(f);
    }
}

/// Replace the first entry whose id matches. Later duplicates are left alone.
pub fn replace_first<T: Entity>(items: &mut [T], id: &str, entity: T) -> bool {
    match items.iter_mut().find(|i| i.id() == id) {
        Some(slot) => {
            *slot = entity;
            true
        }
        None => false,
    }
}
