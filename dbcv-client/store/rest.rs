use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::Value;

use super::{Entity, ResourceBackend};
use crate::api::{ApiClient, ResourceKind};

/// `ResourceBackend` over the REST API: one `ResourceKind` binding, every
/// call routed through `ApiClient::safe_call`.
pub struct RestBackend<T> {
    api: ApiClient,
    kind: ResourceKind,
    _entity: PhantomData<fn() -> T>,
}

impl<T> RestBackend<T> {
    pub fn new(api: ApiClient, kind: ResourceKind) -> Self {
        Self {
            api,
            kind,
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Entity> ResourceBackend<T> for RestBackend<T> {
    async fn list(&self, params: &[(String, String)]) -> Option<Vec<T>> {
        let path = self.kind.collection_path();
        let items: Vec<T> = self.api.safe_call(self.api.get_json(&path, params)).await?;
        tracing::debug!(resource = %self.kind, count = items.len(), "listed");
        Some(items)
    }

    async fn create(&self, data: &Value) -> Option<T> {
        let path = self.kind.collection_path();
        self.api.safe_call(self.api.post_json(&path, data)).await
    }

    async fn read(&self, id: &str) -> Option<T> {
        let path = self.kind.item_path(id);
        self.api.safe_call(self.api.get_json(&path, &[])).await
    }

    async fn update(&self, id: &str, patch: &Value) -> Option<T> {
        let path = self.kind.item_path(id);
        self.api.safe_call(self.api.patch_json(&path, patch)).await
    }

    async fn delete(&self, id: &str) -> Option<Value> {
        let path = self.kind.item_path(id);
        self.api.safe_call(self.api.delete(&path)).await
    }
}
