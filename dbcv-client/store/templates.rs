use std::ops::Deref;
use std::sync::Arc;

use serde_json::Value;

use super::{Record, ResourceBackend, ResourceStore, RestBackend};
use crate::api::{ApiClient, ResourceKind};

/// Template groups plus the membership calls. Any accepted membership
/// change re-reads the whole group list, since the server owns ordering.
pub struct TemplateGroupsStore {
    store: ResourceStore<Record>,
    api: ApiClient,
}

impl TemplateGroupsStore {
    pub fn new(api: ApiClient) -> Self {
        let backend: Arc<dyn ResourceBackend<Record>> = Arc::new(RestBackend::<Record>::new(
            api.clone(),
            ResourceKind::TemplateGroups,
        ));
        Self::with_backend(api, backend)
    }

    pub fn with_backend(api: ApiClient, backend: Arc<dyn ResourceBackend<Record>>) -> Self {
        Self {
            store: ResourceStore::new(backend),
            api,
        }
    }

    pub async fn add_template(&self, group_id: &str, template_id: &str) -> Option<Value> {
        let response = self.api.add_template_to_group(group_id, template_id).await;
        self.relist_if_accepted(response).await
    }

    pub async fn remove_template(&self, group_id: &str, template_id: &str) -> Option<Value> {
        let response = self
            .api
            .remove_template_from_group(group_id, template_id)
            .await;
        self.relist_if_accepted(response).await
    }

    async fn relist_if_accepted(&self, response: Option<Value>) -> Option<Value> {
        let response = response?;
        if accepted(&response) {
            self.store.list(&[]).await;
        }
        Some(response)
    }
}

impl Deref for TemplateGroupsStore {
    type Target = ResourceStore<Record>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

fn accepted(response: &Value) -> bool {
    !matches!(response, Value::Null | Value::Bool(false))
}

/// Template instances. Creation is scoped to a bot through the query string.
pub struct TemplateInstancesStore {
    store: ResourceStore<Record>,
    api: ApiClient,
}

impl TemplateInstancesStore {
    pub fn new(api: ApiClient) -> Self {
        let backend: Arc<dyn ResourceBackend<Record>> = Arc::new(RestBackend::<Record>::new(
            api.clone(),
            ResourceKind::TemplateInstances,
        ));
        Self {
            store: ResourceStore::new(backend),
            api,
        }
    }

    /// Instantiate into `bot_id` and append the server's copy to the cache.
    /// A `bot_id` inside `data` is dropped; the query string carries it.
    pub async fn create_for_bot(&self, bot_id: &str, data: &Value) -> Option<Record> {
        let mut body = data.clone();
        if let Some(fields) = body.as_object_mut() {
            fields.remove("bot_id");
        }
        let response = self.api.create_template_instance(bot_id, &body).await?;
        let instance: Record = match serde_json::from_value(response) {
            Ok(instance) => instance,
            Err(err) => {
                tracing::warn!(bot_id, error = %err, "template instance response not cached");
                return None;
            }
        };
        self.store.append(instance.clone()).await;
        Some(instance)
    }
}

impl Deref for TemplateInstancesStore {
    type Target = ResourceStore<Record>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}
