use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{Entity, ResourceBackend, ResourceStore, RestBackend};
use crate::api::{ApiClient, ResourceKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Entity for Credential {
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

/// Credentials of a single bot.
pub struct CredentialsStore {
    store: ResourceStore<Credential>,
    api: ApiClient,
    bot_id: String,
}

impl CredentialsStore {
    pub fn for_bot(api: ApiClient, bot_id: &str) -> Self {
        let kind = ResourceKind::Credentials {
            bot_id: bot_id.to_string(),
        };
        let backend: Arc<dyn ResourceBackend<Credential>> =
            Arc::new(RestBackend::<Credential>::new(api.clone(), kind));
        Self::with_backend(api, bot_id, backend)
    }

    pub fn with_backend(
        api: ApiClient,
        bot_id: &str,
        backend: Arc<dyn ResourceBackend<Credential>>,
    ) -> Self {
        Self {
            store: ResourceStore::new(backend),
            api,
            bot_id: bot_id.to_string(),
        }
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    /// Mark `credential_id` as the default for its provider+strategy pair.
    pub async fn make_default(&self, credential_id: &str) -> Option<Credential> {
        let path = format!(
            "{}/make-default",
            ResourceKind::Credentials {
                bot_id: self.bot_id.clone(),
            }
            .item_path(credential_id)
        );
        let updated: Credential = self
            .api
            .safe_call(self.api.post_json(&path, &json!({})))
            .await?;
        self.absorb_default(credential_id, updated.clone()).await;
        Some(updated)
    }

    /// Siblings sharing provider and strategy lose their default flag, then
    /// the target takes the server's copy. Unknown targets change nothing.
    async fn absorb_default(&self, credential_id: &str, updated: Credential) {
        let Some(target) = self.store.get(credential_id).await else {
            tracing::debug!(credential_id, "default credential not cached");
            return;
        };
        self.store
            .modify_all(|c| {
                if c.provider == target.provider && c.strategy == target.strategy {
                    c.is_default = false;
                }
            })
            .await;
        self.store.splice(credential_id, updated).await;
    }
}

impl Deref for CredentialsStore {
    type Target = ResourceStore<Credential>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn cred(id: &str, provider: &str, strategy: &str, is_default: bool) -> Credential {
        Credential {
            id: id.to_string(),
            provider: provider.to_string(),
            strategy: strategy.to_string(),
            is_default,
            name: None,
            created_at: None,
            updated_at: None,
            fields: Map::new(),
        }
    }

    struct ListOnly(Vec<Credential>);

    #[async_trait]
    impl ResourceBackend<Credential> for ListOnly {
        async fn list(&self, _params: &[(String, String)]) -> Option<Vec<Credential>> {
            Some(self.0.clone())
        }
        async fn create(&self, _data: &Value) -> Option<Credential> {
            None
        }
        async fn read(&self, _id: &str) -> Option<Credential> {
            None
        }
        async fn update(&self, _id: &str, _patch: &Value) -> Option<Credential> {
            None
        }
        async fn delete(&self, _id: &str) -> Option<Value> {
            None
        }
    }

    #[tokio::test]
    async fn test_make_default_clears_siblings_of_same_provider_and_strategy() {
        let (api, _) = crate::api::tests::test_client();
        let store = CredentialsStore::with_backend(
            api,
            "bot-1",
            Arc::new(ListOnly(vec![
                cred("c1", "openai", "api_key", true),
                cred("c2", "openai", "api_key", false),
                cred("c3", "openai", "oauth", true),
                cred("c4", "telegram", "api_key", true),
            ])),
        );
        store.list(&[]).await.unwrap();

        store
            .absorb_default("c2", cred("c2", "openai", "api_key", true))
            .await;

        let flags: Vec<(String, bool)> = store
            .items()
            .await
            .into_iter()
            .map(|c| (c.id, c.is_default))
            .collect();
        assert_eq!(
            flags,
            vec![
                ("c1".to_string(), false),
                ("c2".to_string(), true),
                ("c3".to_string(), true),
                ("c4".to_string(), true),
            ]
        );
    }

    #[tokio::test]
    async fn test_make_default_for_uncached_credential_changes_nothing() {
        let (api, _) = crate::api::tests::test_client();
        let store = CredentialsStore::with_backend(
            api,
            "bot-1",
            Arc::new(ListOnly(vec![cred("c1", "openai", "api_key", true)])),
        );
        store.list(&[]).await.unwrap();

        store
            .absorb_default("ghost", cred("ghost", "openai", "api_key", true))
            .await;

        assert!(store.items().await[0].is_default);
    }
}
