use std::ops::Deref;
use std::sync::Arc;

use reqwest::multipart::{Form, Part};

use super::{Bot, ResourceBackend, ResourceStore, RestBackend};
use crate::api::{ApiClient, ResourceKind};

/// Bot cache plus the bot-only import/export endpoints.
pub struct BotsStore {
    store: ResourceStore<Bot>,
    api: ApiClient,
}

impl BotsStore {
    pub fn new(api: ApiClient) -> Self {
        let backend: Arc<dyn ResourceBackend<Bot>> =
            Arc::new(RestBackend::<Bot>::new(api.clone(), ResourceKind::Bots));
        Self::with_backend(api, backend)
    }

    pub fn with_backend(api: ApiClient, backend: Arc<dyn ResourceBackend<Bot>>) -> Self {
        Self {
            store: ResourceStore::new(backend),
            api,
        }
    }

    /// Upload an exported bot. With `target_bot_id` the server replaces that
    /// bot's structure and the cached entry is swapped; otherwise a new bot
    /// is appended.
    pub async fn import_bot(
        &self,
        file_name: &str,
        content: Vec<u8>,
        target_bot_id: Option<&str>,
    ) -> Option<Bot> {
        let path = match target_bot_id {
            Some(target) => format!(
                "/bots/import?target_bot_id={}",
                crate::socket::encode_component(target)
            ),
            None => "/bots/import".to_string(),
        };
        let form = Form::new().part(
            "file",
            Part::bytes(content).file_name(file_name.to_string()),
        );
        let bot: Bot = self
            .api
            .safe_call(self.api.post_multipart(&path, form))
            .await?;
        self.absorb_import(target_bot_id, bot.clone()).await;
        Some(bot)
    }

    async fn absorb_import(&self, target_bot_id: Option<&str>, bot: Bot) {
        match target_bot_id {
            Some(target) => {
                self.store.splice(target, bot).await;
            }
            None => self.store.append(bot).await,
        }
    }

    /// Raw JSON export of a bot, suitable for writing to `bot-{id}.json`.
    pub async fn export_bot(&self, bot_id: &str) -> Option<Vec<u8>> {
        let path = format!("/bots/export/{}", crate::socket::encode_component(bot_id));
        self.api.safe_call(self.api.get_bytes(&path)).await
    }

    pub fn export_file_name(bot_id: &str) -> String {
        format!("bot-{bot_id}.json")
    }
}

impl Deref for BotsStore {
    type Target = ResourceStore<Bot>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{record, FakeBackend};

    fn store() -> BotsStore {
        let (api, _) = crate::api::tests::test_client();
        let backend = FakeBackend::with(vec![record("b1", "Support"), record("b2", "Sales")]);
        BotsStore::with_backend(api, backend)
    }

    #[tokio::test]
    async fn test_import_into_target_replaces_in_place() {
        let bots = store();
        bots.list(&[]).await.unwrap();

        bots.absorb_import(Some("b1"), record("b1", "Support v2")).await;

        let items = bots.items().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name.as_deref(), Some("Support v2"));
    }

    #[tokio::test]
    async fn test_import_without_target_appends() {
        let bots = store();
        bots.list(&[]).await.unwrap();

        bots.absorb_import(None, record("b3", "Imported")).await;

        let items = bots.items().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].id, "b3");
    }

    #[test]
    fn test_export_file_name() {
        assert_eq!(BotsStore::export_file_name("42"), "bot-42.json");
    }
}
