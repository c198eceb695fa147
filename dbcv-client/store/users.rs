use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{Entity, ResourceBackend, ResourceStore, RestBackend};
use crate::api::{ApiClient, ResourceKind};
use crate::auth::USERS_KEY;
use crate::storage::LocalStorage;

pub const ADMIN_ROLE: &str = "ADMIN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some(ADMIN_ROLE)
    }
}

impl Entity for User {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> Option<&str> {
        self.full_name.as_deref().or(self.email.as_deref())
    }

    fn created_at(&self) -> Option<&str> {
        self.created_at.as_deref()
    }

    fn updated_at(&self) -> Option<&str> {
        self.updated_at.as_deref()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedUsers {
    #[serde(default)]
    current_user: Option<User>,
}

/// User cache plus the signed-in user, persisted under `users` so the
/// route guard can answer admin checks offline.
pub struct UsersStore {
    store: ResourceStore<User>,
    api: ApiClient,
    storage: Arc<dyn LocalStorage>,
    current: RwLock<Option<User>>,
}

impl UsersStore {
    pub fn new(api: ApiClient) -> Self {
        let backend: Arc<dyn ResourceBackend<User>> =
            Arc::new(RestBackend::<User>::new(api.clone(), ResourceKind::Users));
        let storage = api.credentials().storage();
        Self {
            store: ResourceStore::new(backend),
            current: RwLock::new(load_current_user(storage.as_ref())),
            api,
            storage,
        }
    }

    pub async fn current_user(&self) -> Option<User> {
        self.current.read().await.clone()
    }

    pub async fn read_current_user(&self) -> Option<User> {
        let user: User = self.api.safe_call(self.api.get_json("/users/me", &[])).await?;
        self.set_current(Some(user.clone())).await;
        Some(user)
    }

    async fn set_current(&self, user: Option<User>) {
        let persisted = PersistedUsers {
            current_user: user.clone(),
        };
        match serde_json::to_string(&persisted) {
            Ok(json) => {
                if let Err(e) = self.storage.set(USERS_KEY, &json) {
                    tracing::warn!(error = %e, "failed to persist current user");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize current user"),
        }
        *self.current.write().await = user;
    }
}

/// The cached user from local storage; unreadable data counts as absent.
pub fn load_current_user(storage: &dyn LocalStorage) -> Option<User> {
    let raw = storage.get(USERS_KEY)?;
    match serde_json::from_str::<PersistedUsers>(&raw) {
        Ok(p) => p.current_user,
        Err(e) => {
            tracing::warn!(error = %e, "error parsing cached user data");
            None
        }
    }
}

impl Deref for UsersStore {
    type Target = ResourceStore<User>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}
