pub mod guard;

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::api::ApiClient;
use crate::storage::LocalStorage;

pub const TOKEN_KEY: &str = "accessToken";
pub const USERS_KEY: &str = "users";

/// The bearer credential shared by the REST client and the socket managers.
/// Persisted under `accessToken` so a restart keeps the login.
pub struct Credentials {
    storage: Arc<dyn LocalStorage>,
    token: RwLock<Option<String>>,
}

impl Credentials {
    pub fn load(storage: Arc<dyn LocalStorage>) -> Arc<Self> {
        let token = storage.get(TOKEN_KEY).filter(|t| !t.is_empty());
        Arc::new(Self {
            storage,
            token: RwLock::new(token),
        })
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub fn set(&self, token: &str) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token.to_string());
        if let Err(e) = self.storage.set(TOKEN_KEY, token) {
            tracing::warn!(error = %e, "failed to persist access token");
        }
    }

    /// Drop the credential and the cached current user.
    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = None;
        for key in [TOKEN_KEY, USERS_KEY] {
            if let Err(e) = self.storage.remove(key) {
                tracing::warn!(key, error = %e, "failed to clear persisted auth state");
            }
        }
    }

    pub fn storage(&self) -> Arc<dyn LocalStorage> {
        self.storage.clone()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Password-grant login against `/login/access-token`.
#[derive(Clone)]
pub struct AuthStore {
    api: ApiClient,
    credentials: Arc<Credentials>,
}

impl AuthStore {
    pub fn new(api: ApiClient, credentials: Arc<Credentials>) -> Self {
        Self { api, credentials }
    }

    pub async fn login(&self, username: &str, password: &str) -> Option<TokenResponse> {
        let form = [
            ("grant_type", "password"),
            ("username", username),
            ("password", password),
            ("scope", ""),
        ];
        let response: TokenResponse = self
            .api
            .safe_call(self.api.post_form("/login/access-token", &form))
            .await?;
        self.credentials.set(&response.access_token);
        tracing::info!(username, "logged in");
        Some(response)
    }

    pub fn logout(&self) {
        self.credentials.clear();
        tracing::info!("logged out");
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_authenticated()
    }
}
