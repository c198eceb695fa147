pub mod camera;
pub mod recent;
pub mod sorting;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::storage::LocalStorage;

/// Read a JSON value from storage; missing or corrupt data yields `None`.
fn load_json<T: DeserializeOwned>(storage: &dyn LocalStorage, key: &str) -> Option<T> {
    let raw = storage.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding unreadable stored value");
            None
        }
    }
}

fn store_json<T: Serialize>(storage: &dyn LocalStorage, key: &str, value: &T) {
    let json = match serde_json::to_string(value) {
        Ok(j) => j,
        Err(e) => {
            tracing::error!(key, error = %e, "failed to serialize stored value");
            return;
        }
    };
    if let Err(e) = storage.set(key, &json) {
        tracing::warn!(key, error = %e, "failed to persist stored value");
    }
}
