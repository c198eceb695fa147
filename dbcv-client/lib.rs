pub mod api;
pub mod app;
pub mod assistant;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod execution;
pub mod generation;
pub mod prefs;
pub mod socket;
pub mod storage;
pub mod store;
pub mod tracking;

pub use app::AppState;
pub use error::ClientError;
