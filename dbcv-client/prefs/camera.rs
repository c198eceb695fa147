use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{load_json, store_json};
use crate::storage::LocalStorage;

pub const MAX_CAMERA_POSITIONS: usize = 8;
const CAMERA_POSITIONS_KEY: &str = "vueflow_camera_positions";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CameraPosition {
    #[serde(flatten)]
    viewport: Viewport,
    bot_id: String,
    #[serde(default)]
    timestamp: i64,
}

/// Last graph-editor viewport per bot, bounded to the most recent eight.
pub struct CameraPositions {
    storage: Arc<dyn LocalStorage>,
}

impl CameraPositions {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self { storage }
    }

    fn all(&self) -> HashMap<String, CameraPosition> {
        load_json(self.storage.as_ref(), CAMERA_POSITIONS_KEY).unwrap_or_default()
    }

    pub fn save(&self, bot_id: &str, viewport: Viewport) {
        self.save_at(bot_id, viewport, Utc::now().timestamp_millis());
    }

    fn save_at(&self, bot_id: &str, viewport: Viewport, timestamp: i64) {
        let mut all = self.all();
        all.insert(
            bot_id.to_string(),
            CameraPosition {
                viewport,
                bot_id: bot_id.to_string(),
                timestamp,
            },
        );
        store_json(self.storage.as_ref(), CAMERA_POSITIONS_KEY, &all);
    }

    pub fn load(&self, bot_id: &str) -> Option<Viewport> {
        self.all()
            .remove(bot_id)
            .filter(|p| p.bot_id == bot_id)
            .map(|p| p.viewport)
    }

    /// Keep only the `MAX_CAMERA_POSITIONS` most recently saved entries.
    pub fn cleanup(&self) {
        let all = self.all();
        if all.len() <= MAX_CAMERA_POSITIONS {
            return;
        }
        let mut entries: Vec<(String, CameraPosition)> = all.into_iter().collect();
        entries.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp));
        entries.truncate(MAX_CAMERA_POSITIONS);
        let kept: HashMap<String, CameraPosition> = entries.into_iter().collect();
        store_json(self.storage.as_ref(), CAMERA_POSITIONS_KEY, &kept);
    }

    /// Restore the bot's viewport (if any) and prune old entries.
    pub fn init(&self, bot_id: &str) -> Option<Viewport> {
        let viewport = self.load(bot_id);
        self.cleanup();
        viewport
    }

    pub fn len(&self) -> usize {
        self.all().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
