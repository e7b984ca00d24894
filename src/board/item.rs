use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::order_key::OrderKey;
use crate::PictogramId;

/// One card on a board
///
/// The picture is either `pictogram_id`, a reference into the pictogram
/// cache, or `image_path`, a local file such as a picture library import.
/// At most one of the two is set; the board never owns image data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardItem {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pictogram_id: Option<PictogramId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
    pub label: String,
    pub order_key: OrderKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub done: bool,
}

/// Item content supplied on insert; the board assigns id and order key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewItem {
    pub label: String,
    pub pictogram_id: Option<PictogramId>,
    pub image_path: Option<PathBuf>,
    pub category: Option<String>,
    pub time: Option<NaiveTime>,
    pub duration_minutes: Option<u32>,
}

impl NewItem {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn with_pictogram(mut self, pictogram_id: PictogramId) -> Self {
        self.pictogram_id = Some(pictogram_id);
        self.image_path = None;
        self
    }

    /// Use a local image file instead of a pictogram
    pub fn with_image_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(path.into());
        self.pictogram_id = None;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_time(mut self, time: NaiveTime) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    pub(crate) fn into_item(self, order_key: OrderKey) -> BoardItem {
        BoardItem {
            id: Uuid::new_v4(),
            pictogram_id: self.pictogram_id,
            image_path: self.image_path,
            label: self.label,
            order_key,
            category: self.category,
            time: self.time,
            duration_minutes: self.duration_minutes,
            done: false,
        }
    }
}

/// Partial edit; `None` leaves a field unchanged, `Some(None)` clears it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemUpdate {
    pub label: Option<String>,
    pub pictogram_id: Option<Option<PictogramId>>,
    pub image_path: Option<Option<PathBuf>>,
    pub category: Option<Option<String>>,
    pub time: Option<Option<NaiveTime>>,
    pub duration_minutes: Option<Option<u32>>,
}

impl ItemUpdate {
    pub(crate) fn apply(self, item: &mut BoardItem) {
        if let Some(label) = self.label {
            item.label = label;
        }
        if let Some(pictogram_id) = self.pictogram_id {
            if pictogram_id.is_some() {
                item.image_path = None;
            }
            item.pictogram_id = pictogram_id;
        }
        if let Some(image_path) = self.image_path {
            if image_path.is_some() {
                item.pictogram_id = None;
            }
            item.image_path = image_path;
        }
        if let Some(category) = self.category {
            item.category = category;
        }
        if let Some(time) = self.time {
            item.time = time;
        }
        if let Some(duration_minutes) = self.duration_minutes {
            item.duration_minutes = duration_minutes;
        }
    }
}
