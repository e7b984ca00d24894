//! JSON export and import
//!
//! The document is written incrementally: header and metadata first, then
//! one item object per call, then the closing brackets.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::format::{ExportHeader, ExportItem, ItemSink};
use crate::PictogramId;
use crate::board::{BoardItem, OrderKey};
use crate::errors::ExportResult;

pub const JSON_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub app: String,
    pub version: String,
    pub author: String,
    pub attribution: String,
    pub exported_at: DateTime<Utc>,
    pub format_version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedItem {
    pub id: Uuid,
    pub position: usize,
    pub label: String,
    pub category: Option<String>,
    pub pictogram_id: Option<PictogramId>,
    /// Local image file the item was built from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
    pub image: String,
    pub order_key: OrderKey,
    pub time: Option<NaiveTime>,
    pub duration_minutes: Option<u32>,
    pub done: bool,
}

impl ExportedItem {
    fn from_export(entry: &ExportItem<'_>) -> Self {
        let item = entry.item;
        Self {
            id: item.id,
            position: entry.position,
            label: item.label.clone(),
            category: item.category.clone(),
            pictogram_id: item.pictogram_id,
            image_path: item.image_path.clone(),
            image: entry.image.reference().to_string(),
            order_key: item.order_key,
            time: item.time,
            duration_minutes: item.duration_minutes,
            done: item.done,
        }
    }

    pub fn into_board_item(self) -> BoardItem {
        BoardItem {
            id: self.id,
            pictogram_id: self.pictogram_id,
            image_path: self.image_path,
            label: self.label,
            order_key: self.order_key,
            category: self.category,
            time: self.time,
            duration_minutes: self.duration_minutes,
            done: self.done,
        }
    }
}

/// Shape of a complete JSON export, used when reading one back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedBoard {
    pub title: String,
    pub metadata: ExportMetadata,
    pub items: Vec<ExportedItem>,
}

#[derive(Debug, Default)]
pub struct JsonSink {
    written: usize,
}

impl JsonSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ItemSink for JsonSink {
    fn begin(&mut self, header: &ExportHeader<'_>, out: &mut Vec<u8>) -> ExportResult<()> {
        let metadata = ExportMetadata {
            app: header.branding.app_name.clone(),
            version: header.branding.version.clone(),
            author: header.branding.author.clone(),
            attribution: header.branding.attribution.clone(),
            exported_at: header.exported_at,
            format_version: JSON_FORMAT_VERSION,
        };

        out.extend_from_slice(b"{\n  \"title\": ");
        serde_json::to_writer(&mut *out, header.title)?;
        out.extend_from_slice(b",\n  \"metadata\": ");
        serde_json::to_writer(&mut *out, &metadata)?;
        out.extend_from_slice(b",\n  \"items\": [");
        Ok(())
    }

    fn write_item(
        &mut self,
        entry: &ExportItem<'_>,
        out: &mut Vec<u8>,
    ) -> ExportResult<Option<String>> {
        if self.written > 0 {
            out.push(b',');
        }
        out.extend_from_slice(b"\n    ");
        serde_json::to_writer(&mut *out, &ExportedItem::from_export(entry))?;
        self.written += 1;
        Ok(None)
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> ExportResult<usize> {
        if self.written > 0 {
            out.extend_from_slice(b"\n  ");
        }
        out.extend_from_slice(b"]\n}\n");
        Ok(1)
    }
}
