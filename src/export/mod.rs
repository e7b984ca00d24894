//! Board export
//!
//! A [`BoardSnapshot`](crate::board::BoardSnapshot) is streamed item by item
//! through an [`ItemSink`] for the chosen [`ExportFormat`]. Each pictogram is
//! resolved through the cache under a per-item deadline; an item whose image
//! cannot be resolved in time is still exported, with a placeholder and a
//! warning in the [`ExportReport`]. JSON exports can be read back with
//! [`import_json`].

pub mod csv;
pub mod document;
pub mod format;
pub mod json;
pub mod pipeline;

pub use csv::{CSV_COLUMNS, CsvSink};
pub use document::DocumentSink;
pub use format::{ExportFormat, ExportHeader, ExportItem, ItemSink, ResolvedImage};
pub use json::{ExportMetadata, ExportedBoard, ExportedItem, JSON_FORMAT_VERSION, JsonSink};
pub use pipeline::{ExportReport, Exporter, import_json};
