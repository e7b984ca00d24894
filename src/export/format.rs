use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::csv::CsvSink;
use super::document::DocumentSink;
use super::json::JsonSink;
use crate::board::BoardItem;
use crate::config::{BrandingConfig, ExportConfig};
use crate::errors::ExportResult;

/// Output formats the exporter can produce
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    /// Paginated printable document (self-contained HTML)
    #[strum(to_string = "document", serialize = "html")]
    Document,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Document => "html",
        }
    }

    pub(crate) fn sink(self, config: &ExportConfig) -> Box<dyn ItemSink> {
        match self {
            Self::Csv => Box::new(CsvSink::new()),
            Self::Json => Box::new(JsonSink::new()),
            Self::Document => Box::new(DocumentSink::new(config)),
        }
    }
}

/// Document-level metadata written before the first item
#[derive(Debug, Clone)]
pub struct ExportHeader<'a> {
    pub title: &'a str,
    pub branding: &'a BrandingConfig,
    pub exported_at: DateTime<Utc>,
    pub item_count: usize,
}

/// Outcome of resolving an item's pictogram for export
#[derive(Debug, Clone)]
pub enum ResolvedImage {
    NoImage,
    Available { reference: String, bytes: Bytes },
    /// Resolve failed or timed out; the item is exported without its image
    Placeholder { reason: String },
}

impl ResolvedImage {
    /// Value for the `image` column / field
    pub fn reference(&self) -> &str {
        match self {
            Self::NoImage => "",
            Self::Available { reference, .. } => reference,
            Self::Placeholder { .. } => "placeholder",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportItem<'a> {
    /// 1-based display position
    pub position: usize,
    pub item: &'a BoardItem,
    pub image: &'a ResolvedImage,
}

/// Serializer for one export format
///
/// Each call appends to `out`; the pipeline flushes `out` to the temporary
/// file after every call, so items are streamed rather than buffered whole.
pub trait ItemSink: Send {
    fn begin(&mut self, header: &ExportHeader<'_>, out: &mut Vec<u8>) -> ExportResult<()>;

    /// Returns a warning when the item could only be written in degraded form
    fn write_item(&mut self, item: &ExportItem<'_>, out: &mut Vec<u8>)
    -> ExportResult<Option<String>>;

    /// Returns the number of pages produced
    fn finish(&mut self, out: &mut Vec<u8>) -> ExportResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case("csv", ExportFormat::Csv)]
    #[case("JSON", ExportFormat::Json)]
    #[case("document", ExportFormat::Document)]
    #[case("html", ExportFormat::Document)]
    fn test_parse_format(#[case] input: &str, #[case] expected: ExportFormat) {
        assert_eq!(ExportFormat::from_str(input).unwrap(), expected);
    }

    #[test]
    fn test_display_and_extension() {
        assert_eq!(ExportFormat::Document.to_string(), "document");
        assert_eq!(ExportFormat::Document.extension(), "html");
        assert!(ExportFormat::from_str("pdf").is_err());
    }
}
