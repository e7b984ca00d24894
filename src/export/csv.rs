//! CSV export
//!
//! Branding goes into leading `#` comment lines, followed by one header row
//! and one row per item. Fields are quoted per RFC 4180 when needed.

use super::format::{ExportHeader, ExportItem, ItemSink};
use crate::errors::ExportResult;

pub const CSV_COLUMNS: [&str; 8] = [
    "position",
    "label",
    "category",
    "pictogram_id",
    "image",
    "time",
    "duration_minutes",
    "done",
];

#[derive(Debug, Default)]
pub struct CsvSink;

impl CsvSink {
    pub fn new() -> Self {
        Self
    }
}

impl ItemSink for CsvSink {
    fn begin(&mut self, header: &ExportHeader<'_>, out: &mut Vec<u8>) -> ExportResult<()> {
        let branding = header.branding;
        for line in [
            format!("{} {}", branding.app_name, branding.version),
            format!("Author: {}", branding.author),
            format!("Board: {}", header.title),
            format!("Exported: {}", header.exported_at.to_rfc3339()),
            branding.attribution.clone(),
        ] {
            // comment lines must stay single-line
            let line = line.replace(['\r', '\n'], " ");
            out.extend_from_slice(b"# ");
            out.extend_from_slice(line.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        write_record(out, CSV_COLUMNS.iter().copied());
        Ok(())
    }

    fn write_item(
        &mut self,
        entry: &ExportItem<'_>,
        out: &mut Vec<u8>,
    ) -> ExportResult<Option<String>> {
        let item = entry.item;
        let position = entry.position.to_string();
        let pictogram_id = item.pictogram_id.map(|id| id.to_string()).unwrap_or_default();
        let time = item
            .time
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_default();
        let duration = item
            .duration_minutes
            .map(|d| d.to_string())
            .unwrap_or_default();

        write_record(
            out,
            [
                position.as_str(),
                item.label.as_str(),
                item.category.as_deref().unwrap_or(""),
                pictogram_id.as_str(),
                entry.image.reference(),
                time.as_str(),
                duration.as_str(),
                if item.done { "true" } else { "false" },
            ],
        );
        Ok(None)
    }

    fn finish(&mut self, _out: &mut Vec<u8>) -> ExportResult<usize> {
        Ok(1)
    }
}

fn write_record<'a>(out: &mut Vec<u8>, fields: impl IntoIterator<Item = &'a str>) {
    for (index, field) in fields.into_iter().enumerate() {
        if index > 0 {
            out.push(b',');
        }
        write_field(out, field);
    }
    out.extend_from_slice(b"\r\n");
}

fn write_field(out: &mut Vec<u8>, field: &str) {
    if field.contains([',', '"', '\r', '\n']) {
        out.push(b'"');
        out.extend_from_slice(field.replace('"', "\"\"").as_bytes());
        out.push(b'"');
    } else {
        out.extend_from_slice(field.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("plain", "plain")]
    #[case("a,b", "\"a,b\"")]
    #[case("say \"hi\"", "\"say \"\"hi\"\"\"")]
    #[case("two\nlines", "\"two\nlines\"")]
    #[case("", "")]
    fn test_field_quoting(#[case] input: &str, #[case] expected: &str) {
        let mut out = Vec::new();
        write_field(&mut out, input);
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }
}
