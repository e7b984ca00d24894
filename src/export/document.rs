//! Paginated printable document
//!
//! Self-contained HTML: every page is a `<section class="page">` holding a
//! fixed `columns x rows` grid, with the branding header and attribution
//! footer repeated on each page. Print CSS breaks after every section, so
//! "print to PDF" yields one sheet per page.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use quick_xml::escape::escape;
use std::io::Cursor;

use super::format::{ExportHeader, ExportItem, ItemSink, ResolvedImage};
use crate::config::ExportConfig;
use crate::errors::ExportResult;

const STYLE: &str = r#"
  @page { size: A4; margin: 12mm; }
  body { font-family: sans-serif; margin: 0; color: #222; }
  .page { break-after: page; page-break-after: always; padding: 8mm; box-sizing: border-box; }
  .page:last-of-type { break-after: auto; page-break-after: auto; }
  .page > header { display: flex; justify-content: space-between; border-bottom: 1px solid #999; margin-bottom: 6mm; }
  .page > header h1 { font-size: 16pt; margin: 0 0 2mm 0; }
  .page > header .meta { font-size: 8pt; color: #666; text-align: right; }
  .grid { display: grid; gap: 4mm; }
  .tile { border: 1px solid #ccc; border-radius: 3mm; padding: 3mm; margin: 0; text-align: center; }
  .tile.done { opacity: 0.45; }
  .tile img, .tile .placeholder { width: 100%; aspect-ratio: 1; object-fit: contain; }
  .tile .placeholder { display: flex; align-items: center; justify-content: center; background: #e0e0e0; color: #888; font-size: 24pt; }
  .tile figcaption { font-size: 12pt; margin-top: 2mm; }
  .tile .time { display: block; font-size: 9pt; color: #666; }
  .page > footer { font-size: 7pt; color: #666; margin-top: 6mm; }
"#;

pub struct DocumentSink {
    columns: usize,
    per_page: usize,
    thumbnail_px: u32,
    written: usize,
    pages: usize,
    page_header: String,
    page_footer: String,
}

impl DocumentSink {
    pub fn new(config: &ExportConfig) -> Self {
        let columns = config.grid_columns.max(1);
        Self {
            columns,
            per_page: columns * config.grid_rows.max(1),
            thumbnail_px: config.thumbnail_px.max(1),
            written: 0,
            pages: 0,
            page_header: String::new(),
            page_footer: String::new(),
        }
    }

    fn open_page(&mut self, out: &mut Vec<u8>) {
        self.pages += 1;
        out.extend_from_slice(b"<section class=\"page\">\n");
        out.extend_from_slice(self.page_header.as_bytes());
        out.extend_from_slice(
            format!(
                "<div class=\"grid\" style=\"grid-template-columns: repeat({}, 1fr)\">\n",
                self.columns
            )
            .as_bytes(),
        );
    }

    fn close_page(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"</div>\n");
        out.extend_from_slice(self.page_footer.as_bytes());
        out.extend_from_slice(b"</section>\n");
    }

    /// PNG thumbnail as a data URI
    fn thumbnail(&self, bytes: &[u8]) -> Result<String, image::ImageError> {
        let thumbnail = image::load_from_memory(bytes)?.thumbnail(self.thumbnail_px, self.thumbnail_px);
        let mut encoded = Cursor::new(Vec::new());
        thumbnail.write_to(&mut encoded, ImageFormat::Png)?;
        Ok(format!(
            "data:image/png;base64,{}",
            STANDARD.encode(encoded.into_inner())
        ))
    }
}

impl ItemSink for DocumentSink {
    fn begin(&mut self, header: &ExportHeader<'_>, out: &mut Vec<u8>) -> ExportResult<()> {
        let branding = header.branding;
        let title = escape(header.title);

        self.page_header = format!(
            "<header><h1>{}</h1><div class=\"meta\">{} {}<br>{}<br>{}</div></header>\n",
            title,
            escape(branding.app_name.as_str()),
            escape(branding.version.as_str()),
            escape(branding.author.as_str()),
            header.exported_at.format("%Y-%m-%d %H:%M UTC"),
        );
        self.page_footer = format!(
            "<footer>{}</footer>\n",
            escape(branding.attribution.as_str())
        );

        out.extend_from_slice(
            format!(
                "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
                 <meta name=\"generator\" content=\"{} {}\">\n\
                 <meta name=\"author\" content=\"{}\">\n\
                 <title>{}</title>\n<style>{}</style>\n</head>\n<body>\n",
                escape(branding.app_name.as_str()),
                escape(branding.version.as_str()),
                escape(branding.author.as_str()),
                title,
                STYLE
            )
            .as_bytes(),
        );
        Ok(())
    }

    fn write_item(
        &mut self,
        entry: &ExportItem<'_>,
        out: &mut Vec<u8>,
    ) -> ExportResult<Option<String>> {
        if self.written % self.per_page == 0 {
            if self.written > 0 {
                self.close_page(out);
            }
            self.open_page(out);
        }
        self.written += 1;

        let item = entry.item;
        let label = escape(item.label.as_str());
        let mut warning = None;

        let picture = match entry.image {
            ResolvedImage::Available { bytes, .. } => match self.thumbnail(bytes) {
                Ok(uri) => format!("<img src=\"{uri}\" alt=\"{label}\">"),
                Err(e) => {
                    warning = Some(format!(
                        "Item {} '{}': image could not be decoded: {}",
                        entry.position, item.label, e
                    ));
                    placeholder_tile()
                }
            },
            ResolvedImage::NoImage | ResolvedImage::Placeholder { .. } => placeholder_tile(),
        };

        let time = item
            .time
            .map(|t| format!("<span class=\"time\">{}</span>", t.format("%H:%M")))
            .unwrap_or_default();
        let class = if item.done { "tile done" } else { "tile" };

        out.extend_from_slice(
            format!(
                "<figure class=\"{class}\">{picture}<figcaption>{time}{label}</figcaption></figure>\n"
            )
            .as_bytes(),
        );
        Ok(warning)
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> ExportResult<usize> {
        if self.written == 0 {
            self.open_page(out);
        }
        self.close_page(out);
        out.extend_from_slice(b"</body>\n</html>\n");
        Ok(self.pages)
    }
}

fn placeholder_tile() -> String {
    "<div class=\"placeholder\">?</div>".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BoardItem, OrderKey};
    use crate::config::BrandingConfig;
    use bytes::Bytes;
    use chrono::Utc;
    use image::{ImageBuffer, Rgba};
    use uuid::Uuid;

    fn png_bytes() -> Bytes {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(64, 64, Rgba([10, 120, 200, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        Bytes::from(out.into_inner())
    }

    fn item(label: &str, index: usize) -> BoardItem {
        BoardItem {
            id: Uuid::new_v4(),
            pictogram_id: Some(1),
            image_path: None,
            label: label.to_string(),
            order_key: OrderKey::spaced(index),
            category: None,
            time: None,
            duration_minutes: None,
            done: false,
        }
    }

    fn render(count: usize, image: ResolvedImage) -> (String, usize, Vec<String>) {
        let config = ExportConfig {
            grid_columns: 2,
            grid_rows: 2,
            thumbnail_px: 32,
            ..ExportConfig::default()
        };
        let branding = BrandingConfig::default();
        let mut sink = DocumentSink::new(&config);
        let mut out = Vec::new();
        let mut warnings = Vec::new();

        sink.begin(
            &ExportHeader {
                title: "Tom & Jerry's <day>",
                branding: &branding,
                exported_at: Utc::now(),
                item_count: count,
            },
            &mut out,
        )
        .unwrap();
        for index in 0..count {
            let board_item = item(&format!("Item {index}"), index);
            let entry = ExportItem {
                position: index + 1,
                item: &board_item,
                image: &image,
            };
            warnings.extend(sink.write_item(&entry, &mut out).unwrap());
        }
        let pages = sink.finish(&mut out).unwrap();
        (String::from_utf8(out).unwrap(), pages, warnings)
    }

    #[test]
    fn test_new_page_when_grid_is_full() {
        let (html, pages, _) = render(5, ResolvedImage::NoImage);
        assert_eq!(pages, 2);
        assert_eq!(html.matches("<section class=\"page\">").count(), 2);
        assert_eq!(html.matches("</section>").count(), 2);
        assert_eq!(html.matches("<figure").count(), 5);
        // branding repeated on every page
        assert_eq!(html.matches("<footer>").count(), 2);
    }

    #[test]
    fn test_title_is_escaped() {
        let (html, _, _) = render(1, ResolvedImage::NoImage);
        assert!(html.contains("Tom &amp; Jerry&apos;s &lt;day&gt;"));
        assert!(!html.contains("<day>"));
    }

    #[test]
    fn test_embeds_png_thumbnail() {
        let (html, _, warnings) = render(
            1,
            ResolvedImage::Available {
                reference: "1.png".to_string(),
                bytes: png_bytes(),
            },
        );
        assert!(html.contains("data:image/png;base64,"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_undecodable_image_falls_back_with_warning() {
        let (html, _, warnings) = render(
            1,
            ResolvedImage::Available {
                reference: "1.png".to_string(),
                bytes: Bytes::from_static(b"\x89PNG\r\n\x1a\ngarbage"),
            },
        );
        assert!(html.contains("class=\"placeholder\""));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_empty_board_still_has_one_page() {
        let (html, pages, _) = render(0, ResolvedImage::NoImage);
        assert_eq!(pages, 1);
        assert!(html.ends_with("</html>\n"));
    }
}
