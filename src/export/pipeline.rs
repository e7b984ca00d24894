use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::format::{ExportFormat, ExportHeader, ExportItem, ItemSink, ResolvedImage};
use super::json::ExportedBoard;
use crate::board::persistence::restore_board;
use crate::board::{Board, BoardItem, BoardSnapshot};
use crate::config::{BrandingConfig, ExportConfig};
use crate::errors::{ExportError, ExportResult};
use crate::pictogram_cache::PictogramCache;

/// What an export produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub path: PathBuf,
    pub format: ExportFormat,
    pub items: usize,
    pub pages: usize,
    /// One entry per item exported with a placeholder image
    pub warnings: Vec<String>,
}

/// Writes boards to CSV, JSON or a paginated document
///
/// Output goes to a temporary file next to the destination and is renamed
/// into place only after the last byte is written, so a failed or cancelled
/// export never leaves a truncated file behind.
#[derive(Clone)]
pub struct Exporter {
    cache: PictogramCache,
    config: ExportConfig,
    branding: BrandingConfig,
}

impl Exporter {
    pub fn new(cache: PictogramCache, config: ExportConfig, branding: BrandingConfig) -> Self {
        Self {
            cache,
            config,
            branding,
        }
    }

    pub async fn export(
        &self,
        board: &BoardSnapshot,
        format: ExportFormat,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> ExportResult<ExportReport> {
        let start_time = Instant::now();
        if destination.file_name().is_none() {
            return Err(ExportError::InvalidDestination {
                path: destination.to_path_buf(),
            });
        }
        let directory = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| ExportError::io(&directory, e))?;

        info!(
            "Exporting '{}' ({} items) as {} to {}",
            board.title,
            board.len(),
            format,
            destination.display()
        );

        // removed on drop unless persisted
        let temp_file = tempfile::Builder::new()
            .prefix(".pictoboard-export-")
            .suffix(".tmp")
            .tempfile_in(&directory)
            .map_err(|e| ExportError::io(&directory, e))?;
        let file = temp_file
            .reopen()
            .map_err(|e| ExportError::io(temp_file.path(), e))?;
        let mut writer = BufWriter::new(tokio::fs::File::from_std(file));

        let mut sink = format.sink(&self.config);
        let (pages, warnings) = self
            .write_all(board, sink.as_mut(), &mut writer, destination, cancel)
            .await?;

        writer
            .shutdown()
            .await
            .map_err(|e| ExportError::io(temp_file.path(), e))?;
        drop(writer);

        temp_file
            .persist(destination)
            .map_err(|e| ExportError::io(destination, e.error))?;

        info!(
            "Export to {} completed: {} items, {} page(s), {} warning(s) in {:.2}s",
            destination.display(),
            board.len(),
            pages,
            warnings.len(),
            start_time.elapsed().as_secs_f64()
        );

        Ok(ExportReport {
            path: destination.to_path_buf(),
            format,
            items: board.len(),
            pages,
            warnings,
        })
    }

    async fn write_all<W: AsyncWrite + Unpin>(
        &self,
        board: &BoardSnapshot,
        sink: &mut dyn ItemSink,
        writer: &mut W,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> ExportResult<(usize, Vec<String>)> {
        let cancelled = || ExportError::Cancelled {
            path: destination.to_path_buf(),
        };
        let mut chunk = Vec::with_capacity(8 * 1024);
        let mut warnings = Vec::new();

        sink.begin(
            &ExportHeader {
                title: &board.title,
                branding: &self.branding,
                exported_at: Utc::now(),
                item_count: board.len(),
            },
            &mut chunk,
        )?;
        flush_chunk(writer, &mut chunk, destination).await?;

        for (index, item) in board.items.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }

            let image = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                image = self.resolve_image(index + 1, item, &mut warnings) => image,
            };

            let entry = ExportItem {
                position: index + 1,
                item,
                image: &image,
            };
            if let Some(warning) = sink.write_item(&entry, &mut chunk)? {
                warn!("{}", warning);
                warnings.push(warning);
            }
            flush_chunk(writer, &mut chunk, destination).await?;
        }

        let pages = sink.finish(&mut chunk)?;
        flush_chunk(writer, &mut chunk, destination).await?;
        Ok((pages, warnings))
    }

    /// Resolve with the per-item deadline; failures become placeholders
    async fn resolve_image(
        &self,
        position: usize,
        item: &BoardItem,
        warnings: &mut Vec<String>,
    ) -> ResolvedImage {
        if let Some(path) = &item.image_path {
            return self.read_local_image(position, item, path, warnings).await;
        }
        let Some(id) = item.pictogram_id else {
            return ResolvedImage::NoImage;
        };

        match self
            .cache
            .resolve_with_timeout(id, self.config.resolve_timeout)
            .await
        {
            Ok(bytes) => {
                let reference = self
                    .cache
                    .entry(id)
                    .and_then(|entry| entry.local_path)
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| format!("pictogram:{id}"));
                debug!("Resolved pictogram {} for item {}", id, position);
                ResolvedImage::Available { reference, bytes }
            }
            Err(e) => {
                let warning = format!(
                    "Item {} '{}': pictogram {} replaced by placeholder: {}",
                    position, item.label, id, e
                );
                warn!("{}", warning);
                warnings.push(warning);
                ResolvedImage::Placeholder {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Read an item's local image under the same deadline as pictograms
    async fn read_local_image(
        &self,
        position: usize,
        item: &BoardItem,
        path: &Path,
        warnings: &mut Vec<String>,
    ) -> ResolvedImage {
        let read = tokio::time::timeout(self.config.resolve_timeout, tokio::fs::read(path)).await;
        let reason = match read {
            Ok(Ok(bytes)) => {
                debug!("Read local image {} for item {}", path.display(), position);
                return ResolvedImage::Available {
                    reference: path.display().to_string(),
                    bytes: bytes.into(),
                };
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.config.resolve_timeout),
        };

        let warning = format!(
            "Item {} '{}': image {} replaced by placeholder: {}",
            position,
            item.label,
            path.display(),
            reason
        );
        warn!("{}", warning);
        warnings.push(warning);
        ResolvedImage::Placeholder { reason }
    }
}

async fn flush_chunk<W: AsyncWrite + Unpin>(
    writer: &mut W,
    chunk: &mut Vec<u8>,
    destination: &Path,
) -> ExportResult<()> {
    if !chunk.is_empty() {
        writer
            .write_all(chunk)
            .await
            .map_err(|e| ExportError::io(destination, e))?;
        chunk.clear();
    }
    Ok(())
}

/// Rebuild a board from a JSON export
pub async fn import_json(path: &Path, max_items: usize) -> ExportResult<Board> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|e| ExportError::io(path, e))?;
    let exported: ExportedBoard =
        serde_json::from_slice(&content).map_err(|e| ExportError::Import {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let items = exported
        .items
        .into_iter()
        .map(|item| item.into_board_item())
        .collect();
    let board = restore_board(exported.title, items, max_items).map_err(|message| {
        ExportError::Import {
            path: path.to_path_buf(),
            message,
        }
    })?;

    info!(
        "Imported board '{}' ({} items) from {}",
        board.title(),
        board.len(),
        path.display()
    );
    Ok(board)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::NewItem;
    use crate::errors::FetchResult;
    use crate::pictogram_cache::{EvictionPolicy, PictogramSource, RetryPolicy};
    use crate::PictogramId;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::NaiveTime;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    /// Serves a tiny PNG header for every id except the slow ones
    struct SlowSource {
        slow: Vec<PictogramId>,
    }

    #[async_trait]
    impl PictogramSource for SlowSource {
        async fn fetch(&self, id: PictogramId) -> FetchResult<Bytes> {
            if self.slow.contains(&id) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok(Bytes::from_static(b"\x89PNG\r\n\x1a\n0000"))
        }

        fn locate(&self, id: PictogramId) -> String {
            format!("test://{id}")
        }
    }

    fn exporter(dir: &TempDir, slow: Vec<PictogramId>) -> Exporter {
        let cache = PictogramCache::new(
            dir.path().join("cache"),
            Arc::new(SlowSource { slow }),
            RetryPolicy::fixed(3, Duration::from_secs(1)),
            EvictionPolicy {
                max_bytes: u64::MAX,
                max_age: None,
            },
        );
        let config = ExportConfig {
            resolve_timeout: Duration::from_millis(100),
            ..ExportConfig::default()
        };
        Exporter::new(cache, config, BrandingConfig::default())
    }

    fn board() -> Board {
        let mut board = Board::new("Morning, \"early\"");
        board
            .push(
                NewItem::new("Wake up")
                    .with_pictogram(11)
                    .with_time(NaiveTime::from_hms_opt(7, 0, 0).unwrap()),
            )
            .unwrap();
        board
            .push(NewItem::new("Breakfast").with_pictogram(22).with_duration(20))
            .unwrap();
        board.push(NewItem::new("Free play")).unwrap();
        board
    }

    fn visible_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_csv_export_writes_all_items() {
        let dir = TempDir::new().unwrap();
        let exporter = exporter(&dir, vec![]);
        let destination = dir.path().join("out").join("board.csv");

        let report = exporter
            .export(
                &board().snapshot(),
                ExportFormat::Csv,
                &destination,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.items, 3);
        assert_eq!(report.pages, 1);
        assert!(report.warnings.is_empty());

        let content = std::fs::read_to_string(&destination).unwrap();
        assert!(content.contains("# Board: Morning, \"early\""));
        assert!(content.contains("position,label,category,pictogram_id,image,time,duration_minutes,done"));
        assert!(content.contains("1,Wake up,,11,"));
        assert!(content.contains(",07:00,,false\r\n"));
        assert!(content.contains("3,Free play,,,,,,false\r\n"));
        assert_eq!(visible_files(&dir.path().join("out")), vec!["board.csv"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_slow_pictogram_becomes_placeholder_with_warning() {
        let dir = TempDir::new().unwrap();
        let exporter = exporter(&dir, vec![22]);
        let destination = dir.path().join("board.json");

        let report = exporter
            .export(
                &board().snapshot(),
                ExportFormat::Json,
                &destination,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.items, 3);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("Breakfast"));
        assert!(logs_contain("replaced by placeholder"));

        let exported: ExportedBoard =
            serde_json::from_slice(&std::fs::read(&destination).unwrap()).unwrap();
        assert_eq!(exported.items.len(), 3);
        assert_eq!(exported.items[1].image, "placeholder");
        assert!(exported.items[0].image.ends_with(".png"));
        assert_eq!(exported.items[2].image, "");
    }

    #[tokio::test]
    async fn test_cancelled_export_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let exporter = exporter(&dir, vec![11, 22]);
        let out_dir = dir.path().join("out");
        let destination = out_dir.join("board.html");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = exporter
            .export(
                &board().snapshot(),
                ExportFormat::Document,
                &destination,
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(ExportError::Cancelled { .. })));
        assert!(!destination.exists());
        assert!(visible_files(&out_dir).is_empty());
    }

    #[tokio::test]
    async fn test_existing_file_survives_failed_export() {
        let dir = TempDir::new().unwrap();
        let exporter = exporter(&dir, vec![]);
        let destination = dir.path().join("board.csv");
        std::fs::write(&destination, "previous export").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = exporter
            .export(&board().snapshot(), ExportFormat::Csv, &destination, &cancel)
            .await;

        assert!(result.is_err());
        assert_eq!(
            std::fs::read_to_string(&destination).unwrap(),
            "previous export"
        );
    }

    #[tokio::test]
    async fn test_json_export_imports_back() {
        let dir = TempDir::new().unwrap();
        let exporter = exporter(&dir, vec![]);
        let destination = dir.path().join("board.json");
        let original = board();

        exporter
            .export(
                &original.snapshot(),
                ExportFormat::Json,
                &destination,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let imported = import_json(&destination, 200).await.unwrap();
        assert_eq!(imported.title(), original.title());
        assert_eq!(imported.items(), original.items());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_local_images_export_and_import_back() {
        let dir = TempDir::new().unwrap();
        let exporter = exporter(&dir, vec![]);
        let photo = dir.path().join("grandma.png");
        std::fs::write(&photo, b"\x89PNG\r\n\x1a\nphoto").unwrap();
        let missing = dir.path().join("deleted.jpg");

        let mut original = Board::new("Visit");
        original
            .push(NewItem::new("Grandma").with_image_path(&photo))
            .unwrap();
        original
            .push(NewItem::new("Park").with_image_path(&missing))
            .unwrap();

        let csv_path = dir.path().join("visit.csv");
        let report = exporter
            .export(
                &original.snapshot(),
                ExportFormat::Csv,
                &csv_path,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("deleted.jpg"));
        assert!(logs_contain("replaced by placeholder"));
        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert!(csv.contains(&format!("1,Grandma,,,{},", photo.display())));
        assert!(csv.contains("2,Park,,,placeholder,"));

        let json_path = dir.path().join("visit.json");
        exporter
            .export(
                &original.snapshot(),
                ExportFormat::Json,
                &json_path,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let imported = import_json(&json_path, 200).await.unwrap();
        assert_eq!(imported.items(), original.items());
        assert_eq!(imported.items()[1].image_path.as_deref(), Some(missing.as_path()));
    }

    #[tokio::test]
    async fn test_import_rejects_board_over_limit() {
        let dir = TempDir::new().unwrap();
        let exporter = exporter(&dir, vec![]);
        let destination = dir.path().join("board.json");

        exporter
            .export(
                &board().snapshot(),
                ExportFormat::Json,
                &destination,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let result = import_json(&destination, 2).await;
        assert!(matches!(result, Err(ExportError::Import { .. })));
    }

    #[tokio::test]
    async fn test_import_rejects_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"title\": \"x\", \"items\": [").unwrap();

        let result = import_json(&path, 200).await;
        assert!(matches!(result, Err(ExportError::Import { .. })));
    }
}
