//! Board state on disk
//!
//! A single versioned JSON document, replaced atomically on every save.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::item::BoardItem;
use super::model::Board;
use crate::config::BoardConfig;
use crate::errors::{AppResult, CorruptStateError};
use crate::utils::write_atomic;

pub const BOARD_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct BoardDocument {
    version: u32,
    title: String,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
    items: Vec<BoardItem>,
}

pub struct BoardStore {
    path: PathBuf,
    max_items: usize,
}

impl BoardStore {
    pub fn new(path: impl Into<PathBuf>, max_items: usize) -> Self {
        Self {
            path: path.into(),
            max_items,
        }
    }

    pub fn from_config(config: &BoardConfig) -> Self {
        Self::new(config.state_path.clone(), config.max_items)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, board: &Board) -> AppResult<()> {
        let document = BoardDocument {
            version: BOARD_FORMAT_VERSION,
            title: board.title().to_string(),
            saved_at: Some(Utc::now()),
            items: board.items().to_vec(),
        };
        let encoded = serde_json::to_vec_pretty(&document).map_err(std::io::Error::other)?;
        write_atomic(&self.path, &encoded).await?;
        info!(
            "Saved board '{}' ({} items) to {}",
            board.title(),
            board.len(),
            self.path.display()
        );
        Ok(())
    }

    /// `Ok(None)` when nothing has been saved yet
    pub async fn load(&self) -> Result<Option<Board>, CorruptStateError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CorruptStateError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let document: BoardDocument =
            serde_json::from_slice(&content).map_err(|source| CorruptStateError::Unparseable {
                path: self.path.clone(),
                source,
            })?;

        if document.version != BOARD_FORMAT_VERSION {
            return Err(CorruptStateError::UnsupportedVersion {
                path: self.path.clone(),
                version: document.version,
            });
        }

        let board = restore_board(document.title, document.items, self.max_items).map_err(
            |message| CorruptStateError::Inconsistent {
                path: self.path.clone(),
                message,
            },
        )?;
        Ok(Some(board))
    }

    /// Load, falling back to an empty board; the error is handed back so the
    /// caller can tell the user their saved board was discarded
    pub async fn load_or_empty(&self, title: &str) -> (Board, Option<CorruptStateError>) {
        match self.load().await {
            Ok(Some(board)) => (board, None),
            Ok(None) => (Board::with_capacity(title, self.max_items), None),
            Err(e) => {
                warn!("Starting with an empty board: {}", e);
                (Board::with_capacity(title, self.max_items), Some(e))
            }
        }
    }
}

/// Rebuild a board from stored items, rejecting duplicate ids or keys and
/// items with more than one image reference
pub(crate) fn restore_board(
    title: String,
    mut items: Vec<BoardItem>,
    max_items: usize,
) -> Result<Board, String> {
    if items.len() > max_items {
        return Err(format!(
            "{} items exceed the board limit of {}",
            items.len(),
            max_items
        ));
    }

    let mut ids = HashSet::with_capacity(items.len());
    for item in &items {
        if !ids.insert(item.id) {
            return Err(format!("duplicate item id {}", item.id));
        }
        if let Some(path) = &item.image_path {
            if path.as_os_str().is_empty() {
                return Err(format!("item '{}' has an empty image path", item.label));
            }
            if let Some(id) = item.pictogram_id {
                return Err(format!(
                    "item '{}' references both pictogram {} and {}",
                    item.label,
                    id,
                    path.display()
                ));
            }
        }
    }

    items.sort_by_key(|item| item.order_key);
    if let Some(pair) = items
        .windows(2)
        .find(|pair| pair[0].order_key == pair[1].order_key)
    {
        return Err(format!(
            "items '{}' and '{}' share order key {}",
            pair[0].label, pair[1].label, pair[0].order_key
        ));
    }

    Ok(Board::from_parts(title, items, max_items))
}
