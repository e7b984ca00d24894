use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::board::NewItem;
use crate::config::LibraryConfig;
use crate::errors::{LibraryError, LibraryResult};
use crate::utils::write_atomic;

pub const LIBRARY_FORMAT_VERSION: u32 = 1;

const INDEX_FILE: &str = "library.json";
const IMAGES_DIR: &str = "images";

/// Category keys and their display names
pub const CATEGORIES: &[(&str, &str)] = &[
    ("morning", "Morning Routine"),
    ("meals", "Meals"),
    ("school", "School"),
    ("play", "Play"),
    ("hygiene", "Hygiene"),
    ("transport", "Transport"),
    ("rest", "Rest"),
    ("evening", "Evening Routine"),
    ("other", "Other"),
];

pub fn category_name(key: &str) -> Option<&'static str> {
    CATEGORIES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, name)| *name)
}

/// One imported picture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryImage {
    pub id: Uuid,
    /// File name under the library's image directory
    pub filename: String,
    pub label: String,
    pub category: String,
    /// Suggested activity length; 0 when unset
    #[serde(default)]
    pub duration_minutes: u32,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<(u32, u32)>,
    pub imported_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LibraryIndex {
    version: u32,
    images: Vec<LibraryImage>,
}

/// Imported pictures plus the JSON index that lists them
///
/// Every mutation rewrites the index atomically before returning.
pub struct PictureLibrary {
    directory: PathBuf,
    images: Vec<LibraryImage>,
}

impl PictureLibrary {
    /// Open the library in `directory`; a missing index is an empty library
    pub async fn open(directory: impl Into<PathBuf>) -> LibraryResult<Self> {
        let directory = directory.into();
        let index_path = directory.join(INDEX_FILE);

        let images = match tokio::fs::read(&index_path).await {
            Ok(content) => {
                let index: LibraryIndex = serde_json::from_slice(&content).map_err(|source| {
                    LibraryError::Unparseable {
                        path: index_path.clone(),
                        source,
                    }
                })?;
                index.images
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(LibraryError::io(&index_path, e)),
        };

        debug!(
            "Opened picture library {} ({} images)",
            directory.display(),
            images.len()
        );
        Ok(Self { directory, images })
    }

    pub async fn from_config(config: &LibraryConfig) -> LibraryResult<Self> {
        Self::open(config.directory.clone()).await
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn images(&self) -> &[LibraryImage] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&LibraryImage> {
        self.images.iter().find(|image| image.id == id)
    }

    pub fn by_category(&self, category: &str) -> Vec<&LibraryImage> {
        self.images
            .iter()
            .filter(|image| image.category == category)
            .collect()
    }

    pub fn image_path(&self, image: &LibraryImage) -> PathBuf {
        self.directory.join(IMAGES_DIR).join(&image.filename)
    }

    /// Board item content for an imported picture
    pub fn to_new_item(&self, image: &LibraryImage) -> NewItem {
        let mut item = NewItem::new(image.label.clone())
            .with_image_path(self.image_path(image))
            .with_category(image.category.clone());
        if image.duration_minutes > 0 {
            item = item.with_duration(image.duration_minutes);
        }
        item
    }

    /// Copy `source` into the library
    ///
    /// An empty label falls back to the file stem.
    pub async fn add_image(
        &mut self,
        source: &Path,
        label: &str,
        category: &str,
        duration_minutes: u32,
    ) -> LibraryResult<LibraryImage> {
        let extension = source
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let mime_type = match extension.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "svg" => "image/svg+xml",
            _ => {
                return Err(LibraryError::UnsupportedFormat {
                    path: source.to_path_buf(),
                });
            }
        };
        if category_name(category).is_none() {
            return Err(LibraryError::UnknownCategory(category.to_string()));
        }

        let data = tokio::fs::read(source)
            .await
            .map_err(|e| LibraryError::io(source, e))?;
        let dimensions = if mime_type == "image/svg+xml" {
            None
        } else {
            match image::load_from_memory(&data) {
                Ok(img) => Some((img.width(), img.height())),
                Err(e) => {
                    warn!("Could not decode {}: {}", source.display(), e);
                    None
                }
            }
        };

        let label = match label.trim() {
            "" => source
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
            label => label.to_string(),
        };

        let id = Uuid::new_v4();
        let image = LibraryImage {
            id,
            filename: format!("{id}.{extension}"),
            label,
            category: category.to_string(),
            duration_minutes,
            mime_type: mime_type.to_string(),
            dimensions,
            imported_at: Utc::now(),
        };

        let destination = self.image_path(&image);
        write_atomic(&destination, &data)
            .await
            .map_err(|e| LibraryError::io(&destination, e))?;

        self.images.push(image.clone());
        if let Err(e) = self.save().await {
            self.images.pop();
            if let Err(cleanup) = tokio::fs::remove_file(&destination).await {
                warn!("Failed to remove {}: {}", destination.display(), cleanup);
            }
            return Err(e);
        }

        info!(
            "Imported '{}' ({}) into the picture library as {}",
            image.label,
            image.category,
            image.filename
        );
        Ok(image)
    }

    /// Drop an image from the index and delete its file
    pub async fn remove_image(&mut self, id: Uuid) -> LibraryResult<LibraryImage> {
        let position = self
            .images
            .iter()
            .position(|image| image.id == id)
            .ok_or(LibraryError::NotFound(id))?;
        let image = self.images.remove(position);
        if let Err(e) = self.save().await {
            self.images.insert(position, image);
            return Err(e);
        }

        let path = self.image_path(&image);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }

        info!("Removed '{}' from the picture library", image.label);
        Ok(image)
    }

    async fn save(&self) -> LibraryResult<()> {
        let index_path = self.directory.join(INDEX_FILE);
        let index = LibraryIndex {
            version: LIBRARY_FORMAT_VERSION,
            images: self.images.clone(),
        };
        let encoded = serde_json::to_vec_pretty(&index)
            .map_err(|e| LibraryError::io(&index_path, std::io::Error::other(e)))?;
        write_atomic(&index_path, &encoded)
            .await
            .map_err(|e| LibraryError::io(&index_path, e))
    }
}
