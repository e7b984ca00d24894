//! Write-then-rename file replacement
//!
//! Readers either see the previous file or the complete new one, never a
//! partially written file.

use std::io;
use std::path::{Path, PathBuf};

/// Atomically replace `path` with `contents`, creating parent directories
pub async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let temp_path = temp_sibling(path);
    tokio::fs::write(&temp_path, contents).await?;

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }
    Ok(())
}

/// Unique temporary path next to `path` (same filesystem, so rename is atomic)
pub fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_atomic_replaces_and_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("board.json");

        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"second");
        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_temp_sibling_is_hidden_and_unique() {
        let path = Path::new("/tmp/export.csv");
        let a = temp_sibling(path);
        let b = temp_sibling(path);
        assert_ne!(a, b);
        assert_eq!(a.parent(), path.parent());
        assert!(a.file_name().unwrap().to_string_lossy().starts_with(".export.csv."));
    }
}
