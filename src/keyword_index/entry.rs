//! Keyword records and dataset file parsing

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::PictogramId;
use crate::errors::DatasetError;

/// One localized keyword pointing at a pictogram
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordEntry {
    pub keyword: String,
    pub pictogram_id: PictogramId,
    pub locale: String,
}

/// Versioned dataset document (`.json`)
#[derive(Debug, Deserialize)]
struct DatasetDocument {
    #[serde(default)]
    version: Option<String>,
    locale: String,
    entries: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    keyword: String,
    pictogram_id: PictogramId,
    #[serde(default)]
    locale: Option<String>,
}

/// Parsed dataset ready for indexing
#[derive(Debug)]
pub struct Dataset {
    pub version: Option<String>,
    pub locale: String,
    pub entries: Vec<KeywordEntry>,
}

impl Dataset {
    /// Read a dataset file; `.jsonl` is one entry per line, anything else a JSON document
    pub fn read(path: &Path, locale: &str) -> Result<Self, DatasetError> {
        let content = std::fs::read_to_string(path).map_err(|source| DatasetError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let is_lines = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jsonl"));

        if is_lines {
            Self::parse_lines(path, &content, locale)
        } else {
            Self::parse_document(path, &content, locale)
        }
    }

    pub fn parse_document(path: &Path, content: &str, locale: &str) -> Result<Self, DatasetError> {
        let document: DatasetDocument =
            serde_json::from_str(content).map_err(|e| DatasetError::Malformed {
                path: path.to_path_buf(),
                line: e.line(),
                message: e.to_string(),
            })?;

        if document.locale != locale {
            return Err(DatasetError::LocaleMismatch {
                keyword: "<dataset header>".to_string(),
                expected: locale.to_string(),
                found: document.locale,
            });
        }

        let entries = document
            .entries
            .into_iter()
            .map(|raw| into_entry(raw, locale))
            .collect::<Result<Vec<_>, _>>()?;

        Self::checked(path, document.version, locale, entries)
    }

    pub fn parse_lines(path: &Path, content: &str, locale: &str) -> Result<Self, DatasetError> {
        let mut entries = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let raw: RawEntry =
                serde_json::from_str(line).map_err(|e| DatasetError::Malformed {
                    path: path.to_path_buf(),
                    line: index + 1,
                    message: e.to_string(),
                })?;
            entries.push(into_entry(raw, locale)?);
        }

        Self::checked(path, None, locale, entries)
    }

    fn checked(
        path: &Path,
        version: Option<String>,
        locale: &str,
        entries: Vec<KeywordEntry>,
    ) -> Result<Self, DatasetError> {
        if entries.is_empty() {
            return Err(DatasetError::Empty {
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            version,
            locale: locale.to_string(),
            entries,
        })
    }
}

fn into_entry(raw: RawEntry, locale: &str) -> Result<KeywordEntry, DatasetError> {
    if let Some(found) = raw.locale.as_deref()
        && found != locale
    {
        return Err(DatasetError::LocaleMismatch {
            keyword: raw.keyword,
            expected: locale.to_string(),
            found: found.to_string(),
        });
    }

    Ok(KeywordEntry {
        keyword: raw.keyword,
        pictogram_id: raw.pictogram_id,
        locale: locale.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn path() -> PathBuf {
        PathBuf::from("sv.json")
    }

    #[test]
    fn test_parse_document() {
        let dataset = Dataset::parse_document(
            &path(),
            r#"{"version":"2024.1","locale":"sv","entries":[
                {"keyword":"hund","pictogram_id":101},
                {"keyword":"hundring","pictogram_id":102,"locale":"sv"}
            ]}"#,
            "sv",
        )
        .unwrap();

        assert_eq!(dataset.version.as_deref(), Some("2024.1"));
        assert_eq!(dataset.entries.len(), 2);
        assert_eq!(dataset.entries[1].locale, "sv");
    }

    #[test]
    fn test_parse_lines_reports_line_number() {
        let err = Dataset::parse_lines(
            &PathBuf::from("sv.jsonl"),
            "{\"keyword\":\"hund\",\"pictogram_id\":101}\n\n{\"keyword\":\"katt\"}\n",
            "sv",
        )
        .unwrap_err();

        match err {
            DatasetError::Malformed { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_locale_mismatch() {
        let err = Dataset::parse_document(
            &path(),
            r#"{"locale":"sv","entries":[{"keyword":"dog","pictogram_id":1,"locale":"en"}]}"#,
            "sv",
        )
        .unwrap_err();
        assert!(matches!(err, DatasetError::LocaleMismatch { .. }));

        let err = Dataset::parse_document(&path(), r#"{"locale":"en","entries":[]}"#, "sv")
            .unwrap_err();
        assert!(matches!(err, DatasetError::LocaleMismatch { .. }));
    }

    #[test]
    fn test_empty_dataset_is_an_error() {
        let err = Dataset::parse_document(&path(), r#"{"locale":"sv","entries":[]}"#, "sv")
            .unwrap_err();
        assert!(matches!(err, DatasetError::Empty { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = Dataset::read(&PathBuf::from("/definitely/not/here.json"), "sv").unwrap_err();
        assert!(matches!(err, DatasetError::Unreadable { .. }));
    }
}
