//! Delimited text loading utilities.

use std::path::{Path, PathBuf};

use tabq::{DataError, DataSet, from_records};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("{0}")]
    Data(#[from] DataError),
}

/// Load a dataset from a CSV file: a header line followed by records.
/// Quoted fields keep embedded commas and newlines.
pub fn load_dataset(path: &Path) -> Result<DataSet, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        records.push(record.iter().map(str::to_string).collect());
    }

    Ok(from_records(&header, &records)?)
}

/// Extract the table name from a path (file stem).
pub fn table_name_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Check if a file has a supported extension.
pub fn is_supported_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("csv" | "txt")
    )
}

/// Collect all supported files from paths (files or directories).
pub fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            if let Ok(entries) = std::fs::read_dir(path) {
                for entry in entries.flatten() {
                    let p = entry.path();
                    if p.is_file() && is_supported_file(&p) {
                        files.push(p);
                    }
                }
            }
        } else if path.is_file() && is_supported_file(path) {
            files.push(path.clone());
        }
    }
    files
}

// ============ Sanity Tests ============

#[cfg(test)]
mod tests {
    use super::*;
    use tabq::{InferredType, Value};

    fn write_csv(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn quoted_fields_keep_commas() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "people.csv", "name,age\n\"Smith, Jones\",42\nplain,7\n");

        let dataset = load_dataset(&path).unwrap();
        assert_eq!(dataset.metadata[1].1, InferredType::Int);
        assert_eq!(dataset.rows[0][0].1, Value::String("Smith, Jones".into()));
        assert_eq!(dataset.rows[0][1].1, Value::Number(42.0));
        assert_eq!(dataset.rows[1][0].1, Value::String("plain".into()));
    }

    #[test]
    fn cells_are_trimmed_and_crlf_is_handled() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "t.csv", "a, b\r\n1, x\r\n2, y\r\n");

        let dataset = load_dataset(&path).unwrap();
        assert_eq!(dataset.metadata[1].0, "b");
        assert_eq!(dataset.rows[0][1].1, Value::String("x".into()));
    }

    #[test]
    fn ragged_records_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "bad.csv", "a,b\n1\n");

        assert!(matches!(load_dataset(&path), Err(LoadError::Csv(_))));
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "empty.csv", "");

        assert!(matches!(
            load_dataset(&path),
            Err(LoadError::Data(DataError::Empty))
        ));
    }

    #[test]
    fn names_and_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write_csv(&dir, "people.csv", "a\n1\n");
        write_csv(&dir, "notes.md", "ignored");

        assert_eq!(table_name_from_path(&csv), "people");
        assert!(is_supported_file(&csv));
        assert!(!is_supported_file(Path::new("notes.md")));

        let files = collect_files(&[dir.path().to_path_buf()]);
        assert_eq!(files.len(), 1);
        assert_eq!(table_name_from_path(&files[0]), "people");
    }
}
