//! Dataset capability: CSV discovery and profiling.
//!
//! Consumed only by the discovery stage's agent. Files are opened
//! read-only and released before the stage result is produced.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;

/// Failures while locating or reading a dataset. All of these are
/// unrecoverable for the run that hit them.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("no CSV datasets found under {0}")]
    NoDatasets(PathBuf),

    #[error("dataset not found: {0}")]
    NotFound(PathBuf),

    #[error("dataset {path} is unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dataset {0} is empty")]
    Empty(PathBuf),
}

/// Shape summary of one CSV dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub path: PathBuf,
    pub size_bytes: u64,

    /// Data rows, excluding the header line
    pub row_count: u64,

    pub columns: Vec<String>,

    /// First 16 hex chars of the content SHA-256, identifies the snapshot
    pub checksum: String,
}

/// Read-only access to the data directory.
#[derive(Debug, Clone)]
pub struct DatasetReader {
    data_dir: PathBuf,
}

impl DatasetReader {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// List CSV files in the data directory, sorted by name.
    pub fn discover(&self) -> Result<Vec<PathBuf>, DatasetError> {
        let pattern = self.data_dir.join("*.csv");
        let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
            .map_err(|_| DatasetError::NoDatasets(self.data_dir.clone()))?
            .filter_map(Result::ok)
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(DatasetError::NoDatasets(self.data_dir.clone()));
        }
        Ok(files)
    }

    /// Profile a CSV file: size, row count, column names, checksum.
    pub async fn read(&self, path: &Path) -> Result<DatasetProfile, DatasetError> {
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        };

        let metadata = fs::metadata(&resolved).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                DatasetError::NotFound(resolved.clone())
            } else {
                DatasetError::Unreadable {
                    path: resolved.clone(),
                    source,
                }
            }
        })?;

        let content = fs::read_to_string(&resolved)
            .await
            .map_err(|source| DatasetError::Unreadable {
                path: resolved.clone(),
                source,
            })?;

        let mut lines = content.lines().filter(|l| !l.trim().is_empty());
        let header = lines.next().ok_or_else(|| DatasetError::Empty(resolved.clone()))?;

        let columns: Vec<String> = header
            .split(',')
            .map(|c| c.trim().trim_matches('"').to_string())
            .collect();
        let row_count = lines.count() as u64;

        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        let digest = hasher.finalize();
        let checksum = hex::encode(&digest[..8]);

        Ok(DatasetProfile {
            path: resolved,
            size_bytes: metadata.len(),
            row_count,
            columns,
            checksum,
        })
    }

    /// Resolve the dataset for a run: the requested path when given,
    /// otherwise the first discovered CSV.
    pub async fn resolve(&self, requested: Option<&Path>) -> Result<DatasetProfile, DatasetError> {
        match requested {
            Some(path) => self.read(path).await,
            None => {
                let files = self.discover()?;
                self.read(&files[0]).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CARS_CSV: &str = "name,year,selling_price,km_driven\n\
                            Maruti 800 AC,2007,60000,70000\n\
                            Hyundai Verna,2012,600000,100000\n";

    fn data_dir_with(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_profile_csv() {
        let dir = data_dir_with(&[("cars.csv", CARS_CSV)]);
        let reader = DatasetReader::new(dir.path());

        let profile = reader.read(Path::new("cars.csv")).await.unwrap();
        assert_eq!(profile.row_count, 2);
        assert_eq!(
            profile.columns,
            vec!["name", "year", "selling_price", "km_driven"]
        );
        assert_eq!(profile.size_bytes, CARS_CSV.len() as u64);
        assert_eq!(profile.checksum.len(), 16);
    }

    #[tokio::test]
    async fn test_discover_sorts_and_filters() {
        let dir = data_dir_with(&[
            ("b.csv", CARS_CSV),
            ("a.csv", CARS_CSV),
            ("notes.txt", "not a dataset"),
        ]);
        let reader = DatasetReader::new(dir.path());

        let files = reader.discover().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.csv"));
    }

    #[tokio::test]
    async fn test_missing_dataset() {
        let dir = data_dir_with(&[]);
        let reader = DatasetReader::new(dir.path());

        let err = reader.read(Path::new("absent.csv")).await.unwrap_err();
        assert!(matches!(err, DatasetError::NotFound(_)));

        let err = reader.resolve(None).await.unwrap_err();
        assert!(matches!(err, DatasetError::NoDatasets(_)));
    }

    #[tokio::test]
    async fn test_empty_dataset() {
        let dir = data_dir_with(&[("empty.csv", "")]);
        let reader = DatasetReader::new(dir.path());

        let err = reader.read(Path::new("empty.csv")).await.unwrap_err();
        assert!(matches!(err, DatasetError::Empty(_)));
    }

    #[tokio::test]
    async fn test_checksum_tracks_content() {
        let dir = data_dir_with(&[("a.csv", CARS_CSV), ("b.csv", "x,y\n1,2\n")]);
        let reader = DatasetReader::new(dir.path());

        let a = reader.read(Path::new("a.csv")).await.unwrap();
        let b = reader.read(Path::new("b.csv")).await.unwrap();
        assert_ne!(a.checksum, b.checksum);
    }
}
