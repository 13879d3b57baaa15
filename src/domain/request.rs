//! The user's raw ask, immutable once accepted.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A data-analysis request as received from the user.
///
/// Accepted requests are never mutated; every run owns exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    /// Unique identifier for this request
    pub id: Uuid,

    /// The raw ask, e.g. "analyze the car sales dataset"
    pub text: String,

    /// Dataset the request points at; discovered from the data directory
    /// when not given
    pub dataset: Option<PathBuf>,

    pub received_at: DateTime<Utc>,
}

impl WorkflowRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            dataset: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_dataset(mut self, path: impl AsRef<Path>) -> Self {
        self.dataset = Some(path.as_ref().to_path_buf());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_creation() {
        let request = WorkflowRequest::new("analyze sales figures");
        assert_eq!(request.text, "analyze sales figures");
        assert!(request.dataset.is_none());
    }

    #[test]
    fn test_request_with_dataset() {
        let request = WorkflowRequest::new("analyze").with_dataset("data/cars.csv");
        assert_eq!(request.dataset, Some(PathBuf::from("data/cars.csv")));
    }
}
