use serde::Serialize;

/// A file that could not be imported, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFailure {
    /// File name (or path, for scan failures)
    pub file: String,

    /// Human-readable reason
    pub message: String,
}

/// Result of one batch import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    /// Number of beats persisted
    pub imported_count: usize,

    /// Per-file failures, in processing order
    pub errors: Vec<ImportFailure>,
}

impl ImportOutcome {
    /// Create an empty outcome
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self) {
        self.imported_count += 1;
    }

    pub fn record_failure(&mut self, file: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ImportFailure {
            file: file.into(),
            message: message.into(),
        });
    }

    /// Number of failed files
    pub fn failed_count(&self) -> usize {
        self.errors.len()
    }

    /// One-line summary for display
    pub fn summary(&self) -> String {
        format!(
            "{} imported, {} failed",
            self.imported_count,
            self.failed_count()
        )
    }
}

/// Snapshot passed to the progress callback after each processed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportProgress {
    /// 1-based position of the file in the batch
    pub index: usize,

    /// Total number of candidate files, when known up front (flat mode)
    pub total: Option<usize>,

    /// File that was just processed
    pub file: String,

    /// Running count of imported beats
    pub imported_count: usize,

    /// Running count of failures
    pub failed_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_counts() {
        let mut outcome = ImportOutcome::new();
        outcome.record_success();
        outcome.record_success();
        outcome.record_failure("broken.mp3", "Corrupt file");

        assert_eq!(outcome.imported_count, 2);
        assert_eq!(outcome.failed_count(), 1);
        assert_eq!(outcome.summary(), "2 imported, 1 failed");
    }

    #[test]
    fn test_outcome_json_shape() {
        let mut outcome = ImportOutcome::new();
        outcome.record_success();
        outcome.record_failure("broken.mp3", "Corrupt file");

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "importedCount": 1,
                "errors": [{ "file": "broken.mp3", "message": "Corrupt file" }]
            })
        );
    }
}
