//! Progress reporting for file transfers.

/// Progress information for uploads and downloads.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Bytes transferred so far
    pub done: u64,
    /// Total bytes to transfer
    pub total: u64,
    /// Name of the file being transferred
    pub filename: String,
}

impl TransferProgress {
    /// Create a new progress report.
    pub fn new(done: u64, total: u64, filename: impl Into<String>) -> Self {
        Self {
            done,
            total,
            filename: filename.into(),
        }
    }

    /// Get progress as a percentage (0.0 to 100.0).
    ///
    /// An empty transfer counts as complete.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.done as f64 / self.total as f64) * 100.0
    }

    /// Check if transfer is complete.
    pub fn is_complete(&self) -> bool {
        self.done >= self.total
    }
}

/// Type alias for progress callback function.
///
/// Called after every chunk. Returning `false` cancels the transfer with
/// [`MegaError::Cancelled`](crate::MegaError::Cancelled).
pub type ProgressCallback = Box<dyn FnMut(&TransferProgress) -> bool + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(TransferProgress::new(25, 100, "a").percent(), 25.0);
        assert_eq!(TransferProgress::new(0, 0, "empty").percent(), 100.0);
        assert!(TransferProgress::new(0, 0, "empty").is_complete());
        assert!(!TransferProgress::new(1, 2, "a").is_complete());
    }
}
