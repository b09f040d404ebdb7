//! Execution result types

use serde::{Deserialize, Serialize};

/// Result of provisioning or removing one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was updated in place or replaced
    Modified,
    /// Resource was removed
    Removed,
    /// Resource was left in place on removal (retain policy)
    Retained,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Modified | Self::Removed)
    }

    /// Whether dependents may proceed after this result
    pub fn unblocks_dependents(&self) -> bool {
        !matches!(self, Self::Failed { .. } | Self::Skipped { .. })
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub retained: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created
            + self.modified
            + self.removed
            + self.retained
            + self.skipped
            + self.failed
            + self.no_change
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ExecuteSummary) {
        self.created += other.created;
        self.modified += other.modified;
        self.removed += other.removed;
        self.retained += other.retained;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.no_change += other.no_change;
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Retained => self.retained += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Number of parallel jobs within a wave
    pub jobs: usize,
    /// Verbose output
    pub verbose: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            verbose: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_and_merge() {
        let mut a = ExecuteSummary::default();
        a.add_result(&ApplyResult::Created);
        a.add_result(&ApplyResult::Failed {
            error: "boom".into(),
        });
        let mut b = ExecuteSummary::default();
        b.add_result(&ApplyResult::Removed);
        b.add_result(&ApplyResult::Retained);

        a.merge(&b);
        assert_eq!(a.total(), 4);
        assert_eq!(a.total_changes(), 2);
        assert!(!a.is_success());
    }

    #[test]
    fn test_skipped_blocks_dependents() {
        assert!(ApplyResult::Created.unblocks_dependents());
        assert!(
            !ApplyResult::Skipped {
                reason: "x".into()
            }
            .unblocks_dependents()
        );
    }
}
