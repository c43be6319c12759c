//! Outcome summaries of load, save and extract.

use std::path::PathBuf;

use framevault_common::{ObjectId, ObjectRef, VirtualName};

/// An object removed during load, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedObject {
    pub owner: ObjectRef,
    pub reason: String,
}

/// What a load found in an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Non-blank lines read.
    pub lines_read: u64,
    /// Blank separator lines skipped.
    pub blank_lines: u64,
    /// Lines that decoded and verified as frames.
    pub frames_accepted: u64,
    /// Accepted frames that carried no `v` layout key.
    pub legacy_frames: u64,
    /// Accepted frames that added nothing (replicas, already stored content).
    pub duplicate_frames: u64,
    /// 1-based numbers of rejected lines.
    pub rejected_lines: Vec<u64>,
    /// Content objects rebuilt.
    pub objects_restored: usize,
    /// Objects that could not be rebuilt.
    pub dropped: Vec<DroppedObject>,
    /// Whether the archive carried a readable name index.
    pub bookkeeping_restored: bool,
    /// Names taken over from the archive's index.
    pub names_restored: usize,
    /// Names removed because their object did not load.
    pub names_pruned: Vec<VirtualName>,
}

impl LoadReport {
    /// True when nothing was rejected, dropped or pruned.
    ///
    /// Load itself is always lenient; callers that need strictness check this.
    pub fn is_clean(&self) -> bool {
        self.rejected_lines.is_empty() && self.dropped.is_empty() && self.names_pruned.is_empty()
    }
}

/// What a save wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Content objects written.
    pub objects: usize,
    /// Distinct segments written, bookkeeping included.
    pub segments: usize,
    /// Lines written, replicas and separators included.
    pub lines_written: u64,
    /// Whether a name index was written.
    pub bookkeeping: bool,
}

/// What an extract wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub written: Vec<PathBuf>,
    /// Objects without plaintext.
    pub skipped: Vec<ObjectId>,
    /// Targets that could not be written, with the error.
    pub failed: Vec<(PathBuf, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_report() {
        let mut report = LoadReport {
            lines_read: 9,
            frames_accepted: 9,
            duplicate_frames: 6,
            objects_restored: 1,
            ..Default::default()
        };
        assert!(report.is_clean());

        report.rejected_lines.push(4);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_dropped_object_is_not_clean() {
        let report = LoadReport {
            dropped: vec![DroppedObject {
                owner: ObjectRef::Bookkeeping,
                reason: "Conflict".to_string(),
            }],
            ..Default::default()
        };
        assert!(!report.is_clean());
    }
}
