//! Document-scoped error taxonomy.
//!
//! Every fatal condition aborts exactly one document; a batch driver catches
//! per document and continues. Each error carries the source identifier and,
//! where one exists, the literal offending line, which is enough to locate
//! the input and decide whether it needs fixing or a new format quirk.

use std::fmt;

use cpuid_model::StoreError;
use thiserror::Error;

/// A fatal parse error for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpError {
    /// Document/source identifier (usually the file path).
    pub source_id: String,
    /// 1-indexed line number of the offending line, if any.
    pub line_number: Option<usize>,
    /// The literal offending line, if any.
    pub line: Option<String>,
    /// Classification of the failure.
    pub kind: DumpErrorKind,
}

impl DumpError {
    /// Creates an error anchored to a specific line.
    #[must_use]
    pub fn at(source_id: &str, line_number: usize, line: &str, kind: DumpErrorKind) -> Self {
        Self {
            source_id: source_id.to_string(),
            line_number: Some(line_number),
            line: Some(line.to_string()),
            kind,
        }
    }

    /// Creates a document-level error with no single offending line.
    #[must_use]
    pub fn document(source_id: &str, kind: DumpErrorKind) -> Self {
        Self {
            source_id: source_id.to_string(),
            line_number: None,
            line: None,
            kind,
        }
    }
}

impl fmt::Display for DumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line_number, &self.line) {
            (Some(number), Some(line)) => {
                write!(f, "{}:{}: {}: {line}", self.source_id, number, self.kind)
            }
            _ => write!(f, "{}: {}", self.source_id, self.kind),
        }
    }
}

impl std::error::Error for DumpError {}

/// Classification of fatal document errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DumpErrorKind {
    /// No section-data grammar and no header pattern matched the line.
    #[error("unrecognized line")]
    UnrecognizedLine,
    /// The register store rejected a commit (inconsistent subleaf sourcing
    /// or a duplicate record).
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Logical CPU 0 lacks leaf 0 at end of parse.
    #[error("logical CPU 0 is missing leaf 0")]
    MissingBaseLeaf,
}

#[cfg(test)]
mod tests {
    use cpuid_model::StoreError;

    use super::{DumpError, DumpErrorKind};

    #[test]
    fn line_anchored_error_reports_line_and_source() {
        let err = DumpError::at(
            "dump.txt",
            17,
            "CPUID garbage",
            DumpErrorKind::UnrecognizedLine,
        );
        assert_eq!(
            err.to_string(),
            "dump.txt:17: unrecognized line: CPUID garbage"
        );
    }

    #[test]
    fn document_error_reports_source_only() {
        let err = DumpError::document("dump.txt", DumpErrorKind::MissingBaseLeaf);
        assert_eq!(err.to_string(), "dump.txt: logical CPU 0 is missing leaf 0");
    }

    #[test]
    fn store_errors_convert_into_the_taxonomy() {
        let kind: DumpErrorKind = StoreError::InconsistentSubleafMode { leaf: 0x4 }.into();
        assert!(matches!(
            kind,
            DumpErrorKind::Store(StoreError::InconsistentSubleafMode { leaf: 0x4 })
        ));
    }

    #[test]
    fn store_error_display_is_transparent() {
        let kind: DumpErrorKind = StoreError::DuplicateLeafOrSubleaf {
            leaf: 0xD,
            subleaf: 0x3E,
        }
        .into();
        assert_eq!(
            kind.to_string(),
            "duplicate record for leaf 0x0000000D subleaf 0x3E"
        );
    }
}
