//! Parser for AIDA64-style CPUID text dumps.

use tracing_subscriber as _;

/// Per-document parse context and numbering heuristics.
pub mod context;
pub use context::{DocumentContext, NumberingOrigin};

/// Single forward-pass document parser.
pub mod document;
pub use document::{parse_document, ParsedDocument};

/// Document-scoped error taxonomy.
pub mod errors;
pub use errors::{DumpError, DumpErrorKind};

/// Line grammars for the CPUID register section.
pub mod grammar;
pub use grammar::{parse_register_line, parse_topology_marker, RegisterLine, TopologyMarker};

/// Section states, header tables, and per-section label tables.
pub mod section;
pub use section::{match_header, match_section_label, CpuIndex, HeaderMatch, ParseState};

#[cfg(test)]
use rstest as _;
#[cfg(test)]
use tempfile as _;
