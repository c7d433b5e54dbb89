//! Line grammars for the CPUID register section.
//!
//! Register lines come in four known encodings, tried in a fixed priority
//! order: the standard hyphen-separated form, an older whitespace-separated
//! form, an AMD variant using spaces instead of hyphens, and a variant with
//! the colon shifted one character right. A trailing `[SL nn]` annotation
//! supplies an explicit subleaf index.

use std::sync::OnceLock;

use regex::Regex;

use cpuid_model::{CpuidRecord, Topology};

/// Prefix identifying a leaf-0 register line, used for headerless-document
/// detection.
pub const LEAF0_PREFIX: &str = "CPUID 00000000";

/// A register line reduced to its components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterLine {
    /// Queried leaf number.
    pub leaf: u32,
    /// Explicit subleaf index from a `[SL nn]` annotation, if any.
    pub subleaf: Option<u32>,
    /// The four output registers.
    pub record: CpuidRecord,
}

/// A topology marker line within a CPUID section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyMarker {
    /// Explicit package/core/thread triple, trusted verbatim.
    Location(Topology),
    /// Bare validity marker with no location information.
    Valid,
    /// Validity marker for the SMT sibling of the preceding CPU.
    ValidVirtual,
}

const STANDARD_PATTERN: &str = r"^CPUID ([0-9A-F]{8}): ([0-9A-F]{8})-([0-9A-F]{8})-([0-9A-F]{8})-([0-9A-F]{8})( .*)?$";
const LEGACY_PATTERN: &str = r"^CPUID ([0-9A-F]{8})\s+([0-9A-F]{8})-([0-9A-F]{8})-([0-9A-F]{8})-([0-9A-F]{8})( .*)?$";
const AMD_SPACES_PATTERN: &str = r"^CPUID ([0-9A-F]{8}): ([0-9A-F]{8}) ([0-9A-F]{8}) ([0-9A-F]{8}) ([0-9A-F]{8})( .*)?$";
const SHIFTED_COLON_PATTERN: &str = r"^CPUID ([0-9A-F]{8}) :([0-9A-F]{8})-([0-9A-F]{8})-([0-9A-F]{8})-([0-9A-F]{8})( .*)?$";

fn register_grammars() -> &'static [Regex; 4] {
    static GRAMMARS: OnceLock<[Regex; 4]> = OnceLock::new();
    GRAMMARS.get_or_init(|| {
        [
            Regex::new(STANDARD_PATTERN).expect("valid pattern"),
            Regex::new(LEGACY_PATTERN).expect("valid pattern"),
            Regex::new(AMD_SPACES_PATTERN).expect("valid pattern"),
            Regex::new(SHIFTED_COLON_PATTERN).expect("valid pattern"),
        ]
    })
}

fn subleaf_annotation() -> &'static Regex {
    static ANNOTATION: OnceLock<Regex> = OnceLock::new();
    ANNOTATION.get_or_init(|| Regex::new(r"\[SL ([0-9A-F]+)\]").expect("valid pattern"))
}

fn location_marker() -> &'static Regex {
    static LOCATION: OnceLock<Regex> = OnceLock::new();
    LOCATION.get_or_init(|| {
        Regex::new(r"^allcpu: Package (\d+) / Core (\d+) / Thread (\d+): (.*)$")
            .expect("valid pattern")
    })
}

fn cache_summary() -> &'static Regex {
    static CACHE: OnceLock<Regex> = OnceLock::new();
    CACHE.get_or_init(|| Regex::new(r"^L[0-9] .*Cache:").expect("valid pattern"))
}

fn hex32(text: &str) -> Option<u32> {
    u32::from_str_radix(text, 16).ok()
}

fn dec32(text: &str) -> Option<u32> {
    text.parse().ok()
}

/// Parses a register line in any of the four known encodings.
///
/// Returns `None` when the line matches none of them.
#[must_use]
pub fn parse_register_line(line: &str) -> Option<RegisterLine> {
    let captures = register_grammars()
        .iter()
        .find_map(|grammar| grammar.captures(line))?;

    let leaf = hex32(captures.get(1)?.as_str())?;
    let record = CpuidRecord::new(
        hex32(captures.get(2)?.as_str())?,
        hex32(captures.get(3)?.as_str())?,
        hex32(captures.get(4)?.as_str())?,
        hex32(captures.get(5)?.as_str())?,
    );

    let subleaf = captures
        .get(6)
        .and_then(|trailing| subleaf_annotation().captures(trailing.as_str()))
        .and_then(|annotation| hex32(annotation.get(1)?.as_str()));

    Some(RegisterLine {
        leaf,
        subleaf,
        record,
    })
}

/// Parses an `allcpu:` topology marker line.
///
/// Returns `None` for lines that are not recognizable markers, including
/// malformed `allcpu:` lines (the caller surfaces those as unrecognized).
#[must_use]
pub fn parse_topology_marker(line: &str) -> Option<TopologyMarker> {
    if line == "allcpu: Valid" {
        return Some(TopologyMarker::Valid);
    }
    if line == "allcpu: Valid, Virtual" {
        return Some(TopologyMarker::ValidVirtual);
    }
    let captures = location_marker().captures(line)?;
    Some(TopologyMarker::Location(Topology::new(
        dec32(captures.get(1)?.as_str())?,
        dec32(captures.get(2)?.as_str())?,
        dec32(captures.get(3)?.as_str())?,
    )))
}

/// Whether the line is a cache-summary line, understood and discarded.
#[must_use]
pub fn is_cache_summary(line: &str) -> bool {
    cache_summary().is_match(line)
}
