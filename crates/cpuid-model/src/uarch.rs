//! Vendor and microarchitecture resolution.
//!
//! The reference table mapping (vendor, family, model) to names lives
//! outside this crate; [`MicroarchCatalog`] is the lookup contract it must
//! satisfy. Resolution tries the exact key first, then a family-only key,
//! and degrades to [`UNKNOWN_LABEL`] with a diagnostic instead of failing.

use tracing::warn;

/// Label used when the catalog has no entry for a processor.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Lookup key: vendor string plus effective family, optionally narrowed by
/// effective model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicroarchKey<'a> {
    /// CPUID vendor string (e.g. `GenuineIntel`).
    pub vendor: &'a str,
    /// Effective family (base plus extended component).
    pub family: u32,
    /// Effective model; `None` selects a family-wide entry.
    pub model: Option<u32>,
}

/// Labels resolved for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicroarchEntry {
    /// Coarse family label (e.g. `Zen 3`).
    pub family: &'static str,
    /// Microarchitecture label (e.g. `Vermeer`).
    pub microarchitecture: &'static str,
}

/// The lookup contract the external reference table satisfies.
pub trait MicroarchCatalog {
    /// Returns the entry for a key, or `None` when the table has no match.
    fn lookup(&self, key: &MicroarchKey<'_>) -> Option<MicroarchEntry>;
}

/// One row of a slice-backed catalog.
#[derive(Debug, Clone, Copy)]
pub struct CatalogRow {
    /// Vendor string the row applies to.
    pub vendor: &'static str,
    /// Effective family the row applies to.
    pub family: u32,
    /// Effective model, or `None` for a family-wide row.
    pub model: Option<u32>,
    /// Resolved labels.
    pub entry: MicroarchEntry,
}

/// A catalog backed by a static row slice, matched in row order.
#[derive(Debug, Clone, Copy)]
pub struct SliceCatalog {
    rows: &'static [CatalogRow],
}

impl SliceCatalog {
    /// Creates a catalog over the given rows.
    #[must_use]
    pub const fn new(rows: &'static [CatalogRow]) -> Self {
        Self { rows }
    }
}

impl MicroarchCatalog for SliceCatalog {
    fn lookup(&self, key: &MicroarchKey<'_>) -> Option<MicroarchEntry> {
        self.rows
            .iter()
            .find(|row| row.vendor == key.vendor && row.family == key.family && row.model == key.model)
            .map(|row| row.entry)
    }
}

const fn row(
    vendor: &'static str,
    family: u32,
    model: Option<u32>,
    family_label: &'static str,
    microarchitecture: &'static str,
) -> CatalogRow {
    CatalogRow {
        vendor,
        family,
        model,
        entry: MicroarchEntry {
            family: family_label,
            microarchitecture,
        },
    }
}

/// A small built-in catalog covering common desktop parts, used by the CLI
/// and by tests. The authoritative table is maintained externally.
const BUILTIN_ROWS: &[CatalogRow] = &[
    row("GenuineIntel", 0x6, Some(0x2A), "Sandy Bridge", "Sandy Bridge"),
    row("GenuineIntel", 0x6, Some(0x3C), "Haswell", "Haswell"),
    row("GenuineIntel", 0x6, Some(0x5E), "Skylake", "Skylake"),
    row("GenuineIntel", 0x6, Some(0x9E), "Skylake", "Coffee Lake"),
    row("GenuineIntel", 0x6, Some(0x97), "Golden Cove", "Alder Lake"),
    row("GenuineIntel", 0x6, None, "P6", "unknown P6 derivative"),
    row("GenuineIntel", 0xF, None, "NetBurst", "NetBurst"),
    row("AuthenticAMD", 0x17, Some(0x71), "Zen 2", "Matisse"),
    row("AuthenticAMD", 0x17, None, "Zen", "unknown Zen derivative"),
    row("AuthenticAMD", 0x19, Some(0x21), "Zen 3", "Vermeer"),
    row("AuthenticAMD", 0x19, Some(0x61), "Zen 4", "Raphael"),
    row("AuthenticAMD", 0x19, None, "Zen 3", "unknown Zen 3 derivative"),
];

/// Returns the built-in slice catalog.
#[must_use]
pub const fn builtin_catalog() -> SliceCatalog {
    SliceCatalog::new(BUILTIN_ROWS)
}

/// Resolves family and microarchitecture labels for a processor.
///
/// Tries (vendor, family, model), falls back to (vendor, family), and on a
/// complete miss emits a diagnostic and returns [`UNKNOWN_LABEL`] for both.
#[must_use]
pub fn resolve(
    catalog: &dyn MicroarchCatalog,
    vendor: &str,
    family: u32,
    model: u32,
) -> (String, String) {
    let exact = MicroarchKey {
        vendor,
        family,
        model: Some(model),
    };
    let family_only = MicroarchKey {
        vendor,
        family,
        model: None,
    };

    if let Some(entry) = catalog
        .lookup(&exact)
        .or_else(|| catalog.lookup(&family_only))
    {
        return (
            entry.family.to_string(),
            entry.microarchitecture.to_string(),
        );
    }

    warn!(vendor, family, model, "no microarchitecture entry");
    (UNKNOWN_LABEL.to_string(), UNKNOWN_LABEL.to_string())
}
