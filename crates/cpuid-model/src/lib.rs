//! Register model and feature extraction for CPUID dump analysis.

/// Register record primitives.
pub mod record;
pub use record::{CpuidRecord, RegisterName};

/// Per-CPU leaf/subleaf register store and its consistency rules.
pub mod store;
pub use store::{LeafSlot, LogicalCpu, StoreError, SubleafMode, Topology};

/// Declarative feature descriptors and the extraction engine.
pub mod features;
pub use features::{
    extract_features, FeatureDescriptor, FeatureKind, ParsedFeature, FEATURES,
};

/// Vendor and microarchitecture resolution against an external catalog.
pub mod uarch;
pub use uarch::{
    builtin_catalog, CatalogRow, MicroarchCatalog, MicroarchEntry, MicroarchKey, SliceCatalog,
    UNKNOWN_LABEL,
};

/// Document summary assembly over a completed register model.
pub mod summary;
pub use summary::{
    brand_string, effective_family, effective_model, suspected_virtual, summarize, vendor_string,
    DocumentResult,
};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
