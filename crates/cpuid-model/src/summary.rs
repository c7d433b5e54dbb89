//! Document summary assembly over a completed register model.
//!
//! Consumes logical CPU 0 only: the engine does not reconcile feature
//! differences between logical CPUs of one document.

use crate::features::{extract_features, ParsedFeature};
use crate::store::LogicalCpu;
use crate::uarch::{resolve, MicroarchCatalog};

/// First brand-string leaf; the string spans this leaf and the next two.
const BRAND_LEAF_FIRST: u32 = 0x8000_0002;

/// Hypervisor vendor leaf.
const HYPERVISOR_LEAF: u32 = 0x4000_0000;

/// The completed, immutable engine output for one document. This is the
/// hand-off surface for storage and display layers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DocumentResult {
    /// Brand string when present, synthesized vendor/family/model otherwise.
    pub display_name: String,
    /// Decoded leaf-0 vendor string.
    pub vendor: String,
    /// Whether the dump looks like it was taken under a hypervisor.
    pub suspected_virtual: bool,
    /// Resolved coarse family label, possibly `unknown`.
    pub family: String,
    /// Resolved microarchitecture label, possibly `unknown`.
    pub microarchitecture: String,
    /// Extracted features in descriptor declaration order.
    pub features: Vec<ParsedFeature>,
}

/// Decodes the leaf-0 vendor string (EBX, EDX, ECX byte order).
#[must_use]
pub fn vendor_string(cpu: &LogicalCpu) -> Option<String> {
    let leaf0 = cpu.record(0x0, None)?;
    let mut bytes = Vec::with_capacity(12);
    for register in [leaf0.ebx, leaf0.edx, leaf0.ecx] {
        bytes.extend_from_slice(&register.to_le_bytes());
    }
    Some(trim_register_text(&bytes))
}

/// Assembles the brand string from leaves 0x80000002-0x80000004, packed
/// little-endian in (leaf, EAX/EBX/ECX/EDX) order, with trailing NUL bytes
/// and trailing whitespace stripped. `None` when any of the leaves is
/// absent.
#[must_use]
pub fn brand_string(cpu: &LogicalCpu) -> Option<String> {
    let mut bytes = Vec::with_capacity(48);
    for leaf in BRAND_LEAF_FIRST..=BRAND_LEAF_FIRST + 2 {
        let record = cpu.record(leaf, None)?;
        for register in [record.eax, record.ebx, record.ecx, record.edx] {
            bytes.extend_from_slice(&register.to_le_bytes());
        }
    }
    Some(trim_register_text(&bytes))
}

fn trim_register_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .trim_end()
        .to_string()
}

fn feature_value(features: &[ParsedFeature], shortname: &str) -> Option<u32> {
    features
        .iter()
        .find(|feature| feature.shortname == shortname)
        .and_then(|feature| feature.value)
}

/// Effective family: FamilyID plus ExtendedFamilyID when the extended value
/// is present and nonzero.
#[must_use]
pub fn effective_family(features: &[ParsedFeature]) -> Option<u32> {
    let base = feature_value(features, "FamilyID")?;
    let extended = feature_value(features, "ExtendedFamilyID").unwrap_or(0);
    Some(base + extended)
}

/// Effective model: ModelID with ExtendedModelID shifted into the high
/// nibble when the extended value is present and nonzero.
#[must_use]
pub fn effective_model(features: &[ParsedFeature]) -> Option<u32> {
    let base = feature_value(features, "ModelID")?;
    let extended = feature_value(features, "ExtendedModelID").unwrap_or(0);
    Some(base + (extended << 4))
}

/// Whether the dump looks virtualized: the hypervisor-present bit of leaf 1,
/// or a hypervisor vendor leaf reporting a nonzero EAX.
#[must_use]
pub fn suspected_virtual(cpu: &LogicalCpu, features: &[ParsedFeature]) -> bool {
    let hypervisor_bit = features
        .iter()
        .any(|feature| feature.shortname == "Hypervisor" && feature.is_set());
    let hypervisor_leaf = cpu
        .record(HYPERVISOR_LEAF, None)
        .is_some_and(|record| record.eax != 0);
    hypervisor_bit || hypervisor_leaf
}

/// Builds the engine output for one document from its logical CPU 0.
#[must_use]
pub fn summarize(cpu: &LogicalCpu, catalog: &dyn MicroarchCatalog) -> DocumentResult {
    let features = extract_features(cpu);
    let vendor = vendor_string(cpu).unwrap_or_default();
    let family_id = effective_family(&features).unwrap_or(0);
    let model_id = effective_model(&features).unwrap_or(0);

    let display_name = brand_string(cpu).unwrap_or_else(|| {
        format!("Unknown {vendor} family {family_id:X}h model {model_id:X}h")
    });

    let (family, microarchitecture) = resolve(catalog, &vendor, family_id, model_id);

    DocumentResult {
        display_name,
        vendor,
        suspected_virtual: suspected_virtual(cpu, &features),
        family,
        microarchitecture,
        features,
    }
}

#[cfg(test)]
mod tests {
    use crate::record::CpuidRecord;
    use crate::store::{LogicalCpu, SubleafMode};
    use crate::uarch::builtin_catalog;

    use super::{
        brand_string, effective_family, effective_model, summarize, suspected_virtual,
        vendor_string, BRAND_LEAF_FIRST, HYPERVISOR_LEAF,
    };
    use crate::features::extract_features;

    fn commit(cpu: &mut LogicalCpu, leaf: u32, record: CpuidRecord) {
        let mut mode = SubleafMode::Undetermined;
        cpu.commit(&mut mode, leaf, None, record).unwrap();
    }

    fn intel_leaf0() -> CpuidRecord {
        // "GenuineIntel" split across EBX/EDX/ECX.
        CpuidRecord::new(0x16, 0x756E_6547, 0x6C65_746E, 0x4965_6E69)
    }

    fn brand_record(text: &[u8; 16]) -> CpuidRecord {
        let word = |i: usize| {
            u32::from_le_bytes([text[i], text[i + 1], text[i + 2], text[i + 3]])
        };
        CpuidRecord::new(word(0), word(4), word(8), word(12))
    }

    #[test]
    fn vendor_string_decodes_intel() {
        let mut cpu = LogicalCpu::new();
        commit(&mut cpu, 0x0, intel_leaf0());
        assert_eq!(vendor_string(&cpu).as_deref(), Some("GenuineIntel"));
    }

    #[test]
    fn brand_string_packs_three_leaves() {
        let mut cpu = LogicalCpu::new();
        commit(&mut cpu, 0x0, intel_leaf0());
        commit(&mut cpu, BRAND_LEAF_FIRST, brand_record(b"Intel(R) Core(TM"));
        commit(
            &mut cpu,
            BRAND_LEAF_FIRST + 1,
            brand_record(b") i7-9700K CPU @"),
        );
        commit(
            &mut cpu,
            BRAND_LEAF_FIRST + 2,
            brand_record(b" 3.60GHz\0\0\0\0\0\0\0\0"),
        );

        assert_eq!(
            brand_string(&cpu).as_deref(),
            Some("Intel(R) Core(TM) i7-9700K CPU @ 3.60GHz")
        );
    }

    #[test]
    fn brand_string_trims_trailing_whitespace() {
        let mut cpu = LogicalCpu::new();
        commit(&mut cpu, BRAND_LEAF_FIRST, brand_record(b"Some CPU        "));
        commit(&mut cpu, BRAND_LEAF_FIRST + 1, brand_record(&[b' '; 16]));
        commit(
            &mut cpu,
            BRAND_LEAF_FIRST + 2,
            brand_record(&[0u8; 16]),
        );

        assert_eq!(brand_string(&cpu).as_deref(), Some("Some CPU"));
    }

    #[test]
    fn brand_string_requires_all_three_leaves() {
        let mut cpu = LogicalCpu::new();
        commit(&mut cpu, BRAND_LEAF_FIRST, brand_record(b"Half a brand str"));
        assert_eq!(brand_string(&cpu), None);
    }

    #[test]
    fn effective_ids_combine_extended_components() {
        let mut cpu = LogicalCpu::new();
        commit(&mut cpu, 0x0, intel_leaf0());
        commit(&mut cpu, 0x1, CpuidRecord::new(0x00A2_0F12, 0, 0, 0));

        let features = extract_features(&cpu);
        assert_eq!(effective_family(&features), Some(0x19));
        assert_eq!(effective_model(&features), Some(0x21));
    }

    #[test]
    fn effective_ids_without_extended_components() {
        let mut cpu = LogicalCpu::new();
        commit(&mut cpu, 0x0, intel_leaf0());
        // Family 6, model 0xE, no extended components.
        commit(&mut cpu, 0x1, CpuidRecord::new(0x0000_06E8, 0, 0, 0));

        let features = extract_features(&cpu);
        assert_eq!(effective_family(&features), Some(0x6));
        assert_eq!(effective_model(&features), Some(0xE));
    }

    #[test]
    fn hypervisor_bit_marks_virtual() {
        let mut cpu = LogicalCpu::new();
        commit(&mut cpu, 0x0, intel_leaf0());
        commit(&mut cpu, 0x1, CpuidRecord::new(0, 0, 1 << 31, 0));

        let features = extract_features(&cpu);
        assert!(suspected_virtual(&cpu, &features));
    }

    #[test]
    fn hypervisor_leaf_marks_virtual() {
        let mut cpu = LogicalCpu::new();
        commit(&mut cpu, 0x0, intel_leaf0());
        commit(&mut cpu, 0x1, CpuidRecord::ZERO);
        commit(
            &mut cpu,
            HYPERVISOR_LEAF,
            CpuidRecord::new(0x4000_0006, 0, 0, 0),
        );

        let features = extract_features(&cpu);
        assert!(suspected_virtual(&cpu, &features));
    }

    #[test]
    fn zero_hypervisor_leaf_is_not_virtual() {
        let mut cpu = LogicalCpu::new();
        commit(&mut cpu, 0x0, intel_leaf0());
        commit(&mut cpu, 0x1, CpuidRecord::ZERO);
        commit(&mut cpu, HYPERVISOR_LEAF, CpuidRecord::ZERO);

        let features = extract_features(&cpu);
        assert!(!suspected_virtual(&cpu, &features));
    }

    #[test]
    fn summary_synthesizes_display_name_without_brand_leaves() {
        let mut cpu = LogicalCpu::new();
        commit(&mut cpu, 0x0, intel_leaf0());
        commit(&mut cpu, 0x1, CpuidRecord::new(0x0000_06E8, 0, 0, 0));

        let result = summarize(&cpu, &builtin_catalog());
        assert_eq!(result.display_name, "Unknown GenuineIntel family 6h model Eh");
        assert_eq!(result.vendor, "GenuineIntel");
        assert_eq!(result.family, "P6");
        assert!(!result.suspected_virtual);
    }

    #[test]
    fn summary_resolves_known_part() {
        let mut cpu = LogicalCpu::new();
        // "AuthenticAMD" split across EBX/EDX/ECX.
        commit(
            &mut cpu,
            0x0,
            CpuidRecord::new(0x10, 0x6874_7541, 0x444D_4163, 0x6974_6E65),
        );
        commit(&mut cpu, 0x1, CpuidRecord::new(0x00A2_0F12, 0, 0, 0));

        let result = summarize(&cpu, &builtin_catalog());
        assert_eq!(result.vendor, "AuthenticAMD");
        assert_eq!(result.family, "Zen 3");
        assert_eq!(result.microarchitecture, "Vermeer");
    }
}
