//! Declarative feature descriptors and the extraction engine.
//!
//! Descriptors are process-wide static configuration. Extraction runs once
//! over the completed register model of logical CPU 0, in declaration order,
//! so a descriptor's filter may consult every feature declared before it.

use std::fmt;

use crate::record::RegisterName;
use crate::store::LogicalCpu;

/// Custom evaluator for conjunction descriptors. Returns `None` when the
/// inputs are not observed, `Some(value)` otherwise.
pub type ConjunctionEval = fn(&LogicalCpu) -> Option<u32>;

/// Predicate over the features extracted so far. A false filter skips the
/// descriptor entirely (no [`ParsedFeature`] is emitted).
pub type FeatureFilter = fn(&[ParsedFeature]) -> bool;

/// How a descriptor reads the register model.
#[derive(Debug, Clone, Copy)]
pub enum FeatureKind {
    /// A contiguous bit range of one register of one leaf.
    Bitfield {
        /// CPUID leaf number.
        leaf: u32,
        /// Explicit subleaf index, if the leaf is subleaf-indexed.
        subleaf: Option<u32>,
        /// Output register to read.
        register: RegisterName,
        /// Least-significant bit of the range.
        offset: u32,
        /// Width of the range in bits; width 1 marks a boolean feature.
        width: u32,
    },
    /// A custom evaluator combining several bits.
    Conjunction {
        /// The evaluator function.
        eval: ConjunctionEval,
    },
}

/// One statically declared feature.
#[derive(Debug, Clone, Copy)]
pub struct FeatureDescriptor {
    /// Short display name.
    pub shortname: &'static str,
    /// Human-readable description.
    pub longname: &'static str,
    /// Read strategy.
    pub kind: FeatureKind,
    /// Optional gate over previously extracted features.
    pub filter: Option<FeatureFilter>,
}

impl FeatureDescriptor {
    const fn boolean(
        shortname: &'static str,
        longname: &'static str,
        leaf: u32,
        subleaf: Option<u32>,
        register: RegisterName,
        bit: u32,
    ) -> Self {
        Self {
            shortname,
            longname,
            kind: FeatureKind::Bitfield {
                leaf,
                subleaf,
                register,
                offset: bit,
                width: 1,
            },
            filter: None,
        }
    }

    const fn bitfield(
        shortname: &'static str,
        longname: &'static str,
        leaf: u32,
        register: RegisterName,
        offset: u32,
        width: u32,
    ) -> Self {
        Self {
            shortname,
            longname,
            kind: FeatureKind::Bitfield {
                leaf,
                subleaf: None,
                register,
                offset,
                width,
            },
            filter: None,
        }
    }

    const fn with_filter(mut self, filter: FeatureFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// One extracted feature. `present` distinguishes "not observed" (the leaf
/// or subleaf was absent) from "observed and zero".
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ParsedFeature {
    /// Short display name from the descriptor.
    pub shortname: &'static str,
    /// Human-readable description from the descriptor.
    pub longname: &'static str,
    /// Extracted value, `None` when not observed.
    pub value: Option<u32>,
    /// Whether the backing leaf/subleaf was observed.
    pub present: bool,
    /// Whether the descriptor is a single-bit (boolean) feature.
    pub boolean: bool,
}

impl ParsedFeature {
    /// Whether the feature was observed with a nonzero value.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.present && self.value.is_some_and(|v| v != 0)
    }
}

impl fmt::Display for ParsedFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_set() {
            return write!(f, "-{}", self.shortname);
        }
        if self.boolean {
            write!(f, "{}", self.shortname)
        } else {
            write!(f, "{}: {:x}", self.shortname, self.value.unwrap_or(0))
        }
    }
}

fn htt_is_set(extracted: &[ParsedFeature]) -> bool {
    extracted
        .iter()
        .any(|feature| feature.shortname == "HTT" && feature.is_set())
}

/// Leaf 1 EDX bits 0 and 15: legacy FPU present AND CMOVcc present. The
/// FCMOVcc forms require both.
fn x87_cmov(cpu: &LogicalCpu) -> Option<u32> {
    let edx = cpu.record(0x1, None)?.edx;
    let both = edx & 1 != 0 && edx & (1 << 15) != 0;
    Some(u32::from(both))
}

/// The static feature configuration, evaluated in declaration order.
pub const FEATURES: &[FeatureDescriptor] = &[
    FeatureDescriptor::bitfield("SteppingID", "Stepping ID", 0x1, RegisterName::Eax, 0, 4),
    FeatureDescriptor::bitfield("ModelID", "Model ID", 0x1, RegisterName::Eax, 4, 4),
    FeatureDescriptor::bitfield("FamilyID", "Family ID", 0x1, RegisterName::Eax, 8, 4),
    FeatureDescriptor::bitfield(
        "ExtendedModelID",
        "Extended Model ID",
        0x1,
        RegisterName::Eax,
        16,
        4,
    ),
    FeatureDescriptor::bitfield(
        "ExtendedFamilyID",
        "Extended Family ID",
        0x1,
        RegisterName::Eax,
        20,
        4,
    ),
    FeatureDescriptor::boolean("FPU", "x87 FPU on chip", 0x1, None, RegisterName::Edx, 0),
    FeatureDescriptor::boolean("TSC", "Time Stamp Counter", 0x1, None, RegisterName::Edx, 4),
    FeatureDescriptor::boolean("MSR", "RDMSR and WRMSR", 0x1, None, RegisterName::Edx, 5),
    FeatureDescriptor::boolean(
        "CMOV",
        "Conditional move instructions",
        0x1,
        None,
        RegisterName::Edx,
        15,
    ),
    FeatureDescriptor::boolean("CLFSH", "CLFLUSH instruction", 0x1, None, RegisterName::Edx, 19),
    FeatureDescriptor::boolean("MMX", "MMX technology", 0x1, None, RegisterName::Edx, 23),
    FeatureDescriptor::boolean("FXSR", "FXSAVE and FXRSTOR", 0x1, None, RegisterName::Edx, 24),
    FeatureDescriptor::boolean("SSE", "SSE extensions", 0x1, None, RegisterName::Edx, 25),
    FeatureDescriptor::boolean("SSE2", "SSE2 extensions", 0x1, None, RegisterName::Edx, 26),
    FeatureDescriptor::boolean(
        "HTT",
        "Max APIC IDs field is valid",
        0x1,
        None,
        RegisterName::Edx,
        28,
    ),
    FeatureDescriptor::bitfield(
        "LogicalProcessorCount",
        "Logical processors per package",
        0x1,
        RegisterName::Ebx,
        16,
        8,
    )
    .with_filter(htt_is_set),
    FeatureDescriptor::boolean("SSE3", "SSE3 extensions", 0x1, None, RegisterName::Ecx, 0),
    FeatureDescriptor::boolean("SSSE3", "Supplemental SSE3", 0x1, None, RegisterName::Ecx, 9),
    FeatureDescriptor::boolean("FMA", "Fused multiply-add", 0x1, None, RegisterName::Ecx, 12),
    FeatureDescriptor::boolean("SSE4.1", "SSE4.1 extensions", 0x1, None, RegisterName::Ecx, 19),
    FeatureDescriptor::boolean("SSE4.2", "SSE4.2 extensions", 0x1, None, RegisterName::Ecx, 20),
    FeatureDescriptor::boolean("MOVBE", "MOVBE instruction", 0x1, None, RegisterName::Ecx, 22),
    FeatureDescriptor::boolean("POPCNT", "POPCNT instruction", 0x1, None, RegisterName::Ecx, 23),
    FeatureDescriptor::boolean("AES", "AES instruction set", 0x1, None, RegisterName::Ecx, 25),
    FeatureDescriptor::boolean(
        "XSAVE",
        "XSAVE/XRSTOR extended states",
        0x1,
        None,
        RegisterName::Ecx,
        26,
    ),
    FeatureDescriptor::boolean("AVX", "AVX extensions", 0x1, None, RegisterName::Ecx, 28),
    FeatureDescriptor::boolean("F16C", "Half-precision convert", 0x1, None, RegisterName::Ecx, 29),
    FeatureDescriptor::boolean("RDRAND", "RDRAND instruction", 0x1, None, RegisterName::Ecx, 30),
    FeatureDescriptor::boolean(
        "Hypervisor",
        "Running under a hypervisor",
        0x1,
        None,
        RegisterName::Ecx,
        31,
    ),
    FeatureDescriptor::boolean(
        "ARAT",
        "Always Running APIC Timer",
        0x6,
        None,
        RegisterName::Eax,
        2,
    ),
    FeatureDescriptor::boolean("BMI1", "Bit manipulation set 1", 0x7, Some(0), RegisterName::Ebx, 3),
    FeatureDescriptor::boolean("AVX2", "AVX2 extensions", 0x7, Some(0), RegisterName::Ebx, 5),
    FeatureDescriptor::boolean("BMI2", "Bit manipulation set 2", 0x7, Some(0), RegisterName::Ebx, 8),
    FeatureDescriptor::boolean(
        "RDSEED",
        "RDSEED instruction",
        0x7,
        Some(0),
        RegisterName::Ebx,
        18,
    ),
    FeatureDescriptor::boolean(
        "ADX",
        "Multi-precision add-carry",
        0x7,
        Some(0),
        RegisterName::Ebx,
        19,
    ),
    FeatureDescriptor::boolean("SHA", "SHA extensions", 0x7, Some(0), RegisterName::Ebx, 29),
    FeatureDescriptor::boolean(
        "LAHF-SAHF",
        "LAHF/SAHF in 64-bit mode",
        0x8000_0001,
        None,
        RegisterName::Ecx,
        0,
    ),
    FeatureDescriptor::boolean(
        "RDTSCP",
        "RDTSCP instruction",
        0x8000_0001,
        None,
        RegisterName::Edx,
        27,
    ),
    FeatureDescriptor {
        shortname: "X87CMOV",
        longname: "x87 FCMOVcc (FPU and CMOV)",
        kind: FeatureKind::Conjunction { eval: x87_cmov },
        filter: None,
    },
];

/// Evaluates every declared descriptor against one logical CPU, in
/// declaration order. Descriptors whose filter rejects contribute nothing;
/// all others contribute exactly one [`ParsedFeature`].
#[must_use]
pub fn extract_features(cpu: &LogicalCpu) -> Vec<ParsedFeature> {
    let mut extracted: Vec<ParsedFeature> = Vec::with_capacity(FEATURES.len());

    for descriptor in FEATURES {
        if let Some(filter) = descriptor.filter {
            if !filter(&extracted) {
                continue;
            }
        }
        extracted.push(evaluate(descriptor, cpu));
    }

    extracted
}

fn evaluate(descriptor: &FeatureDescriptor, cpu: &LogicalCpu) -> ParsedFeature {
    let (value, boolean) = match descriptor.kind {
        FeatureKind::Bitfield {
            leaf,
            subleaf,
            register,
            offset,
            width,
        } => {
            let value = cpu
                .record(leaf, subleaf)
                .map(|record| record.bits(register, offset, width));
            (value, width == 1)
        }
        FeatureKind::Conjunction { eval } => (eval(cpu), true),
    };

    ParsedFeature {
        shortname: descriptor.shortname,
        longname: descriptor.longname,
        present: value.is_some(),
        value,
        boolean,
    }
}
