//! Section states, header tables, and per-section label tables.
//!
//! Headers are matched deterministically: the literal table first, in
//! declaration order, then the compiled patterns, in declaration order.
//! Dump tools disagree on how CPUID regions are announced, so several
//! pattern variants map to the same state; the variants that carry no usable
//! CPU number fall back to guessed indices.

use std::sync::OnceLock;

use regex::Regex;

/// Prefix of MSR data lines, recognized and discarded.
pub const MSR_DATA_PREFIX: &str = "MSR ";

/// Section states of the document state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseState {
    /// Looking for a section header.
    #[default]
    Header,
    /// Inside `------[ Versions ]------`.
    Version,
    /// Inside `------[ CPU Info ]------`.
    PlatformSummary,
    /// Inside `------[ Motherboard Info ]------`.
    MotherboardInfo,
    /// Inside a per-CPU CPUID register block.
    CpuidRegisters,
    /// Inside an MSR register block; its content is never modeled.
    MsrRegisters,
    /// The trailing free-form region; reaching it ends the pass.
    Remainder,
    /// The all-CPU summary section, an alternative end of the pass.
    AllCpuSummary,
    /// Parsing finished.
    Done,
}

/// How a CPUID-region header identifies its logical CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuIndex {
    /// Decimal index captured from the header text.
    Numbered(u32),
    /// No numeric indicator; the parser assigns the next guessed index.
    Guessed,
}

/// A recognized section header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderMatch {
    /// State the header transitions into.
    pub state: ParseState,
    /// CPU identity, for headers that open a new logical CPU.
    pub cpu_index: Option<CpuIndex>,
    /// Whether this header variant implies untrustworthy core attribution.
    pub inaccurate_topology: bool,
}

const LITERAL_HEADERS: &[(&str, ParseState)] = &[
    ("------[ Versions ]------", ParseState::Version),
    ("------[ CPU Info ]------", ParseState::PlatformSummary),
    ("------[ Motherboard Info ]------", ParseState::MotherboardInfo),
    ("------[ All CPUs ]------", ParseState::AllCpuSummary),
    ("------[ MSR Registers ]------", ParseState::MsrRegisters),
];

#[derive(Debug, Clone, Copy)]
enum IndexRule {
    /// The header carries no CPU identity (or one we discard).
    None,
    /// Group 1 of the pattern is the decimal CPU index.
    Captured,
    /// The header opens a CPU but carries no usable number.
    Guessed,
}

struct PatternHeader {
    pattern: &'static str,
    state: ParseState,
    index: IndexRule,
    inaccurate_topology: bool,
}

const fn pattern(
    pattern: &'static str,
    state: ParseState,
    index: IndexRule,
    inaccurate_topology: bool,
) -> PatternHeader {
    PatternHeader {
        pattern,
        state,
        index,
        inaccurate_topology,
    }
}

const PATTERN_HEADERS: &[PatternHeader] = &[
    pattern(
        r"^------\[ CPUID Registers / Logical CPU #(\d+) \]------$",
        ParseState::CpuidRegisters,
        IndexRule::Captured,
        false,
    ),
    pattern(
        r"^CPUID Registers \(CPU #(\d+)\)$",
        ParseState::CpuidRegisters,
        IndexRule::Captured,
        false,
    ),
    // Some files announce SMT twins with a slightly different header string.
    pattern(
        r"^CPUID Registers \(CPU #(\d+) Virtual\)$",
        ParseState::CpuidRegisters,
        IndexRule::Captured,
        true,
    ),
    pattern(
        r"^CPU#(\d+) AffMask.*$",
        ParseState::CpuidRegisters,
        IndexRule::Captured,
        false,
    ),
    pattern(
        r"^------\[ Logical CPU #(\d+) \]------$",
        ParseState::CpuidRegisters,
        IndexRule::Captured,
        false,
    ),
    // Ryzen Z1 dumps lead CPUID regions with an affinity-group line that
    // names no CPU number at all.
    pattern(
        r"^Group: 0x00 Affinity mask: 0x[0-9A-F]+$",
        ParseState::CpuidRegisters,
        IndexRule::Guessed,
        true,
    ),
    pattern(
        r"^------\[ MSR Registers / Logical CPU #(\d+) \]------$",
        ParseState::MsrRegisters,
        IndexRule::None,
        false,
    ),
    pattern(
        r"^MSR Registers \(CPU #(\d+)\)$",
        ParseState::MsrRegisters,
        IndexRule::None,
        false,
    ),
    pattern(
        r"^PerformanceFrequency =.*$",
        ParseState::Remainder,
        IndexRule::None,
        false,
    ),
];

fn compiled_headers() -> &'static [(Regex, &'static PatternHeader)] {
    static HEADERS: OnceLock<Vec<(Regex, &'static PatternHeader)>> = OnceLock::new();
    HEADERS.get_or_init(|| {
        PATTERN_HEADERS
            .iter()
            .map(|header| (Regex::new(header.pattern).expect("valid pattern"), header))
            .collect()
    })
}

/// Matches a line against the header tables, literals before patterns.
#[must_use]
pub fn match_header(line: &str) -> Option<HeaderMatch> {
    for (text, state) in LITERAL_HEADERS {
        if line == *text {
            return Some(HeaderMatch {
                state: *state,
                cpu_index: None,
                inaccurate_topology: false,
            });
        }
    }

    for (regex, header) in compiled_headers() {
        if let Some(captures) = regex.captures(line) {
            let cpu_index = match header.index {
                IndexRule::None => None,
                IndexRule::Guessed => Some(CpuIndex::Guessed),
                IndexRule::Captured => {
                    let raw = captures.get(1)?.as_str().parse().ok()?;
                    Some(CpuIndex::Numbered(raw))
                }
            };
            return Some(HeaderMatch {
                state: header.state,
                cpu_index,
                inaccurate_topology: header.inaccurate_topology,
            });
        }
    }

    None
}

const VERSION_LABELS: &[(&str, &str)] = &[
    ("Program Version", "program_version"),
    ("LLKD Version", "llkd_version"),
    ("BenchDLL Version", "benchdll_version"),
    ("Windows Version", "windows_version"),
    ("GetProductInfo", "get_product_info"),
];

// The label column width varies between tool versions; labels are trimmed
// before lookup, so each concern needs exactly one row here.
const CPU_INFO_LABELS: &[(&str, &str)] = &[
    ("CPU Type", "cpu_type"),
    ("CPU Alias", "cpu_alias"),
    ("CPU Platform", "cpu_platform"),
    ("CPU Stepping", "cpu_stepping"),
    ("Instruction Set", "instruction_set"),
    ("CPUID Manufacturer", "cpuid_manufacturer"),
    ("CPUID CPU Name", "cpuid_cpu_name"),
    ("CPUID Revision", "cpuid_revision"),
    ("IA Brand ID", "ia_brand_id"),
    ("AMD Old Brand ID", "amd_old_brand_id"),
    ("AMD New Brand ID", "amd_new_brand_id"),
    ("AMD K10 Brand ID", "amd_k10_brand_id"),
    ("AMD K1x Brand ID", "amd_k1x_brand_id"),
    ("Platform ID", "platform_id"),
    ("HTT / CMP Units", "htt_cmp_units"),
    ("Max. NUMA Node", "max_numa_node"),
    ("Tjmax Temperature", "tjmax_temperature"),
    ("HTC Temperature Limit", "htc_temperature_limit"),
    ("CPU Thermal Design Power", "cpu_tdp"),
    ("CPU TDP", "cpu_tdp"),
    ("CPU TDC", "cpu_tdc"),
    ("DRAM TDP", "dram_tdp"),
    ("CPU Max Power Limit", "cpu_max_power_limit"),
    ("CPU Power Limit 1 (Long)", "cpu_power_limit_1"),
    ("CPU Power Limit 2 (Short)", "cpu_power_limit_2"),
    ("Max Turbo Boost Multipliers", "max_turbo_boost_multipliers"),
    ("Socket / Min / Max / Target TDP", "socket_min_max_target_tdp"),
];

const MOTHERBOARD_LABELS: &[(&str, &str)] = &[
    ("Motherboard ID", "motherboard_id"),
    ("Motherboard Model", "motherboard_model"),
    ("Motherboard Chipset", "motherboard_chipset"),
    ("Award BIOS Type", "award_bios_type"),
    ("Award BIOS Message", "award_bios_message"),
    ("DMI MB Manufacturer", "dmi_mb_manufacturer"),
    ("DMI MB Product", "dmi_mb_product"),
    ("DMI MB Version", "dmi_mb_version"),
    ("DMI MB Serial", "dmi_mb_serial"),
    ("DMI SYS Manufacturer", "dmi_sys_manufacturer"),
    ("DMI SYS Product", "dmi_sys_product"),
    ("DMI SYS Version", "dmi_sys_version"),
    ("DMI SYS Serial", "dmi_sys_serial"),
    ("DMI BIOS Version", "dmi_bios_version"),
];

/// Matches a `Label : value` data line for a metadata-carrying section.
///
/// Returns the canonical key and the trimmed value; `None` when the state
/// carries no label table or the label is unknown (the caller then retries
/// the line as a header).
#[must_use]
pub fn match_section_label(state: ParseState, line: &str) -> Option<(&'static str, &str)> {
    let table = match state {
        ParseState::Version => VERSION_LABELS,
        ParseState::PlatformSummary => CPU_INFO_LABELS,
        ParseState::MotherboardInfo => MOTHERBOARD_LABELS,
        _ => return None,
    };

    let (label, value) = line.split_once(':')?;
    let label = label.trim_end();
    let key = table
        .iter()
        .find(|(text, _)| *text == label)
        .map(|(_, key)| *key)?;
    Some((key, value.trim()))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{match_header, match_section_label, CpuIndex, HeaderMatch, ParseState};

    #[test]
    fn literal_headers_resolve() {
        let matched = match_header("------[ Versions ]------").unwrap();
        assert_eq!(
            matched,
            HeaderMatch {
                state: ParseState::Version,
                cpu_index: None,
                inaccurate_topology: false,
            }
        );
    }

    #[test]
    fn all_cpus_header_is_terminal_state() {
        let matched = match_header("------[ All CPUs ]------").unwrap();
        assert_eq!(matched.state, ParseState::AllCpuSummary);
    }

    #[rstest]
    #[case::bracketed("------[ CPUID Registers / Logical CPU #3 ]------", 3)]
    #[case::parenthesized("CPUID Registers (CPU #12)", 12)]
    #[case::affinity("CPU#2 AffMask: 0x0004", 2)]
    #[case::logical("------[ Logical CPU #0 ]------", 0)]
    fn cpuid_headers_capture_the_index(#[case] line: &str, #[case] index: u32) {
        let matched = match_header(line).unwrap();
        assert_eq!(matched.state, ParseState::CpuidRegisters);
        assert_eq!(matched.cpu_index, Some(CpuIndex::Numbered(index)));
        assert!(!matched.inaccurate_topology);
    }

    #[test]
    fn virtual_cpu_header_flags_inaccurate_topology() {
        let matched = match_header("CPUID Registers (CPU #5 Virtual)").unwrap();
        assert_eq!(matched.state, ParseState::CpuidRegisters);
        assert_eq!(matched.cpu_index, Some(CpuIndex::Numbered(5)));
        assert!(matched.inaccurate_topology);
    }

    #[test]
    fn affinity_group_header_guesses_the_index() {
        let matched = match_header("Group: 0x00 Affinity mask: 0x000000FF").unwrap();
        assert_eq!(matched.state, ParseState::CpuidRegisters);
        assert_eq!(matched.cpu_index, Some(CpuIndex::Guessed));
        assert!(matched.inaccurate_topology);
    }

    #[rstest]
    #[case::bracketed("------[ MSR Registers / Logical CPU #0 ]------")]
    #[case::parenthesized("MSR Registers (CPU #1)")]
    #[case::plain("------[ MSR Registers ]------")]
    fn msr_headers_discard_the_index(#[case] line: &str) {
        let matched = match_header(line).unwrap();
        assert_eq!(matched.state, ParseState::MsrRegisters);
        assert_eq!(matched.cpu_index, None);
    }

    #[test]
    fn remainder_marker_resolves() {
        let matched = match_header("PerformanceFrequency = 3600000000").unwrap();
        assert_eq!(matched.state, ParseState::Remainder);
    }

    #[test]
    fn unknown_lines_do_not_match() {
        assert_eq!(match_header("CPUID 00000000: 00000000-..."), None);
        assert_eq!(match_header("random prose"), None);
    }

    #[rstest]
    #[case::narrow("CPU Type          : OctalCore Intel Core i7-9700K")]
    #[case::wide("CPU Type           : OctalCore Intel Core i7-9700K")]
    fn label_widths_collapse_to_one_key(#[case] line: &str) {
        let (key, value) = match_section_label(ParseState::PlatformSummary, line).unwrap();
        assert_eq!(key, "cpu_type");
        assert_eq!(value, "OctalCore Intel Core i7-9700K");
    }

    #[test]
    fn empty_values_trim_to_empty_string() {
        let (key, value) =
            match_section_label(ParseState::Version, "GetProductInfo  : ").unwrap();
        assert_eq!(key, "get_product_info");
        assert_eq!(value, "");
    }

    #[test]
    fn unknown_labels_fall_through() {
        assert_eq!(
            match_section_label(ParseState::Version, "Mystery Field : 42"),
            None
        );
    }

    #[test]
    fn labels_are_scoped_to_their_section() {
        assert_eq!(
            match_section_label(ParseState::Version, "Motherboard ID : 63-0100"),
            None
        );
        assert!(
            match_section_label(ParseState::MotherboardInfo, "Motherboard ID : 63-0100").is_some()
        );
    }

    #[test]
    fn cpuid_state_has_no_label_table() {
        assert_eq!(
            match_section_label(ParseState::CpuidRegisters, "CPU Type : X"),
            None
        );
    }
}
