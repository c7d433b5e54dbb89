//! Single forward-pass document parser.
//!
//! Each non-blank line is first offered to the current section as data; a
//! line the section does not understand is retried as a section header, and
//! a line matching neither aborts the document. There is no lookahead and no
//! backtracking beyond that single retry.

use std::collections::BTreeMap;

use tracing::debug;

use cpuid_model::{LogicalCpu, StoreError, Topology};

use crate::context::DocumentContext;
use crate::errors::{DumpError, DumpErrorKind};
use crate::grammar::{
    is_cache_summary, parse_register_line, parse_topology_marker, TopologyMarker, LEAF0_PREFIX,
};
use crate::section::{
    match_header, match_section_label, CpuIndex, HeaderMatch, ParseState, MSR_DATA_PREFIX,
};

/// The completed parse of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDocument {
    /// Logical CPUs keyed by zero-based index.
    pub cpus: BTreeMap<u32, LogicalCpu>,
    /// Whether the document lacked any section header before register data.
    pub headerless: bool,
    /// Whether core attribution relied on guesswork.
    pub inaccurate_topology: bool,
    /// `Versions` section metadata, keyed by canonical label.
    pub version_info: BTreeMap<&'static str, String>,
    /// `CPU Info` section metadata, keyed by canonical label.
    pub cpu_info: BTreeMap<&'static str, String>,
    /// `Motherboard Info` section metadata, keyed by canonical label.
    pub motherboard_info: BTreeMap<&'static str, String>,
}

impl ParsedDocument {
    /// Logical CPU 0. Present in every document [`parse_document`] accepts.
    #[must_use]
    pub fn base_cpu(&self) -> Option<&LogicalCpu> {
        self.cpus.get(&0)
    }
}

/// Parses one document in a single forward pass.
///
/// `source_id` identifies the document in errors and diagnostics, usually
/// the file path. Blank lines are skipped without affecting any mode state.
///
/// # Errors
///
/// Returns a [`DumpError`] naming the offending line for unrecognized lines
/// and register-store violations, or a document-level error when logical
/// CPU 0 lacks leaf 0 at end of parse. An error aborts only this document.
pub fn parse_document(source_id: &str, text: &str) -> Result<ParsedDocument, DumpError> {
    let mut parser = Parser::new(source_id);

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        match parser.handle_line(index + 1, line)? {
            LineOutcome::Continue => {}
            LineOutcome::Halt => break,
        }
    }

    parser.finish()
}

enum LineOutcome {
    Continue,
    Halt,
}

struct Parser<'a> {
    source_id: &'a str,
    context: DocumentContext,
    cpus: BTreeMap<u32, LogicalCpu>,
    current_cpu: Option<u32>,
    version_info: BTreeMap<&'static str, String>,
    cpu_info: BTreeMap<&'static str, String>,
    motherboard_info: BTreeMap<&'static str, String>,
}

impl<'a> Parser<'a> {
    fn new(source_id: &'a str) -> Self {
        Self {
            source_id,
            context: DocumentContext::new(),
            cpus: BTreeMap::new(),
            current_cpu: None,
            version_info: BTreeMap::new(),
            cpu_info: BTreeMap::new(),
            motherboard_info: BTreeMap::new(),
        }
    }

    fn handle_line(&mut self, number: usize, line: &str) -> Result<LineOutcome, DumpError> {
        let first_content = self.context.note_content_line();

        if line.starts_with(LEAF0_PREFIX) {
            self.note_base_leaf_line(first_content, number, line)?;
        }

        if self.try_section_data(number, line)? {
            return Ok(LineOutcome::Continue);
        }

        match match_header(line) {
            Some(header) => Ok(self.apply_header(&header, number)),
            None => Err(DumpError::at(
                self.source_id,
                number,
                line,
                DumpErrorKind::UnrecognizedLine,
            )),
        }
    }

    /// Headerless-document bookkeeping for bare leaf-0 register lines. The
    /// line itself is still committed by the section-data path afterwards.
    fn note_base_leaf_line(
        &mut self,
        first_content: bool,
        number: usize,
        line: &str,
    ) -> Result<(), DumpError> {
        if first_content {
            debug!(source = self.source_id, "headerless document, guessing CPU numbers");
            self.context.begin_headerless();
            self.context.state = ParseState::CpuidRegisters;
            self.open_guessed_cpu(0);
        } else if self.context.headerless {
            if !self.context.is_guessing() {
                // A repeated leaf 0 where a header was expected.
                return Err(DumpError::at(
                    self.source_id,
                    number,
                    line,
                    DumpErrorKind::Store(StoreError::DuplicateLeafOrSubleaf {
                        leaf: 0,
                        subleaf: 0,
                    }),
                ));
            }
            let index = self.context.next_guessed_cpu();
            self.open_guessed_cpu(index);
        }
        Ok(())
    }

    fn open_guessed_cpu(&mut self, index: u32) {
        let mut cpu = LogicalCpu::new();
        cpu.topology = Topology::new(0, index, 0);
        self.cpus.insert(index, cpu);
        self.current_cpu = Some(index);
    }

    /// Offers the line to the current section. `Ok(true)` consumes it.
    fn try_section_data(&mut self, number: usize, line: &str) -> Result<bool, DumpError> {
        match self.context.state {
            ParseState::Version | ParseState::PlatformSummary | ParseState::MotherboardInfo => {
                let Some((key, value)) = match_section_label(self.context.state, line) else {
                    return Ok(false);
                };
                let map = match self.context.state {
                    ParseState::Version => &mut self.version_info,
                    ParseState::PlatformSummary => &mut self.cpu_info,
                    _ => &mut self.motherboard_info,
                };
                map.insert(key, value.to_string());
                Ok(true)
            }
            ParseState::MsrRegisters => Ok(line.starts_with(MSR_DATA_PREFIX)),
            ParseState::CpuidRegisters => self.try_cpuid_data(number, line),
            _ => Ok(false),
        }
    }

    fn try_cpuid_data(&mut self, number: usize, line: &str) -> Result<bool, DumpError> {
        if let Some(marker) = parse_topology_marker(line) {
            self.apply_topology_marker(marker);
            return Ok(true);
        }

        if let Some(register) = parse_register_line(line) {
            let Some(cpu) = self
                .current_cpu
                .and_then(|index| self.cpus.get_mut(&index))
            else {
                return Ok(false);
            };
            cpu.commit(
                &mut self.context.subleaf_mode,
                register.leaf,
                register.subleaf,
                register.record,
            )
            .map_err(|error| DumpError::at(self.source_id, number, line, error.into()))?;
            return Ok(true);
        }

        Ok(is_cache_summary(line))
    }

    fn apply_topology_marker(&mut self, marker: TopologyMarker) {
        let guessed_core = self.context.guessed_core();
        let Some(cpu) = self
            .current_cpu
            .and_then(|index| self.cpus.get_mut(&index))
        else {
            return;
        };
        match marker {
            TopologyMarker::Location(topology) => cpu.topology = topology,
            TopologyMarker::Valid => cpu.topology = Topology::new(0, guessed_core, 0),
            // The SMT sibling of the preceding CPU. More than two co-resident
            // threads per core are not modeled.
            TopologyMarker::ValidVirtual => {
                cpu.topology = Topology::new(0, guessed_core, 1);
                self.context.inaccurate_topology = true;
            }
        }
    }

    fn apply_header(&mut self, header: &HeaderMatch, number: usize) -> LineOutcome {
        if header.inaccurate_topology {
            self.context.inaccurate_topology = true;
        }

        match header.cpu_index {
            Some(CpuIndex::Numbered(raw)) => {
                let index = self.context.normalize_cpu_index(raw);
                self.cpus.insert(index, LogicalCpu::new());
                self.current_cpu = Some(index);
            }
            Some(CpuIndex::Guessed) => {
                let index = self.context.next_guessed_cpu();
                self.cpus.insert(index, LogicalCpu::new());
                self.current_cpu = Some(index);
            }
            None => {}
        }

        debug!(
            line = number,
            from = ?self.context.state,
            to = ?header.state,
            "section transition"
        );
        self.context.state = header.state;

        match header.state {
            ParseState::AllCpuSummary => LineOutcome::Halt,
            ParseState::Remainder => {
                // The remainder marker ends the pass; everything after it is
                // ignored.
                self.context.state = ParseState::Done;
                LineOutcome::Halt
            }
            _ => LineOutcome::Continue,
        }
    }

    fn finish(self) -> Result<ParsedDocument, DumpError> {
        let has_base_leaf = self
            .cpus
            .get(&0)
            .is_some_and(|cpu| cpu.leaf(0).is_some());
        if !has_base_leaf {
            return Err(DumpError::document(
                self.source_id,
                DumpErrorKind::MissingBaseLeaf,
            ));
        }

        Ok(ParsedDocument {
            cpus: self.cpus,
            headerless: self.context.headerless,
            inaccurate_topology: self.context.inaccurate_topology,
            version_info: self.version_info,
            cpu_info: self.cpu_info,
            motherboard_info: self.motherboard_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use cpuid_model::CpuidRecord;

    use super::{parse_document, DumpErrorKind};

    const MINIMAL: &str = "\
------[ CPUID Registers / Logical CPU #0 ]------
CPUID 00000000: 00000016-756E6547-6C65746E-49656E69
CPUID 00000001: 000906ED-00080800-7FFAFBBF-BFEBFBFF
";

    #[test]
    fn minimal_document_parses() {
        let document = parse_document("minimal.txt", MINIMAL).unwrap();
        assert_eq!(document.cpus.len(), 1);
        assert!(!document.headerless);

        let cpu = document.base_cpu().unwrap();
        assert_eq!(
            cpu.record(0x0, None),
            Some(&CpuidRecord::new(0x16, 0x756E_6547, 0x6C65_746E, 0x4965_6E69))
        );
    }

    #[test]
    fn blank_and_padded_lines_are_skipped() {
        let text = format!("\n\n   \n{MINIMAL}\n   \n");
        let document = parse_document("padded.txt", &text).unwrap();
        assert_eq!(document.cpus.len(), 1);
        assert!(!document.headerless);
    }

    #[test]
    fn unrecognized_line_aborts_with_position() {
        let text = format!("{MINIMAL}utter nonsense\n");
        let error = parse_document("bad.txt", &text).unwrap_err();
        assert_eq!(error.kind, DumpErrorKind::UnrecognizedLine);
        assert_eq!(error.line_number, Some(4));
        assert_eq!(error.line.as_deref(), Some("utter nonsense"));
        assert_eq!(error.source_id, "bad.txt");
    }

    #[test]
    fn empty_document_misses_the_base_leaf() {
        let error = parse_document("empty.txt", "").unwrap_err();
        assert_eq!(error.kind, DumpErrorKind::MissingBaseLeaf);
        assert_eq!(error.line, None);
    }

    #[test]
    fn cpu_zero_without_leaf_zero_is_rejected() {
        let text = "\
------[ CPUID Registers / Logical CPU #0 ]------
CPUID 00000001: 000906ED-00080800-7FFAFBBF-BFEBFBFF
";
        let error = parse_document("no-leaf0.txt", text).unwrap_err();
        assert_eq!(error.kind, DumpErrorKind::MissingBaseLeaf);
    }

    #[test]
    fn remainder_marker_halts_the_pass() {
        let text = format!("{MINIMAL}PerformanceFrequency = 3600000000\ngarbage after the end\n");
        let document = parse_document("remainder.txt", &text).unwrap();
        assert_eq!(document.cpus.len(), 1);
    }

    #[test]
    fn all_cpu_summary_halts_the_pass() {
        let text = format!("{MINIMAL}------[ All CPUs ]------\ngarbage after the end\n");
        let document = parse_document("summary.txt", &text).unwrap();
        assert_eq!(document.cpus.len(), 1);
    }

    #[test]
    fn msr_section_is_discarded_without_halting() {
        let text = format!(
            "{MINIMAL}------[ MSR Registers / Logical CPU #0 ]------
MSR 0000001B: 00000000-FEE00900
MSR C0000080: 00000000-00000D01
------[ CPUID Registers / Logical CPU #1 ]------
CPUID 00000000: 00000016-756E6547-6C65746E-49656E69
"
        );
        let document = parse_document("msrs.txt", &text).unwrap();
        assert_eq!(document.cpus.len(), 2);
    }
}
