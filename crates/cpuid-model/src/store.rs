//! Per-CPU leaf/subleaf register store and its consistency rules.
//!
//! A leaf starts out as a single flat record. When a second record arrives
//! for the same leaf without a subleaf annotation, the slot is promoted to a
//! subleaf mapping with the first record at index 0. Promotion happens at
//! most once per leaf and is never undone. Whether subleaf indices come from
//! explicit annotations or from implicit appends is a document-wide
//! commitment ([`SubleafMode`]); mixing the two aborts the document.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use thiserror::Error;

use crate::record::CpuidRecord;

/// The one (leaf, subleaf) pair allowed to repeat with identical content.
/// Some AMD family 15h dumps duplicate this XSAVE subleaf on every core.
const TOLERATED_DUPLICATE: (u32, u32) = (0xD, 0x3E);

/// Document-wide source of subleaf indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubleafMode {
    /// No repeated leaf and no annotation observed yet.
    #[default]
    Undetermined,
    /// Subleaf indices are guessed from repeated un-annotated lines.
    Implicit,
    /// Subleaf indices come from explicit `[SL nn]` annotations.
    Explicit,
}

/// Storage for one leaf: a single record, or a subleaf-indexed mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LeafSlot {
    /// The leaf was observed exactly once, without a subleaf annotation.
    Single(CpuidRecord),
    /// The leaf carries per-subleaf records.
    Indexed(BTreeMap<u32, CpuidRecord>),
}

impl LeafSlot {
    /// Looks up a record in the slot.
    ///
    /// Without a requested subleaf, a flat slot yields its record and an
    /// indexed slot yields index 0 (the first observation corresponds to the
    /// subleaf-0 query). With a requested subleaf, only an indexed slot with
    /// that index yields a record.
    #[must_use]
    pub fn record(&self, subleaf: Option<u32>) -> Option<&CpuidRecord> {
        match (self, subleaf) {
            (Self::Single(record), None) => Some(record),
            (Self::Single(_), Some(_)) => None,
            (Self::Indexed(map), None) => map.get(&0),
            (Self::Indexed(map), Some(index)) => map.get(&index),
        }
    }
}

/// Failures raised by [`LogicalCpu::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Subleaf indices were sourced from both explicit annotations and
    /// implicit guessing within one document.
    #[error("subleaf indices mix explicit annotations and implicit guessing (leaf {leaf:#010X})")]
    InconsistentSubleafMode {
        /// The leaf whose commit exposed the mix.
        leaf: u32,
    },
    /// A (leaf, subleaf) pair was written twice with differing contents.
    #[error("duplicate record for leaf {leaf:#010X} subleaf {subleaf:#04X}")]
    DuplicateLeafOrSubleaf {
        /// The leaf written twice.
        leaf: u32,
        /// The occupied subleaf index.
        subleaf: u32,
    },
}

/// Package/core/thread identity of a logical CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Topology {
    /// Physical package number.
    pub package: u32,
    /// Core number within the package.
    pub core: u32,
    /// Hardware thread number within the core.
    pub thread: u32,
}

impl Topology {
    /// Creates a topology triple.
    #[must_use]
    pub const fn new(package: u32, core: u32, thread: u32) -> Self {
        Self {
            package,
            core,
            thread,
        }
    }
}

/// One logical CPU: its topology triple and its leaf map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogicalCpu {
    /// Topology identity, zeroed until a topology marker assigns it.
    pub topology: Topology,
    leaves: BTreeMap<u32, LeafSlot>,
}

impl LogicalCpu {
    /// Creates an empty logical CPU.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for a leaf, if observed.
    #[must_use]
    pub fn leaf(&self, leaf: u32) -> Option<&LeafSlot> {
        self.leaves.get(&leaf)
    }

    /// Looks up a record by leaf and optional subleaf (see
    /// [`LeafSlot::record`]).
    #[must_use]
    pub fn record(&self, leaf: u32, subleaf: Option<u32>) -> Option<&CpuidRecord> {
        self.leaves.get(&leaf).and_then(|slot| slot.record(subleaf))
    }

    /// Number of leaves observed for this CPU.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Commits one parsed register line to the store.
    ///
    /// `mode` is the document-wide subleaf-mode commitment, threaded in by
    /// the parser and updated on the first implicit or explicit observation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InconsistentSubleafMode`] when explicit and
    /// implicit subleaf sourcing meet, and
    /// [`StoreError::DuplicateLeafOrSubleaf`] when an occupied explicit
    /// index is rewritten with different contents. The sole tolerated
    /// duplicate is a byte-identical record at leaf 0xD subleaf 0x3E.
    pub fn commit(
        &mut self,
        mode: &mut SubleafMode,
        leaf: u32,
        subleaf: Option<u32>,
        record: CpuidRecord,
    ) -> Result<(), StoreError> {
        match subleaf {
            Some(index) => self.commit_explicit(mode, leaf, index, record),
            None => self.commit_bare(mode, leaf, record),
        }
    }

    fn commit_explicit(
        &mut self,
        mode: &mut SubleafMode,
        leaf: u32,
        index: u32,
        record: CpuidRecord,
    ) -> Result<(), StoreError> {
        match *mode {
            SubleafMode::Implicit => return Err(StoreError::InconsistentSubleafMode { leaf }),
            SubleafMode::Undetermined => *mode = SubleafMode::Explicit,
            SubleafMode::Explicit => {}
        }

        match self.leaves.entry(leaf) {
            Entry::Vacant(slot) => {
                let mut map = BTreeMap::new();
                map.insert(index, record);
                slot.insert(LeafSlot::Indexed(map));
                Ok(())
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                // The existing record was stored without an annotation.
                LeafSlot::Single(_) => Err(StoreError::InconsistentSubleafMode { leaf }),
                LeafSlot::Indexed(map) => {
                    if let Some(existing) = map.get(&index) {
                        let tolerated =
                            (leaf, index) == TOLERATED_DUPLICATE && *existing == record;
                        if tolerated {
                            Ok(())
                        } else {
                            Err(StoreError::DuplicateLeafOrSubleaf {
                                leaf,
                                subleaf: index,
                            })
                        }
                    } else {
                        map.insert(index, record);
                        Ok(())
                    }
                }
            },
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn commit_bare(
        &mut self,
        mode: &mut SubleafMode,
        leaf: u32,
        record: CpuidRecord,
    ) -> Result<(), StoreError> {
        match self.leaves.entry(leaf) {
            Entry::Vacant(slot) => {
                slot.insert(LeafSlot::Single(record));
                Ok(())
            }
            Entry::Occupied(mut slot) => {
                match *mode {
                    SubleafMode::Explicit => {
                        return Err(StoreError::InconsistentSubleafMode { leaf })
                    }
                    SubleafMode::Undetermined => *mode = SubleafMode::Implicit,
                    SubleafMode::Implicit => {}
                }

                let current = slot.get_mut();
                if let LeafSlot::Single(first) = *current {
                    let mut map = BTreeMap::new();
                    map.insert(0, first);
                    map.insert(1, record);
                    *current = LeafSlot::Indexed(map);
                } else if let LeafSlot::Indexed(map) = current {
                    // Implicit appends are the only growth path for an
                    // implicit mapping, so indices stay contiguous and the
                    // next index equals the mapping size.
                    let next = map.len() as u32;
                    map.insert(next, record);
                }
                Ok(())
            }
        }
    }
}
