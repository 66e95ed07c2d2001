use std::collections::BTreeMap;

use serde::Serialize;

/// One outstanding predicted-taken branch and the instructions issued
/// under it.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct SpeculationRecord {
    pub(crate) branch_pc: usize,
    pub(crate) predicted_taken: bool,
    pub(crate) instructions: Vec<usize>,
}

/// Bookkeeping for all active speculations plus the latched recovery
/// request. Records are keyed by a monotonic id; "most recent" is the
/// numeric maximum, not container insertion order.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct SpeculationTracker {
    pub(crate) active: BTreeMap<u64, SpeculationRecord>,
    next_id: u64,
    pub(crate) recovery_pending: bool,
    pub(crate) recovery_pc: Option<usize>,
    // Instruction id of the mispredicted branch; everything younger
    // gets flushed.
    pub(crate) flush_after: Option<usize>,
}

impl SpeculationTracker {
    pub(crate) fn new() -> SpeculationTracker {
        SpeculationTracker {
            active: BTreeMap::new(),
            next_id: 1,
            recovery_pending: false,
            recovery_pc: None,
            flush_after: None,
        }
    }

    pub(crate) fn open(&mut self, branch_pc: usize, predicted_taken: bool) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.active.insert(
            id,
            SpeculationRecord {
                branch_pc,
                predicted_taken,
                instructions: Vec::new(),
            },
        );
        id
    }

    /// The most recently opened active speculation, if any.
    pub(crate) fn current(&self) -> Option<u64> {
        self.active.keys().next_back().copied()
    }

    pub(crate) fn remove(&mut self, id: u64) -> Option<SpeculationRecord> {
        self.active.remove(&id)
    }

    pub(crate) fn track(&mut self, id: u64, instr_id: usize) {
        if let Some(record) = self.active.get_mut(&id) {
            record.instructions.push(instr_id);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_is_highest_id() {
        let mut tracker = SpeculationTracker::new();
        assert_eq!(tracker.current(), None);

        let first = tracker.open(0, true);
        let second = tracker.open(4, true);
        assert_eq!(tracker.current(), Some(second));

        tracker.remove(second);
        assert_eq!(tracker.current(), Some(first));
    }
}
