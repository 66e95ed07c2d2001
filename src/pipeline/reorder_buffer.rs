use std::collections::VecDeque;

use serde::Serialize;

use crate::instructions::instructions::{RegisterType, WordType};

/// One in-flight instruction, ordered by issue. `id` is the monotonic
/// rename tag that register status entries and reservation stations
/// wait on.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct ROBEntry {
    pub(crate) id: u64,
    pub(crate) instr_id: usize,
    pub(crate) text: String,
    pub(crate) destination: Option<RegisterType>,
    pub(crate) value: Option<WordType>,
    pub(crate) ready: bool,
    pub(crate) committed: bool,
    pub(crate) speculative: bool,
    pub(crate) speculation_id: Option<u64>,
    pub(crate) is_branch: bool,
    pub(crate) branch_taken: Option<bool>,
    pub(crate) branch_target: Option<usize>,
}

/// The reorder buffer. Entries enter at the tail in issue order and
/// only ever leave from the head (commit) or through a flush that
/// drops everything younger than a mispredicted branch.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct ROB {
    next_id: u64,
    entries: VecDeque<ROBEntry>,
}

impl ROB {
    pub(crate) fn new() -> ROB {
        ROB {
            next_id: 0,
            entries: VecDeque::new(),
        }
    }

    pub(crate) fn allocate(&mut self, mut entry: ROBEntry) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        entry.id = id;
        self.entries.push_back(entry);
        id
    }

    pub(crate) fn head(&self) -> Option<&ROBEntry> {
        self.entries.front()
    }

    pub(crate) fn head_mut(&mut self) -> Option<&mut ROBEntry> {
        self.entries.front_mut()
    }

    pub(crate) fn pop_head(&mut self) -> Option<ROBEntry> {
        self.entries.pop_front()
    }

    pub(crate) fn find_mut(&mut self, id: u64) -> Option<&mut ROBEntry> {
        self.entries.iter_mut().find(|entry| entry.id == id)
    }

    pub(crate) fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ROBEntry> {
        self.entries.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut ROBEntry> {
        self.entries.iter_mut()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Flush: drop every entry issued after the given instruction.
    pub(crate) fn retain_up_to(&mut self, instr_id: usize) {
        self.entries.retain(|entry| entry.instr_id <= instr_id);
    }
}
