use serde::Serialize;

use crate::instructions::instructions::{Opcode, UnitKind, WordType};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub(crate) enum FUState {
    IDLE,
    BUSY,
}

/// A single functional unit. `cycles_remaining` counts down during the
/// execute stage; when it reaches zero the result becomes visible one
/// cycle later (`write_back_cycle`), modelling a separate write-back
/// pipeline stage.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct FU {
    pub(crate) name: &'static str,
    pub(crate) kind: UnitKind,
    pub(crate) state: FUState,
    pub(crate) opcode: Option<Opcode>,
    pub(crate) instr_id: Option<usize>,
    pub(crate) cycles_remaining: u8,
    pub(crate) vj: Option<WordType>,
    pub(crate) vk: Option<WordType>,
    pub(crate) address: Option<WordType>,
    pub(crate) rob_id: Option<u64>,
    pub(crate) speculative: bool,
    pub(crate) speculation_id: Option<u64>,
    pub(crate) write_back_cycle: Option<u64>,
}

impl FU {
    fn new(name: &'static str, kind: UnitKind) -> FU {
        FU {
            name,
            kind,
            state: FUState::IDLE,
            opcode: None,
            instr_id: None,
            cycles_remaining: 0,
            vj: None,
            vk: None,
            address: None,
            rob_id: None,
            speculative: false,
            speculation_id: None,
            write_back_cycle: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.state = FUState::IDLE;
        self.opcode = None;
        self.instr_id = None;
        self.cycles_remaining = 0;
        self.vj = None;
        self.vk = None;
        self.address = None;
        self.rob_id = None;
        self.speculative = false;
        self.speculation_id = None;
        self.write_back_cycle = None;
    }
}

/// All functional units, in declaration order.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct FUTable {
    units: Vec<FU>,
}

impl FUTable {
    pub(crate) fn new() -> FUTable {
        FUTable {
            units: vec![
                FU::new("Add Unit 1", UnitKind::ADD),
                FU::new("Add Unit 2", UnitKind::ADD),
                FU::new("Mult Unit 1", UnitKind::MULT),
                FU::new("Load Unit 1", UnitKind::LOAD),
                FU::new("Store Unit 1", UnitKind::STORE),
                FU::new("Branch Unit 1", UnitKind::BRANCH),
            ],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.units.len()
    }

    pub(crate) fn get(&self, index: usize) -> &FU {
        &self.units[index]
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> &mut FU {
        &mut self.units[index]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &FU> {
        self.units.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut FU> {
        self.units.iter_mut()
    }

    pub(crate) fn find_idle(&self, kind: UnitKind) -> Option<usize> {
        self.units
            .iter()
            .position(|fu| fu.kind == kind && fu.state == FUState::IDLE)
    }

    pub(crate) fn all_idle(&self) -> bool {
        self.units.iter().all(|fu| fu.state == FUState::IDLE)
    }
}
