use std::fmt;
use std::fmt::Display;

use serde::Serialize;

use crate::instructions::instructions::{mnemonic, Opcode, RegisterType, UnitKind, WordType};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub(crate) enum RSState {
    IDLE,
    BUSY,
}

/// A single reservation station. While busy it buffers one issued
/// instruction until both source operands are resolved; an operand is
/// either a value (vj/vk) or a waiting-tag (qj/qk) naming the ROB
/// entry that will produce it.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct RS {
    pub(crate) name: &'static str,
    pub(crate) kind: UnitKind,
    pub(crate) state: RSState,
    pub(crate) opcode: Option<Opcode>,
    pub(crate) instr_id: Option<usize>,
    pub(crate) vj: Option<WordType>,
    pub(crate) vk: Option<WordType>,
    pub(crate) qj: Option<u64>,
    pub(crate) qk: Option<u64>,
    pub(crate) dest: Option<RegisterType>,
    pub(crate) address: Option<WordType>,
    pub(crate) rob_id: Option<u64>,
    pub(crate) speculative: bool,
    pub(crate) speculation_id: Option<u64>,
}

impl RS {
    fn new(name: &'static str, kind: UnitKind) -> RS {
        RS {
            name,
            kind,
            state: RSState::IDLE,
            opcode: None,
            instr_id: None,
            vj: None,
            vk: None,
            qj: None,
            qk: None,
            dest: None,
            address: None,
            rob_id: None,
            speculative: false,
            speculation_id: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.state = RSState::IDLE;
        self.opcode = None;
        self.instr_id = None;
        self.vj = None;
        self.vk = None;
        self.qj = None;
        self.qk = None;
        self.dest = None;
        self.address = None;
        self.rob_id = None;
        self.speculative = false;
        self.speculation_id = None;
    }
}

impl Display for RS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(opcode) = self.opcode {
            write!(f, " {}", mnemonic(opcode))?;
        }
        Ok(())
    }
}

/// All reservation stations, in declaration order. The scan order of
/// this table is part of the observable dispatch determinism.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct RSTable {
    stations: Vec<RS>,
}

impl RSTable {
    pub(crate) fn new() -> RSTable {
        RSTable {
            stations: vec![
                RS::new("Add1", UnitKind::ADD),
                RS::new("Add2", UnitKind::ADD),
                RS::new("Add3", UnitKind::ADD),
                RS::new("Mult1", UnitKind::MULT),
                RS::new("Mult2", UnitKind::MULT),
                RS::new("Load1", UnitKind::LOAD),
                RS::new("Load2", UnitKind::LOAD),
                RS::new("Store1", UnitKind::STORE),
                RS::new("Branch1", UnitKind::BRANCH),
                RS::new("Branch2", UnitKind::BRANCH),
            ],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.stations.len()
    }

    pub(crate) fn get(&self, index: usize) -> &RS {
        &self.stations[index]
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> &mut RS {
        &mut self.stations[index]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &RS> {
        self.stations.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut RS> {
        self.stations.iter_mut()
    }

    // First idle station of the wanted kind, in declaration order.
    pub(crate) fn find_idle(&self, kind: UnitKind) -> Option<usize> {
        self.stations
            .iter()
            .position(|rs| rs.kind == kind && rs.state == RSState::IDLE)
    }

    pub(crate) fn all_idle(&self) -> bool {
        self.stations.iter().all(|rs| rs.state == RSState::IDLE)
    }
}
