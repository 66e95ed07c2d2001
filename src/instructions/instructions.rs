use std::fmt;

use serde::Serialize;

pub(crate) type RegisterType = u8;
pub(crate) type WordType = i64;

// The number of architectural registers (R0..R7).
pub(crate) const ARCH_REG_COUNT: RegisterType = 8;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub(crate) enum Opcode {
    ADD,
    SUB,
    MUL,
    DIV,
    LD,
    ST,
    BEQ,
    BNE,
    BGT,
    BLT,
}

pub(crate) fn mnemonic(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::ADD => "ADD",
        Opcode::SUB => "SUB",
        Opcode::MUL => "MUL",
        Opcode::DIV => "DIV",
        Opcode::LD => "LD",
        Opcode::ST => "ST",
        Opcode::BEQ => "BEQ",
        Opcode::BNE => "BNE",
        Opcode::BGT => "BGT",
        Opcode::BLT => "BLT",
    }
}

pub(crate) fn get_opcode(mnemonic: &str) -> Option<Opcode> {
    let string = mnemonic.to_uppercase();

    match string.as_str() {
        "ADD" => Some(Opcode::ADD),
        "SUB" => Some(Opcode::SUB),
        "MUL" => Some(Opcode::MUL),
        "DIV" => Some(Opcode::DIV),
        "LD" => Some(Opcode::LD),
        "ST" => Some(Opcode::ST),
        "BEQ" => Some(Opcode::BEQ),
        "BNE" => Some(Opcode::BNE),
        "BGT" => Some(Opcode::BGT),
        "BLT" => Some(Opcode::BLT),
        _ => None,
    }
}

/// The five resource kinds shared by reservation stations and
/// functional units.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub(crate) enum UnitKind {
    ADD,
    MULT,
    LOAD,
    STORE,
    BRANCH,
}

pub(crate) fn unit_kind(opcode: Opcode) -> UnitKind {
    match opcode {
        Opcode::ADD | Opcode::SUB => UnitKind::ADD,
        Opcode::MUL | Opcode::DIV => UnitKind::MULT,
        Opcode::LD => UnitKind::LOAD,
        Opcode::ST => UnitKind::STORE,
        Opcode::BEQ | Opcode::BNE | Opcode::BGT | Opcode::BLT => UnitKind::BRANCH,
    }
}

// Execution latency in cycles, counted from the dispatch cycle.
pub(crate) fn latency(opcode: Opcode) -> u8 {
    match opcode {
        Opcode::ADD | Opcode::SUB => 2,
        Opcode::MUL => 4,
        Opcode::DIV => 8,
        Opcode::LD | Opcode::ST => 3,
        Opcode::BEQ | Opcode::BNE | Opcode::BGT | Opcode::BLT => 1,
    }
}

/// A single instruction of the loaded program. The operand fields are
/// immutable after load; the progress timestamps are stamped as the
/// instruction moves through the pipeline and cleared again when a
/// misprediction flushes it.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct Instr {
    pub(crate) id: usize,
    pub(crate) opcode: Opcode,
    pub(crate) dest: Option<RegisterType>,
    pub(crate) src1: Option<RegisterType>,
    pub(crate) src2: Option<RegisterType>,
    // Symbolic memory tag for LD/ST; not an index into a modelled store.
    pub(crate) address: Option<WordType>,
    // Branch target as an instruction index.
    pub(crate) target: Option<usize>,
    pub(crate) issued: Option<u64>,
    pub(crate) executed: Option<u64>,
    pub(crate) write_result: Option<u64>,
    pub(crate) committed: Option<u64>,
    pub(crate) rob_id: Option<u64>,
    pub(crate) speculative: bool,
    pub(crate) speculation_id: Option<u64>,
}

impl Instr {
    pub(crate) fn new(id: usize, opcode: Opcode) -> Instr {
        Instr {
            id,
            opcode,
            dest: None,
            src1: None,
            src2: None,
            address: None,
            target: None,
            issued: None,
            executed: None,
            write_result: None,
            committed: None,
            rob_id: None,
            speculative: false,
            speculation_id: None,
        }
    }

    pub(crate) fn is_branch(&self) -> bool {
        unit_kind(self.opcode) == UnitKind::BRANCH
    }

    // Undo every trace the pipeline left on this instruction so that a
    // re-issue after a flush is indistinguishable from the first issue.
    pub(crate) fn reset_progress(&mut self) {
        self.issued = None;
        self.executed = None;
        self.write_result = None;
        self.committed = None;
        self.rob_id = None;
        self.speculative = false;
        self.speculation_id = None;
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", mnemonic(self.opcode))?;

        match self.opcode {
            Opcode::ADD | Opcode::SUB | Opcode::MUL | Opcode::DIV => write!(
                f,
                " R{}, R{}, R{}",
                self.dest.unwrap_or(0),
                self.src1.unwrap_or(0),
                self.src2.unwrap_or(0)
            ),
            Opcode::LD => write!(f, " R{}, {}", self.dest.unwrap_or(0), self.address.unwrap_or(0)),
            Opcode::ST => write!(f, " R{}, {}", self.src1.unwrap_or(0), self.address.unwrap_or(0)),
            Opcode::BEQ | Opcode::BNE | Opcode::BGT | Opcode::BLT => write!(
                f,
                " R{}, R{}, {}",
                self.src1.unwrap_or(0),
                self.src2.unwrap_or(0),
                self.target.unwrap_or(0)
            ),
        }
    }
}

/// The static program; read-only to the engine.
#[derive(Clone, Debug)]
pub(crate) struct Program {
    pub(crate) code: Vec<Instr>,
}

impl Program {
    pub(crate) fn len(&self) -> usize {
        self.code.len()
    }
}
