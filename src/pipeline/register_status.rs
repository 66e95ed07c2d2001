use serde::Serialize;

use crate::instructions::instructions::{RegisterType, WordType, ARCH_REG_COUNT};

/// Committed value plus the pending-producer tag of one architectural
/// register. The register is ready exactly when `qi` is None; renaming
/// keeps at most one outstanding producer per register.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct RegisterStatus {
    pub(crate) value: WordType,
    pub(crate) qi: Option<u64>,
    pub(crate) speculative: bool,
    pub(crate) speculation_id: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub(crate) struct RegisterFile {
    entries: Vec<RegisterStatus>,
}

impl RegisterFile {
    // Deterministic seed scheme: register i starts out holding i*10.
    pub(crate) fn new() -> RegisterFile {
        let mut entries = Vec::with_capacity(ARCH_REG_COUNT as usize);
        for i in 0..ARCH_REG_COUNT {
            entries.push(RegisterStatus {
                value: i as WordType * 10,
                qi: None,
                speculative: false,
                speculation_id: None,
            });
        }
        RegisterFile { entries }
    }

    pub(crate) fn get(&self, reg: RegisterType) -> &RegisterStatus {
        &self.entries[reg as usize]
    }

    pub(crate) fn get_mut(&mut self, reg: RegisterType) -> &mut RegisterStatus {
        &mut self.entries[reg as usize]
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut RegisterStatus> {
        self.entries.iter_mut()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &RegisterStatus> {
        self.entries.iter()
    }
}
