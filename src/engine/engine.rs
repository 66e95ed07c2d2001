use std::error::Error;
use std::fs::File;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::instructions::instructions::{latency, unit_kind, Instr, Opcode, Program, WordType};
use crate::pipeline::branch_predictor::{BranchPredictor, PredictorKind};
use crate::pipeline::functional_unit::{FUState, FUTable};
use crate::pipeline::register_status::RegisterFile;
use crate::pipeline::reorder_buffer::{ROBEntry, ROB};
use crate::pipeline::reservation_station::{RSState, RSTable};
use crate::pipeline::speculation::SpeculationTracker;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct Trace {
    #[serde(default)]
    pub(crate) issue: bool,
    #[serde(default)]
    pub(crate) dispatch: bool,
    #[serde(default)]
    pub(crate) execute: bool,
    #[serde(default)]
    pub(crate) write: bool,
    #[serde(default)]
    pub(crate) commit: bool,
    #[serde(default)]
    pub(crate) cycle: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct ProcessorConfig {
    // the number of instructions that can be issued per clock cycle
    pub(crate) issue_width: u8,
    // the number of instructions that can move from a reservation
    // station into a functional unit per clock cycle
    pub(crate) dispatch_width: u8,
    // the number of instructions that can retire per clock cycle
    pub(crate) commit_width: u8,
    // informational cap on outstanding predicted branches
    pub(crate) speculation_depth: u8,
    pub(crate) predictor: PredictorKind,
    #[serde(default)]
    pub(crate) trace: Trace,
}

impl Default for ProcessorConfig {
    fn default() -> ProcessorConfig {
        ProcessorConfig {
            issue_width: 2,
            dispatch_width: 2,
            commit_width: 2,
            speculation_depth: 4,
            predictor: PredictorKind::TwoBitCounter,
            trace: Trace::default(),
        }
    }
}

/// Partial configuration update; only the present fields are merged.
#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct ConfigPatch {
    pub(crate) issue_width: Option<u8>,
    pub(crate) dispatch_width: Option<u8>,
    pub(crate) commit_width: Option<u8>,
    pub(crate) speculation_depth: Option<u8>,
    pub(crate) predictor: Option<PredictorKind>,
}

pub(crate) fn load_config(file_path: &str) -> Result<ProcessorConfig, Box<dyn Error>> {
    let file = File::open(file_path)?;
    let config = serde_yaml::from_reader(file)?;
    Ok(config)
}

#[derive(Clone, Debug, Default, Serialize)]
pub(crate) struct Statistics {
    pub(crate) total_instructions: u64,
    pub(crate) speculative_instructions: u64,
    pub(crate) mispredictions: u64,
    pub(crate) flushes: u64,
    pub(crate) cycles_with_commit: u64,
    pub(crate) bubbles: u64,
    pub(crate) ipc: f64,
}

/// The complete observable micro-architectural state after a cycle.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct SimState {
    pub(crate) cycle: u64,
    pub(crate) instructions: Vec<Instr>,
    pub(crate) stations: RSTable,
    pub(crate) units: FUTable,
    pub(crate) registers: RegisterFile,
    pub(crate) rob: ROB,
    pub(crate) predictor: BranchPredictor,
    pub(crate) speculation: SpeculationTracker,
    pub(crate) pc: usize,
    pub(crate) completed: bool,
    pub(crate) config: ProcessorConfig,
    pub(crate) statistics: Statistics,
}

#[derive(Clone, Debug, Serialize)]
pub(crate) struct SimStep {
    pub(crate) cycle: u64,
    pub(crate) state: SimState,
    pub(crate) action: String,
    pub(crate) description: String,
}

/// The cycle engine. Owns all machine state exclusively; external
/// callers only read snapshots and call `step`, `update_config` or
/// `reset`.
pub(crate) struct Engine {
    state: SimState,
    history: Vec<SimStep>,
}

impl Engine {
    pub(crate) fn new(program: &Program, config: ProcessorConfig) -> Engine {
        Engine {
            state: initial_state(program, config),
            history: Vec::new(),
        }
    }

    pub(crate) fn state(&self) -> &SimState {
        &self.state
    }

    pub(crate) fn history(&self) -> &[SimStep] {
        &self.history
    }

    /// Reinitialize with a new program, keeping the configuration.
    pub(crate) fn reset(&mut self, program: &Program) {
        self.state = initial_state(program, self.state.config.clone());
        self.history.clear();
    }

    /// Merge a partial configuration; takes effect from the next cycle
    /// and never retroactively alters in-flight instructions.
    pub(crate) fn update_config(&mut self, patch: &ConfigPatch) {
        let config = &mut self.state.config;
        if let Some(issue_width) = patch.issue_width {
            config.issue_width = issue_width;
        }
        if let Some(dispatch_width) = patch.dispatch_width {
            config.dispatch_width = dispatch_width;
        }
        if let Some(commit_width) = patch.commit_width {
            config.commit_width = commit_width;
        }
        if let Some(speculation_depth) = patch.speculation_depth {
            config.speculation_depth = speculation_depth;
        }
        if let Some(predictor) = patch.predictor {
            config.predictor = predictor;
            self.state.predictor.kind = predictor;
        }
    }

    /// Advance exactly one cycle. Returns None once the program has
    /// completed.
    pub(crate) fn step(&mut self) -> Option<SimStep> {
        if self.state.completed {
            return None;
        }

        let state = &mut self.state;
        state.cycle += 1;

        let mut actions: Vec<&str> = Vec::new();
        let mut descriptions: Vec<String> = Vec::new();

        if state.speculation.recovery_pending {
            // Recovery consumes the whole cycle; no stage work happens.
            cycle_recover(state);
            actions.push("Recovery");
            descriptions
                .push("Recovering from branch misprediction - flushing speculative instructions".to_string());
        } else {
            let dispatched = cycle_dispatch(state);
            if !dispatched.is_empty() {
                let pairs: Vec<String> = dispatched
                    .iter()
                    .map(|(station, unit)| format!("{}→{}", station, unit))
                    .collect();
                actions.push("Dispatch");
                descriptions.push(format!(
                    "Dispatched {} instruction(s): {}",
                    dispatched.len(),
                    pairs.join(", ")
                ));
            }

            let (issued, speculative) = cycle_issue(state);
            if issued > 0 {
                actions.push("Issue");
                let mut desc = format!("Issued {} instruction(s)", issued);
                if speculative > 0 {
                    desc.push_str(&format!(" ({} speculative)", speculative));
                }
                descriptions.push(desc);
            }

            cycle_execute(state);

            let written = cycle_write_results(state);
            if !written.is_empty() {
                actions.push("Write");
                descriptions.push(format!(
                    "Wrote {} result(s): {}",
                    written.len(),
                    written.join(", ")
                ));
            }

            let committed = cycle_commit(state);
            if committed > 0 {
                actions.push("Commit");
                descriptions.push(format!("Committed {} instruction(s)", committed));
            }
        }

        if is_complete(state) {
            state.completed = true;
            state.statistics.bubbles = state.cycle - state.statistics.cycles_with_commit;
            state.statistics.ipc =
                state.statistics.total_instructions as f64 / state.cycle as f64;
            actions.push("Complete");
            descriptions.push("Simulation completed successfully".to_string());
        }

        if state.config.trace.cycle {
            println!(
                "[Cycle {}][Issued={}][Mispredictions={}][Flushes={}]",
                state.cycle,
                state.statistics.total_instructions,
                state.statistics.mispredictions,
                state.statistics.flushes
            );
        }

        let action = if actions.is_empty() {
            "Execute".to_string()
        } else {
            actions.join(" + ")
        };
        let description = if descriptions.is_empty() {
            format!("Cycle {}: processing instructions", state.cycle)
        } else {
            descriptions.join(" | ")
        };

        let step = SimStep {
            cycle: state.cycle,
            state: state.clone(),
            action,
            description,
        };
        self.history.push(step.clone());
        Some(step)
    }
}

fn initial_state(program: &Program, config: ProcessorConfig) -> SimState {
    let predictor = BranchPredictor::new(config.predictor);
    SimState {
        cycle: 0,
        instructions: program.code.clone(),
        stations: RSTable::new(),
        units: FUTable::new(),
        registers: RegisterFile::new(),
        rob: ROB::new(),
        predictor,
        speculation: SpeculationTracker::new(),
        pc: 0,
        completed: false,
        config,
        statistics: Statistics::default(),
    }
}

// Issues as many instructions as the issue width allows, renaming
// source operands against the register status table and opening a
// speculation record for every predicted-taken branch.
fn cycle_issue(state: &mut SimState) -> (u32, u32) {
    let mut issued = 0u32;
    let mut speculative = 0u32;

    while issued < state.config.issue_width as u32 && state.pc < state.instructions.len() {
        let pc = state.pc;
        let opcode = state.instructions[pc].opcode;

        // Structural hazard: no free station of the needed kind stops
        // issue for this cycle. Not an error, just backpressure.
        let rs_index = match state.stations.find_idle(unit_kind(opcode)) {
            Some(index) => index,
            None => break,
        };

        let current_speculation = state.speculation.current();
        let is_speculative = current_speculation.is_some();
        let is_branch = state.instructions[pc].is_branch();

        // A predicted-taken branch opens a new speculation record and
        // is tagged with it; everything issued afterwards, while this
        // record is the most recent open one, is tracked under it.
        let mut predicted_taken = false;
        if is_branch {
            predicted_taken = state.predictor.predict(pc);
            if predicted_taken {
                let speculation_id = state.speculation.open(pc, true);
                state.instructions[pc].speculation_id = Some(speculation_id);
                state.speculation.track(speculation_id, pc);
            }
        }

        let instr = &state.instructions[pc];
        let rob_id = state.rob.allocate(ROBEntry {
            id: 0,
            instr_id: instr.id,
            text: instr.to_string(),
            destination: instr.dest,
            value: None,
            ready: false,
            committed: false,
            speculative: is_speculative,
            speculation_id: current_speculation,
            is_branch,
            branch_taken: None,
            branch_target: instr.target,
        });

        let instr = &mut state.instructions[pc];
        instr.issued = Some(state.cycle);
        instr.rob_id = Some(rob_id);
        instr.speculative = is_speculative;

        let (dest, src1, src2, address, target, speculation_id) = (
            instr.dest,
            instr.src1,
            instr.src2,
            instr.address,
            instr.target,
            instr.speculation_id,
        );

        let rs = state.stations.get_mut(rs_index);
        rs.state = RSState::BUSY;
        rs.opcode = Some(opcode);
        rs.instr_id = Some(pc);
        rs.dest = dest;
        rs.address = address;
        rs.rob_id = Some(rob_id);
        rs.speculative = is_speculative;
        rs.speculation_id = speculation_id;

        // Operand resolution: a register with a pending producer tag
        // yields a waiting-tag, otherwise its committed value.
        if let Some(reg) = src1 {
            let status = state.registers.get(reg);
            if status.qi.is_some() {
                rs.qj = status.qi;
                rs.vj = None;
            } else {
                rs.vj = Some(status.value);
                rs.qj = None;
            }
        }
        if let Some(reg) = src2 {
            let status = state.registers.get(reg);
            if status.qi.is_some() {
                rs.qk = status.qi;
                rs.vk = None;
            } else {
                rs.vk = Some(status.value);
                rs.qk = None;
            }
        }

        // Register renaming: the destination now waits on this ROB
        // entry, breaking WAW and WAR hazards.
        if let Some(reg) = dest {
            if !is_branch {
                let status = state.registers.get_mut(reg);
                status.qi = Some(rob_id);
                status.speculative = is_speculative;
                status.speculation_id = speculation_id;
            }
        }

        state.statistics.total_instructions += 1;
        if is_speculative {
            state.statistics.speculative_instructions += 1;
            speculative += 1;
        }

        if let Some(outer) = current_speculation {
            state.speculation.track(outer, pc);
        }

        if state.config.trace.issue {
            println!("Issued [{}]", state.instructions[pc]);
        }

        // Predicted-taken branches redirect the program counter to the
        // predicted target; everything else falls through.
        if is_branch && predicted_taken && target.is_some() {
            state.pc = target.unwrap_or(pc + 1);
        } else {
            state.pc = pc + 1;
        }

        issued += 1;
    }

    (issued, speculative)
}

// Moves ready reservation-station entries into free functional units,
// scanning stations in declaration order. Runs before issue, so an
// instruction always stays at least one cycle in its station.
fn cycle_dispatch(state: &mut SimState) -> Vec<(&'static str, &'static str)> {
    let mut dispatched = Vec::new();

    for rs_index in 0..state.stations.len() {
        if dispatched.len() >= state.config.dispatch_width as usize {
            break;
        }

        let rs = state.stations.get(rs_index);
        if rs.state != RSState::BUSY || rs.instr_id.is_none() {
            continue;
        }

        let opcode = match rs.opcode {
            Some(opcode) => opcode,
            None => continue,
        };

        // Loads need no source operands, stores only their value
        // operand, everything else needs both.
        let operands_ready = match opcode {
            Opcode::LD => true,
            Opcode::ST => rs.qj.is_none() && rs.vj.is_some(),
            _ => rs.qj.is_none() && rs.vj.is_some() && rs.qk.is_none() && rs.vk.is_some(),
        };
        if !operands_ready {
            continue;
        }

        let fu_index = match state.units.find_idle(unit_kind(opcode)) {
            Some(index) => index,
            None => continue,
        };

        let rs = state.stations.get_mut(rs_index);
        let (station_name, instr_id, vj, vk, address, rob_id, speculative, speculation_id) = (
            rs.name,
            rs.instr_id,
            rs.vj,
            rs.vk,
            rs.address,
            rs.rob_id,
            rs.speculative,
            rs.speculation_id,
        );
        rs.reset();

        let fu = state.units.get_mut(fu_index);
        fu.state = FUState::BUSY;
        fu.opcode = Some(opcode);
        fu.instr_id = instr_id;
        fu.cycles_remaining = latency(opcode);
        fu.vj = vj;
        fu.vk = vk;
        fu.address = address;
        fu.rob_id = rob_id;
        fu.speculative = speculative;
        fu.speculation_id = speculation_id;
        fu.write_back_cycle = None;

        if state.config.trace.dispatch {
            println!("Dispatched [{}→{}]", station_name, fu.name);
        }

        dispatched.push((station_name, fu.name));
    }

    dispatched
}

// Every busy unit works off one cycle of latency. Reaching zero stamps
// the executed timestamp and schedules write-back for the next cycle.
fn cycle_execute(state: &mut SimState) {
    let cycle = state.cycle;
    let trace = state.config.trace.execute;

    for fu in state.units.iter_mut() {
        if fu.state != FUState::BUSY || fu.cycles_remaining == 0 {
            continue;
        }

        fu.cycles_remaining -= 1;
        if fu.cycles_remaining == 0 {
            if let Some(instr_id) = fu.instr_id {
                state.instructions[instr_id].executed = Some(cycle);
                if trace {
                    println!("Executed [{}]", state.instructions[instr_id]);
                }
            }
            fu.write_back_cycle = Some(cycle + 1);
        }
    }
}

// Write-result: units whose write-back cycle has arrived broadcast
// their value (or resolve their branch) and free up.
fn cycle_write_results(state: &mut SimState) -> Vec<&'static str> {
    let mut written = Vec::new();
    let cycle = state.cycle;

    for fu_index in 0..state.units.len() {
        let fu = state.units.get(fu_index);
        if fu.state != FUState::BUSY
            || fu.cycles_remaining != 0
            || fu.write_back_cycle != Some(cycle)
        {
            continue;
        }
        let instr_id = match fu.instr_id {
            Some(instr_id) => instr_id,
            None => continue,
        };
        if state.instructions[instr_id].write_result.is_some() {
            continue;
        }

        state.instructions[instr_id].write_result = Some(cycle);

        if state.instructions[instr_id].is_branch() {
            resolve_branch(state, fu_index);
        } else {
            broadcast_result(state, fu_index);
        }

        let fu = state.units.get_mut(fu_index);
        let name = fu.name;
        fu.reset();

        if state.config.trace.write {
            println!("Wrote [{}]", state.instructions[instr_id]);
        }

        written.push(name);
    }

    written
}

// The computed value, deterministic for every operation. A load
// produces its symbolic address as the value; there is no modelled
// memory to read from.
fn compute_result(opcode: Opcode, vj: WordType, vk: WordType, address: Option<WordType>) -> WordType {
    match opcode {
        Opcode::ADD => vj.wrapping_add(vk),
        Opcode::SUB => vj.wrapping_sub(vk),
        Opcode::MUL => vj.wrapping_mul(vk),
        Opcode::DIV => {
            if vk != 0 {
                vj.wrapping_div(vk)
            } else {
                0
            }
        }
        Opcode::LD => address.unwrap_or(0),
        Opcode::ST => vj,
        Opcode::BEQ | Opcode::BNE | Opcode::BGT | Opcode::BLT => 0,
    }
}

// Broadcast the unit's value to every station waiting on its ROB tag
// and mark the producing ROB entry ready.
fn broadcast_result(state: &mut SimState, fu_index: usize) {
    let fu = state.units.get(fu_index);
    let opcode = match fu.opcode {
        Some(opcode) => opcode,
        None => return,
    };
    let source = fu.rob_id;
    let result = compute_result(opcode, fu.vj.unwrap_or(0), fu.vk.unwrap_or(0), fu.address);

    for rs in state.stations.iter_mut() {
        if rs.qj.is_some() && rs.qj == source {
            rs.vj = Some(result);
            rs.qj = None;
        }
        if rs.qk.is_some() && rs.qk == source {
            rs.vk = Some(result);
            rs.qk = None;
        }
    }

    if let Some(rob_id) = source {
        if let Some(entry) = state.rob.find_mut(rob_id) {
            if !entry.ready {
                entry.value = Some(result);
                entry.ready = true;
            }
        }
    }
}

// Evaluate the branch outcome, update the predictor and either clear
// the speculation (correct) or latch a recovery for the next cycle
// (mispredicted).
fn resolve_branch(state: &mut SimState, fu_index: usize) {
    let fu = state.units.get(fu_index);
    let instr_id = match fu.instr_id {
        Some(instr_id) => instr_id,
        None => return,
    };
    let opcode = match fu.opcode {
        Some(opcode) => opcode,
        None => return,
    };
    let vj = fu.vj.unwrap_or(0);
    let vk = fu.vk.unwrap_or(0);
    let rob_id = fu.rob_id;

    let actual_taken = match opcode {
        Opcode::BEQ => vj == vk,
        Opcode::BNE => vj != vk,
        Opcode::BGT => vj > vk,
        Opcode::BLT => vj < vk,
        _ => false,
    };

    // The branch's site is its own instruction index.
    let site = instr_id;
    let predicted_taken = state.predictor.predict(site);
    state.predictor.update(site, actual_taken);

    if let Some(rob_id) = rob_id {
        if let Some(entry) = state.rob.find_mut(rob_id) {
            entry.ready = true;
            entry.branch_taken = Some(actual_taken);
        }
    }

    let target = state.instructions[instr_id].target;
    let speculation_id = state.instructions[instr_id].speculation_id;

    if actual_taken != predicted_taken {
        debug!(
            "misprediction at {}: predicted {} actual {}",
            instr_id, predicted_taken, actual_taken
        );
        state.statistics.mispredictions += 1;
        state.speculation.recovery_pending = true;
        state.speculation.recovery_pc = Some(match (actual_taken, target) {
            (true, Some(target)) => target,
            _ => instr_id + 1,
        });
        if let Some(speculation_id) = speculation_id {
            resolve_speculation(state, speculation_id, false);
        }
        state.speculation.flush_after = Some(instr_id);
    } else if let Some(speculation_id) = speculation_id {
        resolve_speculation(state, speculation_id, true);
    }
}

// A correctly resolved speculation clears the speculative flag of
// every instruction and ROB entry tagged with it; an incorrect one
// only counts the flush (the actual flushing happens in recovery).
fn resolve_speculation(state: &mut SimState, speculation_id: u64, correct: bool) {
    let record = match state.speculation.remove(speculation_id) {
        Some(record) => record,
        None => return,
    };

    if correct {
        for instr_id in &record.instructions {
            let instr = &mut state.instructions[*instr_id];
            instr.speculative = false;
            instr.speculation_id = None;
        }
        for entry in state.rob.iter_mut() {
            if entry.speculation_id == Some(speculation_id) {
                entry.speculative = false;
                entry.speculation_id = None;
            }
        }
    } else {
        state.statistics.flushes += 1;
    }
}

// The recovery pass. Discards everything younger than the mispredicted
// branch, conservatively clears all active speculations and restores
// the program counter to the redirect target.
fn cycle_recover(state: &mut SimState) {
    if let Some(branch_id) = state.speculation.flush_after {
        debug!("recovery: flushing instructions younger than {}", branch_id);

        state.rob.retain_up_to(branch_id);

        for rs in state.stations.iter_mut() {
            if matches!(rs.instr_id, Some(instr_id) if instr_id > branch_id) {
                rs.reset();
            }
        }
        for fu in state.units.iter_mut() {
            if matches!(fu.instr_id, Some(instr_id) if instr_id > branch_id) {
                fu.reset();
            }
        }

        // A register whose producer no longer survives in the ROB falls
        // back to its last committed value.
        let rob = &state.rob;
        for status in state.registers.iter_mut() {
            if matches!(status.qi, Some(qi) if !rob.contains(qi)) {
                status.qi = None;
                status.speculative = false;
                status.speculation_id = None;
            }
        }

        state.speculation.clear();

        for instr in &mut state.instructions {
            if instr.id > branch_id {
                instr.reset_progress();
            }
        }
    }

    if let Some(pc) = state.speculation.recovery_pc {
        state.pc = pc;
    }
    state.speculation.recovery_pending = false;
    state.speculation.recovery_pc = None;
    state.speculation.flush_after = None;
}

// In-order commit from the ROB head. A ready entry commits only when
// it is not speculative and its result was written in an earlier
// cycle.
fn cycle_commit(state: &mut SimState) -> u32 {
    let mut committed = 0u32;

    while committed < state.config.commit_width as u32 {
        let head = match state.rob.head() {
            Some(head) => head,
            None => break,
        };
        if !head.ready || head.committed || head.speculative {
            break;
        }

        let instr_id = head.instr_id;
        match state.instructions[instr_id].write_result {
            Some(write_result) if write_result < state.cycle => {}
            _ => break,
        }

        let head = match state.rob.head_mut() {
            Some(head) => head,
            None => break,
        };
        let (rob_id, destination, value) = (head.id, head.destination, head.value);
        head.committed = true;

        if let (Some(reg), Some(value)) = (destination, value) {
            let status = state.registers.get_mut(reg);
            status.value = value;
            // The tag is only cleared when this entry is still the
            // register's pending producer; a younger rename keeps it.
            if status.qi == Some(rob_id) {
                status.qi = None;
                status.speculative = false;
                status.speculation_id = None;
            }
        }

        state.instructions[instr_id].committed = Some(state.cycle);
        let _ = state.rob.pop_head();

        if state.config.trace.commit {
            println!("Committed [{}]", state.instructions[instr_id]);
        }

        committed += 1;
    }

    if committed > 0 {
        state.statistics.cycles_with_commit += 1;
    }

    committed
}

fn is_complete(state: &SimState) -> bool {
    state.pc >= state.instructions.len()
        && state.rob.is_empty()
        && state.stations.all_idle()
        && state.units.all_idle()
        && !state.speculation.recovery_pending
}
