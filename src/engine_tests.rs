#[cfg(test)]
mod tests {
    use crate::engine::engine::{ConfigPatch, Engine, ProcessorConfig, SimState, SimStep};
    use crate::instructions::instructions::{RegisterType, WordType};
    use crate::loader::loader::load_from_string;
    use crate::pipeline::branch_predictor::PredictorKind;
    use crate::pipeline::reservation_station::RS;

    struct TestHarness {
        engine: Engine,
    }

    impl TestHarness {
        fn new(src: &str) -> TestHarness {
            Self::with_config(src, ProcessorConfig::default())
        }

        fn with_predictor(src: &str, predictor: PredictorKind) -> TestHarness {
            let mut config = ProcessorConfig::default();
            config.predictor = predictor;
            Self::with_config(src, config)
        }

        fn with_config(src: &str, config: ProcessorConfig) -> TestHarness {
            let program = load_from_string(src).expect("program should load");
            TestHarness {
                engine: Engine::new(&program, config),
            }
        }

        fn step(&mut self) -> SimStep {
            self.engine.step().expect("simulation should not be completed")
        }

        fn run_to_completion(&mut self) -> u64 {
            let mut guard = 0;
            while self.engine.step().is_some() {
                guard += 1;
                assert!(guard < 1000, "simulation did not complete within 1000 cycles");
            }
            self.engine.state().cycle
        }

        fn state(&self) -> &SimState {
            self.engine.state()
        }

        fn station(&self, name: &str) -> &RS {
            self.state()
                .stations
                .iter()
                .find(|rs| rs.name == name)
                .expect("station should exist")
        }

        fn assert_reg_value(&self, reg: RegisterType, value: WordType) {
            assert_eq!(self.state().registers.get(reg).value, value);
        }
    }

    #[test]
    fn test_load_load_add() {
        let src = r#"
LD R1, 100
LD R2, 104
ADD R3, R1, R2
"#;
        let mut harness = TestHarness::new(src);
        let cycles = harness.run_to_completion();

        assert!(cycles < 30, "expected a bounded cycle count, got {}", cycles);
        // a load produces its symbolic address as the value
        harness.assert_reg_value(1, 100);
        harness.assert_reg_value(2, 104);
        harness.assert_reg_value(3, 204);

        let statistics = &harness.state().statistics;
        assert_eq!(statistics.total_instructions, 3);
        assert_eq!(statistics.mispredictions, 0);
        assert_eq!(statistics.flushes, 0);
    }

    #[test]
    fn test_raw_dependency_waits_on_rob_tag() {
        let src = r#"
ADD R1, R2, R3
ADD R1, R1, R4
"#;
        let mut harness = TestHarness::new(src);
        harness.step();

        // Both issued in cycle 1. The second instruction's R1 operand
        // must wait on the first's ROB entry (id 0), not read the
        // committed register value.
        let station = harness.station("Add2");
        assert_eq!(station.qj, Some(0));
        assert_eq!(station.vj, None);
        // R4 was ready
        assert_eq!(station.qk, None);
        assert_eq!(station.vk, Some(40));

        // WAW: R1's producer tag names the youngest writer only.
        assert_eq!(harness.state().registers.get(1).qi, Some(1));

        harness.run_to_completion();
        // (20 + 30) + 40
        harness.assert_reg_value(1, 90);
    }

    #[test]
    fn test_rename_safety_invariant() {
        let src = r#"
ADD R1, R2, R3
ADD R1, R1, R4
ADD R5, R1, R1
"#;
        let mut harness = TestHarness::new(src);

        loop {
            // At every observable snapshot each register has at most
            // one outstanding producer, and every tag names a live ROB
            // entry.
            for status in harness.state().registers.iter() {
                if let Some(qi) = status.qi {
                    assert!(harness.state().rob.contains(qi));
                }
            }
            if harness.engine.step().is_none() {
                break;
            }
        }

        harness.assert_reg_value(1, 90);
        harness.assert_reg_value(5, 180);
    }

    #[test]
    fn test_misprediction_recovery() {
        // Predictor never takes; BEQ R0, R0 is always taken, so the
        // two fall-through instructions are issued and then flushed.
        let src = r#"
BEQ R0, R0, 3
ADD R1, R1, R2
ADD R2, R2, R3
ADD R4, R4, R5
"#;
        let mut harness = TestHarness::with_predictor(src, PredictorKind::AlwaysNotTaken);

        // cycle 1: issue BEQ + ADD, cycle 2: dispatch + issue rest,
        // cycle 3: branch resolves and latches recovery.
        harness.step();
        harness.step();
        let step = harness.step();
        assert!(step.action.contains("Write"));
        assert_eq!(harness.state().statistics.mispredictions, 1);
        assert!(harness.state().speculation.recovery_pending);

        // cycle 4 is recovery only
        let step = harness.step();
        assert!(step.action.contains("Recovery"));

        let state = harness.state();
        assert_eq!(state.pc, 3);
        assert!(!state.speculation.recovery_pending);
        assert!(state.speculation.active.is_empty());
        // no ROB entry, station or unit may reference anything younger
        // than the mispredicted branch
        assert!(state.rob.iter().all(|entry| entry.instr_id == 0));
        for rs in state.stations.iter() {
            assert!(rs.instr_id.is_none());
        }
        for fu in state.units.iter() {
            assert!(fu.instr_id.is_none());
        }
        // flushed instructions look like they were never issued
        assert_eq!(state.instructions[1].issued, None);
        assert_eq!(state.instructions[1].executed, None);
        assert_eq!(state.instructions[2].issued, None);
        assert_eq!(state.instructions[2].executed, None);

        harness.run_to_completion();
        // only the redirect target executed
        harness.assert_reg_value(4, 90);
        harness.assert_reg_value(1, 10);
        harness.assert_reg_value(2, 20);
    }

    #[test]
    fn test_correct_prediction_clears_speculation_at_resolution() {
        let src = r#"
BEQ R0, R0, 2
ADD R1, R1, R2
ADD R3, R3, R4
"#;
        let mut harness = TestHarness::with_predictor(src, PredictorKind::AlwaysTaken);

        // cycle 1: both issue; the ADD at the target is speculative.
        harness.step();
        let state = harness.state();
        assert!(state.instructions[2].speculative);
        let entry = state
            .rob
            .iter()
            .find(|entry| entry.instr_id == 2)
            .expect("speculative ADD should hold a ROB entry");
        assert!(entry.speculative);
        assert_eq!(entry.speculation_id, Some(1));

        // cycle 2: dispatch, cycle 3: branch resolves correctly.
        harness.step();
        harness.step();

        let state = harness.state();
        // speculative flags clear exactly at resolution, well before
        // commit
        assert!(!state.instructions[2].speculative);
        assert_eq!(state.instructions[2].speculation_id, None);
        assert_eq!(state.instructions[2].committed, None);
        assert!(state.speculation.active.is_empty());
        for entry in state.rob.iter() {
            assert!(!entry.speculative);
        }

        harness.run_to_completion();
        harness.assert_reg_value(3, 70);
        let state = harness.state();
        assert_eq!(state.statistics.mispredictions, 0);
        assert_eq!(state.statistics.flushes, 0);
        assert_eq!(state.predictor.correct, 1);
        assert_eq!(state.predictor.total, 1);
        // the fall-through instruction never ran
        assert_eq!(state.instructions[1].issued, None);
        harness.assert_reg_value(1, 10);
    }

    #[test]
    fn test_misprediction_clears_all_speculations() {
        // Two predicted-taken branches in flight; the older one
        // mispredicts, which conservatively discards the younger
        // speculation as well.
        let src = r#"
BEQ R0, R1, 3
ADD R1, R1, R2
ADD R2, R2, R3
BEQ R0, R0, 5
ADD R3, R3, R4
ADD R4, R4, R5
"#;
        let mut harness = TestHarness::with_predictor(src, PredictorKind::AlwaysTaken);

        harness.step();
        // both branches issued under prediction, two records open
        assert_eq!(harness.state().speculation.active.len(), 2);

        harness.step();
        let step = harness.step();
        assert!(step.action.contains("Write"));
        assert_eq!(harness.state().statistics.mispredictions, 1);
        assert_eq!(harness.state().statistics.flushes, 1);

        let step = harness.step();
        assert!(step.action.contains("Recovery"));
        assert!(harness.state().speculation.active.is_empty());
        assert_eq!(harness.state().pc, 1);

        harness.run_to_completion();
        harness.assert_reg_value(1, 30);
        harness.assert_reg_value(2, 50);
        harness.assert_reg_value(3, 30);
        harness.assert_reg_value(4, 90);
    }

    #[test]
    fn test_structural_hazard_stalls_issue() {
        // only one store station exists
        let src = r#"
ST R1, 100
ST R2, 104
"#;
        let mut harness = TestHarness::new(src);
        harness.step();

        let state = harness.state();
        assert_eq!(state.instructions[0].issued, Some(1));
        assert_eq!(state.instructions[1].issued, None);

        harness.run_to_completion();
        assert_eq!(harness.state().statistics.total_instructions, 2);
    }

    #[test]
    fn test_commit_order_and_throughput_identity() {
        let src = r#"
LD R1, 100
LD R2, 104
ADD R3, R1, R2
MUL R4, R1, R2
"#;
        let mut harness = TestHarness::new(src);
        let cycles = harness.run_to_completion();

        let state = harness.state();
        // committed timestamps are non-decreasing in program (= ROB)
        // order, and every instruction committed exactly once
        let mut last = 0;
        for instr in &state.instructions {
            let committed = instr.committed.expect("all instructions should commit");
            assert!(committed >= last);
            last = committed;
        }

        let statistics = &state.statistics;
        assert_eq!(
            statistics.bubbles,
            cycles - statistics.cycles_with_commit
        );
        let expected_ipc = statistics.total_instructions as f64 / cycles as f64;
        assert!((statistics.ipc - expected_ipc).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_is_idempotent() {
        let src = r#"
ADD R1, R2, R3
"#;
        let mut harness = TestHarness::new(src);
        harness.step();

        let first = serde_yaml::to_string(harness.state()).unwrap();
        let second = serde_yaml::to_string(harness.state()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_history_records_every_cycle() {
        let src = r#"
ADD R1, R2, R3
SUB R4, R5, R6
"#;
        let mut harness = TestHarness::new(src);
        let cycles = harness.run_to_completion();

        let history = harness.engine.history();
        assert_eq!(history.len() as u64, cycles);
        for (index, step) in history.iter().enumerate() {
            assert_eq!(step.cycle as usize, index + 1);
        }
        assert!(history.last().unwrap().action.contains("Complete"));
    }

    #[test]
    fn test_update_config() {
        let src = r#"
ADD R1, R2, R3
"#;
        let mut harness = TestHarness::new(src);

        let patch = ConfigPatch {
            issue_width: Some(1),
            predictor: Some(PredictorKind::AlwaysTaken),
            ..ConfigPatch::default()
        };
        harness.engine.update_config(&patch);

        let state = harness.state();
        assert_eq!(state.config.issue_width, 1);
        assert_eq!(state.config.commit_width, 2);
        assert_eq!(state.predictor.kind, PredictorKind::AlwaysTaken);

        harness.run_to_completion();
        harness.assert_reg_value(1, 50);
    }

    #[test]
    fn test_single_issue_width() {
        let src = r#"
ADD R1, R2, R3
SUB R4, R5, R6
"#;
        let mut config = ProcessorConfig::default();
        config.issue_width = 1;
        let mut harness = TestHarness::with_config(src, config);

        harness.step();
        let state = harness.state();
        assert_eq!(state.instructions[0].issued, Some(1));
        assert_eq!(state.instructions[1].issued, None);

        harness.run_to_completion();
        harness.assert_reg_value(1, 50);
        harness.assert_reg_value(4, -10);
    }

    #[test]
    fn test_reset_reinitializes_everything() {
        let src = r#"
ADD R1, R2, R3
"#;
        let mut harness = TestHarness::new(src);
        harness.run_to_completion();
        assert!(harness.state().completed);

        let program = load_from_string("SUB R1, R3, R2").unwrap();
        harness.engine.reset(&program);

        let state = harness.state();
        assert_eq!(state.cycle, 0);
        assert!(!state.completed);
        assert_eq!(state.registers.get(1).value, 10);
        assert!(harness.engine.history().is_empty());

        harness.run_to_completion();
        harness.assert_reg_value(1, 10);
    }

    #[test]
    fn test_store_forwards_value_operand() {
        let src = r#"
ADD R1, R2, R3
ST R1, 200
"#;
        let mut harness = TestHarness::new(src);
        harness.step();

        // the store's value operand waits on the ADD's ROB entry
        let station = harness.station("Store1");
        assert_eq!(station.qj, Some(0));

        harness.run_to_completion();
        // the store's ROB entry carried the forwarded value
        let instr = &harness.state().instructions[1];
        assert!(instr.committed.is_some());
    }

    #[test]
    fn test_div_by_zero_yields_zero() {
        let src = r#"
DIV R1, R2, R0
"#;
        let mut harness = TestHarness::new(src);
        harness.run_to_completion();
        harness.assert_reg_value(1, 0);
    }
}
