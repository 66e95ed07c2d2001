use std::path::PathBuf;
use std::process::exit;

use structopt::StructOpt;

use crate::engine::engine::{load_config, Engine};
use crate::loader::loader::{load, LoadError};

mod engine;
mod engine_tests;
mod instructions;
mod loader;
mod pipeline;

#[derive(StructOpt, Debug)]
#[structopt(name = "Tomasulo Simulator")]
struct Opt {
    /// Path of the program to load
    #[structopt(short, long, parse(from_os_str))]
    file: PathBuf,

    /// Sets a custom config file
    #[structopt(short, long, parse(from_os_str), default_value = "sim.yaml")]
    config: PathBuf,

    /// Dump the final machine state as YAML
    #[structopt(long)]
    dump_state: bool,
}

fn main() {
    let opt = Opt::from_args();

    let config_path = opt.config.to_str().unwrap_or("sim.yaml");
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(error) => {
            println!("Failed to load {}. Cause: {}", config_path, error);
            exit(1);
        }
    };

    let path = opt.file.to_str().unwrap_or("");
    let program = match load(path) {
        Ok(program) => program,
        Err(err) => {
            println!("Loading program '{}' failed.", path);
            match err {
                LoadError::ParseError(msg) => println!("{}", msg),
                LoadError::AnalysisError(msg_vec) => {
                    for msg in msg_vec {
                        println!("{}", msg);
                    }
                }
                LoadError::NotFoundError(msg) => println!("{}", msg),
                LoadError::IOError(msg) => println!("{}", msg),
            }
            exit(1);
        }
    };

    println!("Loaded {} instruction(s) from {}", program.len(), path);

    let mut engine = Engine::new(&program, config);
    while let Some(step) = engine.step() {
        println!("[Cycle {}] {}: {}", step.cycle, step.action, step.description);
    }

    let state = engine.state();
    let statistics = &state.statistics;
    println!("Cycles:            {}", state.cycle);
    println!("Instructions:      {}", statistics.total_instructions);
    println!("  speculative:     {}", statistics.speculative_instructions);
    println!("IPC:               {:.2}", statistics.ipc);
    println!("Bubbles:           {}", statistics.bubbles);
    println!("Mispredictions:    {}", statistics.mispredictions);
    println!("Flushes:           {}", statistics.flushes);
    println!(
        "Branch accuracy:   {:.2} ({}/{})",
        state.predictor.accuracy(),
        state.predictor.correct,
        state.predictor.total
    );
    println!("History entries:   {}", engine.history().len());

    if opt.dump_state {
        match serde_yaml::to_string(state) {
            Ok(yaml) => println!("{}", yaml),
            Err(error) => println!("Failed to serialize state: {}", error),
        }
    }
}
