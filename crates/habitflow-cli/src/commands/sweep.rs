use super::{open_engine, print_json, CliResult};

pub fn run() -> CliResult {
    let (engine, _) = open_engine()?;
    let report = engine.sweeper().sweep_now()?;
    print_json(&report)
}
