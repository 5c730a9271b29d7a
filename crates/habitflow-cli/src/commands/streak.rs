use super::{open_engine, parse_id, print_json, CliResult};

pub fn run(id: &str) -> CliResult {
    let (engine, _) = open_engine()?;
    let streak = engine.tracker().streak(parse_id(id)?)?;
    print_json(&streak)
}
