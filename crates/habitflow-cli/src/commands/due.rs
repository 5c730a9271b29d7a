use chrono::{DateTime, Utc};
use clap::Args;
use habitflow_core::HabitId;
use serde::Serialize;

use super::{open_engine, parse_time, print_json, CliResult};

#[derive(Args)]
pub struct DueArgs {
    /// Only this user's habits
    #[arg(long)]
    user: Option<String>,
    /// Evaluate at this time (RFC 3339, default: now)
    #[arg(long)]
    at: Option<String>,
}

#[derive(Serialize)]
struct DueHabit {
    habit_id: HabitId,
    schedule: String,
    next_due_at: Option<DateTime<Utc>>,
    current_streak: u32,
}

pub fn run(args: DueArgs) -> CliResult {
    let (engine, _) = open_engine()?;
    let now = parse_time(args.at.as_deref())?;

    let due: Vec<DueHabit> = engine
        .due_habits(args.user.as_deref(), now)?
        .into_iter()
        .map(|(habit, streak)| DueHabit {
            habit_id: habit.id,
            schedule: habit.policy.describe(),
            next_due_at: streak.next_due_at,
            current_streak: streak.current_streak,
        })
        .collect();
    print_json(&due)
}
