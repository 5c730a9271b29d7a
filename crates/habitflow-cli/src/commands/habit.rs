//! Habit management commands for CLI.

use clap::{Args, Subcommand};
use habitflow_core::{Habit, HabitRegistry, RecurrencePolicy, StreakStore};
use serde::Serialize;

use super::{open_engine, parse_id, parse_time, print_json, CliResult};

#[derive(Args)]
pub struct PolicyArgs {
    /// Frequency: daily, weekly, monthly, yearly, x_times_per_week,
    /// x_times_per_month, specific_days or custom
    #[arg(long, default_value = "daily")]
    frequency: String,
    /// Required completions per period for the x_times frequencies
    #[arg(long)]
    times: Option<u32>,
    /// Comma-separated weekdays for specific_days (e.g. "mon,thu")
    #[arg(long)]
    days: Option<String>,
    /// Raw JSON schedule payload; overrides --times and --days
    #[arg(long)]
    schedule: Option<String>,
}

impl PolicyArgs {
    fn policy(&self) -> RecurrencePolicy {
        let schedule = match (&self.schedule, self.times, &self.days) {
            (Some(raw), _, _) => Some(raw.clone()),
            (None, Some(times), _) => Some(serde_json::json!({ "times": times }).to_string()),
            (None, None, Some(days)) => {
                let days: Vec<&str> = days.split(',').map(str::trim).collect();
                Some(serde_json::json!({ "days": days }).to_string())
            }
            (None, None, None) => None,
        };
        RecurrencePolicy::parse(&self.frequency, schedule.as_deref())
    }
}

#[derive(Subcommand)]
pub enum HabitAction {
    /// Create a habit and initialize its streak
    Create {
        /// Owning user
        #[arg(long, default_value = "default")]
        user: String,
        #[command(flatten)]
        policy: PolicyArgs,
        /// Creation time (RFC 3339, default: now)
        #[arg(long)]
        at: Option<String>,
    },
    /// List habits
    List {
        /// Filter by user
        #[arg(long)]
        user: Option<String>,
    },
    /// Get habit details with its streak record
    Get {
        /// Habit ID
        id: String,
    },
    /// Change a habit's recurrence policy
    SetPolicy {
        /// Habit ID
        id: String,
        #[command(flatten)]
        policy: PolicyArgs,
    },
    /// Delete a habit, its completions and its streak
    Delete {
        /// Habit ID
        id: String,
    },
}

#[derive(Serialize)]
struct HabitView {
    #[serde(flatten)]
    habit: Habit,
    schedule: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    streak: Option<habitflow_core::StreakState>,
}

pub fn run(action: HabitAction) -> CliResult {
    let (engine, _) = open_engine()?;

    match action {
        HabitAction::Create { user, policy, at } => {
            let habit = Habit::new(user, policy.policy(), parse_time(at.as_deref())?);
            let streak = engine.add_habit(&habit)?;
            eprintln!("Habit created: {}", habit.id);
            print_json(&HabitView {
                schedule: habit.policy.describe(),
                habit,
                streak: Some(streak),
            })?;
        }
        HabitAction::List { user } => {
            let habits = match user {
                Some(user) => engine.store().habits_for_user(&user)?,
                None => engine.store().habits()?,
            };
            let views: Vec<HabitView> = habits
                .into_iter()
                .map(|habit| HabitView {
                    schedule: habit.policy.describe(),
                    habit,
                    streak: None,
                })
                .collect();
            print_json(&views)?;
        }
        HabitAction::Get { id } => {
            let id = parse_id(&id)?;
            let habit = engine
                .store()
                .habit(id)?
                .ok_or_else(|| format!("habit not found: {id}"))?;
            let streak = engine.store().load(id)?;
            print_json(&HabitView {
                schedule: habit.policy.describe(),
                habit,
                streak,
            })?;
        }
        HabitAction::SetPolicy { id, policy } => {
            let streak = engine.change_policy(parse_id(&id)?, policy.policy())?;
            print_json(&streak)?;
        }
        HabitAction::Delete { id } => {
            let id = parse_id(&id)?;
            if engine.delete_habit(id)? {
                println!("Habit deleted: {id}");
            } else {
                return Err(format!("habit not found: {id}").into());
            }
        }
    }
    Ok(())
}
