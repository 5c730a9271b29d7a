use clap::Subcommand;

use super::{open_engine, parse_id, print_json, CliResult};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Aggregate streak statistics for a user
    Summary {
        #[arg(long, default_value = "default")]
        user: String,
    },
    /// Report for one habit
    Report {
        /// Habit ID
        id: String,
    },
    /// Longest current streaks
    Top {
        #[arg(long, default_value = "default")]
        user: String,
        #[arg(long, default_value = "5")]
        limit: usize,
    },
    /// Habits with a low completion rate
    Attention {
        #[arg(long, default_value = "default")]
        user: String,
        #[arg(long, default_value = "5")]
        limit: usize,
    },
    /// Streaks broken recently
    Broken {
        #[arg(long, default_value = "default")]
        user: String,
        /// Look-back window in days
        #[arg(long, default_value = "7")]
        days: i64,
    },
    /// Habits ranked by completion rate
    Efficiency {
        #[arg(long, default_value = "default")]
        user: String,
        #[arg(long, default_value = "5")]
        limit: usize,
    },
    /// Completions by hour of day over the last three months
    TimeOfDay {
        #[arg(long, default_value = "default")]
        user: String,
    },
    /// Completions per day and per week
    Trends {
        #[arg(long, default_value = "default")]
        user: String,
        /// Window in days, ending now
        #[arg(long, default_value = "30")]
        days: i64,
    },
    /// Most recent completion of a habit
    Latest {
        /// Habit ID
        id: String,
    },
}

pub fn run(action: StatsAction) -> CliResult {
    let (engine, _) = open_engine()?;

    match action {
        StatsAction::Summary { user } => print_json(&engine.statistics(&user)?),
        StatsAction::Report { id } => print_json(&engine.report(parse_id(&id)?)?),
        StatsAction::Top { user, limit } => print_json(&engine.top_streaks(&user, limit)?),
        StatsAction::Attention { user, limit } => {
            print_json(&engine.needing_attention(&user, limit)?)
        }
        StatsAction::Broken { user, days } => print_json(&engine.recently_broken(&user, days)?),
        StatsAction::Efficiency { user, limit } => {
            print_json(&engine.streaks_by_efficiency(&user, limit)?)
        }
        StatsAction::TimeOfDay { user } => print_json(&engine.time_of_day(&user)?),
        StatsAction::Trends { user, days } => print_json(&engine.completion_trends(&user, days)?),
        StatsAction::Latest { id } => print_json(&engine.most_recent_completion(parse_id(&id)?)?),
    }
}
