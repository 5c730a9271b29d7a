use clap::Args;
use habitflow_core::CompletionRecord;
use uuid::Uuid;

use super::{open_engine, parse_id, parse_time, print_json, CliResult};

#[derive(Args)]
pub struct CompleteArgs {
    /// Habit ID
    id: String,
    /// Completion time (RFC 3339, default: now)
    #[arg(long)]
    at: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    /// Minutes spent
    #[arg(long)]
    duration: Option<u32>,
    /// Mood rating, 1-5
    #[arg(long)]
    mood: Option<u8>,
    /// Difficulty rating, 1-5
    #[arg(long)]
    difficulty: Option<u8>,
    /// Event ID (UUID); resubmitting the same ID records the completion once
    #[arg(long)]
    event_id: Option<Uuid>,
}

pub fn run(args: CompleteArgs) -> CliResult {
    let (engine, _) = open_engine()?;

    let mut record = CompletionRecord::new(parse_id(&args.id)?, parse_time(args.at.as_deref())?);
    if let Some(event_id) = args.event_id {
        record = record.with_event_id(event_id);
    }
    if let Some(notes) = args.notes {
        record = record.with_notes(notes);
    }
    if let Some(minutes) = args.duration {
        record = record.with_duration(minutes);
    }
    if let Some(mood) = args.mood {
        record = record.with_mood(mood)?;
    }
    if let Some(difficulty) = args.difficulty {
        record = record.with_difficulty(difficulty)?;
    }

    let streak = engine.tracker().track_completion(&record)?;
    print_json(&streak)
}
