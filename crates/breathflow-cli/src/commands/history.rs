use breathflow_core::Config;
use clap::Args;

use super::{open_store, CliResult};

#[derive(Args)]
pub struct HistoryArgs {
    /// Print as JSON
    #[arg(long)]
    json: bool,
    /// Only the most recent N sessions
    #[arg(long)]
    limit: Option<usize>,
}

pub fn run(args: HistoryArgs) -> CliResult {
    let config = Config::load()?;
    let store = open_store(&config)?;
    let mut sessions = store.sessions()?;
    if let Some(limit) = args.limit {
        let skip = sessions.len().saturating_sub(limit);
        sessions.drain(..skip);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }
    if sessions.is_empty() {
        println!("no sessions recorded");
        return Ok(());
    }
    for s in sessions {
        println!(
            "{}  {:<12} {:>3} cycles {:>7.1}s  {:<9} {}",
            s.start_time.format("%Y-%m-%d %H:%M"),
            s.pattern_id,
            s.cycle_count,
            s.duration_secs(),
            format!("{:?}", s.sync_state).to_lowercase(),
            if s.completed { "completed" } else { "stopped early" }
        );
    }
    Ok(())
}
