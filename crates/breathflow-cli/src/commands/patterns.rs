use clap::Subcommand;
use breathflow_core::{Config, PatternSource};

use super::CliResult;

#[derive(Subcommand)]
pub enum PatternsAction {
    /// List built-in and custom patterns
    List {
        #[arg(long)]
        json: bool,
    },
    /// Print one pattern as JSON
    Show {
        /// Pattern id (e.g. "box", "4-7-8")
        id: String,
    },
}

pub fn run(action: PatternsAction) -> CliResult {
    let library = Config::load()?.pattern_library();
    match action {
        PatternsAction::List { json } => {
            let patterns = library.patterns();
            if json {
                println!("{}", serde_json::to_string_pretty(&patterns)?);
                return Ok(());
            }
            for p in patterns {
                println!(
                    "{:<14} {:<28} {:>5.1}s/cycle {:>5.1} bpm",
                    p.id,
                    p.name,
                    p.cycle_duration_ms() as f64 / 1000.0,
                    p.breaths_per_minute()
                );
            }
        }
        PatternsAction::Show { id } => {
            let pattern = library
                .pattern(&id)
                .ok_or_else(|| format!("unknown pattern: {id}"))?;
            println!("{}", serde_json::to_string_pretty(&pattern)?);
        }
    }
    Ok(())
}
