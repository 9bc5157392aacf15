//! `config`: read and edit `config.toml` in the data directory.
//!
//! Keys are dot paths into the file's sections:
//!
//! - `features.camera`, `features.ai`, `features.audio`: requested by default
//! - `session.pattern_id`, `session.target_cycles` (0 = until stopped),
//!   `session.allow_mobile`
//! - `sync.endpoint`, `sync.api_key`, `sync.interval_secs`,
//!   `sync.batch_size`, `sync.max_attempts`
//!
//! Every write is validated before it reaches disk.

use breathflow_core::Config;
use clap::Subcommand;

use super::CliResult;

const SECRET_KEYS: &[&str] = &["sync.api_key"];

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one value; unset optional values print as "(unset)"
    Get {
        /// Dot-path key, e.g. "session.pattern_id" or "sync.endpoint"
        key: String,
    },
    /// Change one value and save
    Set {
        /// Dot-path key
        key: String,
        /// New value; "" clears sync.endpoint or sync.api_key
        value: String,
    },
    /// Print the whole configuration as JSON with secrets masked
    Show,
    /// Overwrite config.toml with defaults
    Reset,
}

pub fn run(action: ConfigAction) -> CliResult {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            match config.get(&key) {
                Some(value) if value == "null" => println!("(unset)"),
                Some(value) => println!("{value}"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            if value.is_empty() {
                println!("{key} cleared");
            } else if SECRET_KEYS.contains(&key.as_str()) {
                println!("{key} updated");
            } else {
                println!("{key} = {value}");
            }
        }
        ConfigAction::Show => {
            let config = Config::load()?;
            let mut json = serde_json::to_value(&config)?;
            for key in SECRET_KEYS {
                mask(&mut json, key);
            }
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}

/// Replace a set string at `key` with a placeholder.
fn mask(root: &mut serde_json::Value, key: &str) {
    let target = key.split('.').try_fold(root, |node, part| node.get_mut(part));
    if let Some(value) = target.filter(|v| v.is_string()) {
        *value = serde_json::Value::String("********".into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_hides_set_secrets_only() {
        let mut json = serde_json::json!({ "sync": { "api_key": "secret", "endpoint": null } });
        mask(&mut json, "sync.api_key");
        mask(&mut json, "sync.endpoint");
        mask(&mut json, "sync.missing");
        assert_eq!(json["sync"]["api_key"], "********");
        assert!(json["sync"]["endpoint"].is_null());
    }
}
