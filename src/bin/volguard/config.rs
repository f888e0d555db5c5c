//! Runtime configuration assembly so CLI flags, the user config file, and
//! built-in defaults resolve consistently (flags always win).

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use serde::Deserialize;
use volguard::{EngineTuning, DEFAULT_THRESHOLD, RESET_THRESHOLD};

pub(crate) const DEFAULT_TICK_MS: u64 = 200;
pub(crate) const DEFAULT_GRACE_MS: u64 = 600;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "volguard",
    version,
    about = "Keeps application audio at a learned safe level, muting persistent offenders"
)]
pub(crate) struct Cli {
    /// Safe-volume state file (defaults to the user data directory).
    #[arg(long, env = "VOLGUARD_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Event log file (defaults next to the state file).
    #[arg(long, env = "VOLGUARD_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Log to stderr instead of a file.
    #[arg(long)]
    pub no_log_file: bool,

    /// Enforcement interval in milliseconds.
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Cap applied to newly seen applications (0.0-1.0).
    #[arg(long, allow_hyphen_values = true)]
    pub default_threshold: Option<f32>,

    /// Tick-over-tick jump treated as an application reset (0.0-1.0).
    #[arg(long, allow_hyphen_values = true)]
    pub reset_threshold: Option<f32>,

    /// Back-off before escalating a persistent offender, in milliseconds.
    #[arg(long)]
    pub grace_ms: Option<u64>,

    /// Run a single enforcement pass and exit.
    #[arg(long)]
    pub once: bool,

    /// Log debug-level detail.
    #[arg(long, short)]
    pub verbose: bool,
}

/// Optional `volguard.toml` keys; anything absent falls back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub state_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub tick_ms: Option<u64>,
    pub default_threshold: Option<f32>,
    pub reset_threshold: Option<f32>,
    pub grace_ms: Option<u64>,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub state_file: PathBuf,
    pub log_file: Option<PathBuf>,
    pub tick: Duration,
    pub tuning: EngineTuning,
    pub once: bool,
    pub verbose: bool,
}

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("volguard").join("volguard.toml"))
}

/// Read the user config file; a missing file is the common case and an
/// invalid one is reported and ignored rather than blocking startup.
pub(crate) fn load_file_config() -> FileConfig {
    let Some(path) = user_config_path() else {
        return FileConfig::default();
    };
    match fs::read_to_string(&path) {
        Ok(raw) => parse_file_config(&raw, &path.display().to_string()),
        Err(_) => FileConfig::default(),
    }
}

fn parse_file_config(raw: &str, origin: &str) -> FileConfig {
    match toml::from_str(raw) {
        Ok(config) => config,
        Err(err) => {
            // Logging is not up yet while config resolves.
            eprintln!("volguard: ignoring invalid config {origin}: {err}");
            FileConfig::default()
        }
    }
}

pub(crate) fn resolve(cli: Cli, file: FileConfig) -> Result<Settings> {
    let data_dir = dirs::data_local_dir()
        .map(|dir| dir.join("volguard"))
        .unwrap_or_else(|| PathBuf::from("."));

    let state_file = cli
        .state_file
        .or(file.state_file)
        .unwrap_or_else(|| data_dir.join("safe_volumes.json"));
    let log_file = if cli.no_log_file {
        None
    } else {
        Some(
            cli.log_file
                .or(file.log_file)
                .unwrap_or_else(|| data_dir.join("volguard.log")),
        )
    };

    let tick_ms = cli.tick_ms.or(file.tick_ms).unwrap_or(DEFAULT_TICK_MS);
    let default_threshold = cli
        .default_threshold
        .or(file.default_threshold)
        .unwrap_or(DEFAULT_THRESHOLD);
    let reset_threshold = cli
        .reset_threshold
        .or(file.reset_threshold)
        .unwrap_or(RESET_THRESHOLD);
    let grace_ms = cli.grace_ms.or(file.grace_ms).unwrap_or(DEFAULT_GRACE_MS);

    if !(default_threshold > 0.0 && default_threshold <= 1.0) {
        bail!("default threshold must be within (0.0, 1.0], got {default_threshold}");
    }
    if !(reset_threshold > 0.0 && reset_threshold <= 1.0) {
        bail!("reset threshold must be within (0.0, 1.0], got {reset_threshold}");
    }
    if tick_ms < 50 {
        bail!("tick interval must be at least 50ms, got {tick_ms}");
    }

    Ok(Settings {
        state_file,
        log_file,
        tick: Duration::from_millis(tick_ms),
        tuning: EngineTuning {
            default_threshold,
            reset_threshold,
            grace_window: Duration::from_millis(grace_ms),
        },
        once: cli.once,
        verbose: cli.verbose,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["volguard"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn defaults_apply_when_nothing_is_given() {
        let settings = resolve(cli(&[]), FileConfig::default()).expect("resolve");
        assert_eq!(settings.tick, Duration::from_millis(DEFAULT_TICK_MS));
        assert_eq!(settings.tuning.default_threshold, DEFAULT_THRESHOLD);
        assert_eq!(settings.tuning.reset_threshold, RESET_THRESHOLD);
        assert_eq!(
            settings.tuning.grace_window,
            Duration::from_millis(DEFAULT_GRACE_MS)
        );
        assert!(!settings.once);
        assert!(settings.log_file.is_some());
        assert!(settings.state_file.ends_with("safe_volumes.json"));
    }

    #[test]
    fn file_config_overrides_defaults() {
        let file = parse_file_config(
            "tick_ms = 500\ndefault_threshold = 0.05\nstate_file = \"/tmp/vols.json\"\n",
            "test",
        );
        let settings = resolve(cli(&[]), file).expect("resolve");
        assert_eq!(settings.tick, Duration::from_millis(500));
        assert_eq!(settings.tuning.default_threshold, 0.05);
        assert_eq!(settings.state_file, PathBuf::from("/tmp/vols.json"));
    }

    #[test]
    fn cli_flags_beat_the_file_config() {
        let file = parse_file_config("tick_ms = 500\nreset_threshold = 0.2\n", "test");
        let settings =
            resolve(cli(&["--tick-ms", "250", "--reset-threshold", "0.3"]), file).expect("resolve");
        assert_eq!(settings.tick, Duration::from_millis(250));
        assert_eq!(settings.tuning.reset_threshold, 0.3);
    }

    #[test]
    fn invalid_file_config_is_ignored() {
        let file = parse_file_config("tick_ms = \"fast\"", "test");
        assert!(file.tick_ms.is_none());
    }

    #[test]
    fn unknown_file_keys_are_rejected_as_invalid() {
        let file = parse_file_config("tick_ms = 500\nmystery = true\n", "test");
        assert!(file.tick_ms.is_none());
    }

    #[test]
    fn no_log_file_flag_disables_the_log() {
        let settings = resolve(cli(&["--no-log-file"]), FileConfig::default()).expect("resolve");
        assert!(settings.log_file.is_none());
    }

    #[test]
    fn out_of_range_thresholds_are_rejected() {
        assert!(resolve(cli(&["--default-threshold", "1.5"]), FileConfig::default()).is_err());
        assert!(resolve(cli(&["--default-threshold", "0"]), FileConfig::default()).is_err());
        assert!(resolve(cli(&["--reset-threshold", "-0.1"]), FileConfig::default()).is_err());
    }

    #[test]
    fn degenerate_tick_interval_is_rejected() {
        assert!(resolve(cli(&["--tick-ms", "10"]), FileConfig::default()).is_err());
    }
}
