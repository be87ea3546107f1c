//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use health::SyncSettings;

/// healthsync - Incrementally sync wellness data into a local database
#[derive(Parser, Debug)]
#[command(name = "healthsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run once and exit, or keep syncing on an interval
    #[arg(short, long, value_enum, default_value_t = Mode::Single)]
    pub mode: Mode,

    /// Seconds between the end of one cycle and the start of the next
    #[arg(short, long, env = "HEALTHSYNC_INTERVAL")]
    pub interval: Option<u64>,

    /// Days of history to fetch for domains that were never synced
    #[arg(long)]
    pub lookback_days: Option<u32>,

    /// Minimum milliseconds between upstream calls
    #[arg(long)]
    pub rate_limit_ms: Option<u64>,

    /// SQLite database path
    #[arg(long, env = "HEALTHSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Settings file to use instead of the config directory's healthsync.json
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Print each cycle's result as JSON
    #[arg(long)]
    pub json: bool,

    /// Show sync cursors and recent collection log entries, then exit
    #[arg(long)]
    pub status: bool,

    /// Forget cached upstream tokens, then exit
    #[arg(long)]
    pub logout: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Single,
    Continuous,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings
    pub fn apply(&self, settings: &mut SyncSettings) {
        if let Some(interval) = self.interval {
            settings.interval_secs = interval;
        }
        if let Some(days) = self.lookback_days {
            settings.lookback_days = days;
        }
        if let Some(ms) = self.rate_limit_ms {
            settings.rate_limit_ms = ms;
        }
        if let Some(db) = &self.db {
            settings.db_path = Some(db.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_single_mode() {
        let cli = Cli::parse_from(["healthsync"]);
        assert_eq!(cli.mode, Mode::Single);
        assert!(!cli.json);
    }

    #[test]
    fn test_overrides_apply_to_settings() {
        let cli = Cli::parse_from([
            "healthsync",
            "--mode",
            "continuous",
            "--interval",
            "120",
            "--lookback-days",
            "14",
            "--db",
            "/tmp/h.sqlite",
        ]);
        let mut settings = SyncSettings::default();
        cli.apply(&mut settings);

        assert_eq!(cli.mode, Mode::Continuous);
        assert_eq!(settings.interval_secs, 120);
        assert_eq!(settings.lookback_days, 14);
        assert_eq!(settings.rate_limit_ms, 1000);
        assert_eq!(settings.db_path, Some(PathBuf::from("/tmp/h.sqlite")));
    }
}
