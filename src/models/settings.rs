use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where DPS time windows start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DpsMode {
    /// Each actor's window starts at their own first damage.
    #[default]
    PerActor,
    /// Every actor shares the window starting at the earliest damage of anyone.
    Global,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Directory holding nwclientLogN.txt; None searches the default game locations
    pub log_directory: Option<PathBuf>,
    /// Only keep events whose source or target is listed (empty keeps everything)
    pub actor_allow_list: Vec<String>,
    /// Whether damage immunity lines are parsed and correlated
    pub parse_immunity: bool,
    pub dps_mode: DpsMode,
    /// Restrict estimator queries to a single target
    pub target_filter: Option<String>,
    /// Max log-time distance between a damage line and its immunity line (0-300)
    pub correlation_window_secs: u32,
    /// Log-time interval between sweeps of uncorrelated entries (1-600)
    pub sweep_interval_secs: u32,
    /// Ingestion cadence in milliseconds (50-5000)
    pub poll_interval_ms: u64,
    /// Retry interval while the log directory is missing (1-300)
    pub directory_retry_secs: u64,
    /// Read the active file from the beginning instead of its end
    pub backfill: bool,
    /// Record a diagnostic entry for every parsed line
    pub debug_feed: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_directory: None,
            actor_allow_list: Vec::new(),
            parse_immunity: true,
            dps_mode: DpsMode::PerActor,
            target_filter: None,
            correlation_window_secs: 1,
            sweep_interval_secs: 5,
            poll_interval_ms: 500,
            directory_retry_secs: 5,
            backfill: false,
            debug_feed: false,
        }
    }
}

impl AppSettings {
    pub fn set_correlation_window_secs(&mut self, secs: u32) {
        self.correlation_window_secs = secs.clamp(0, 300);
    }

    pub fn set_sweep_interval_secs(&mut self, secs: u32) {
        self.sweep_interval_secs = secs.clamp(1, 600);
    }

    pub fn set_poll_interval_ms(&mut self, ms: u64) {
        self.poll_interval_ms = ms.clamp(50, 5000);
    }

    pub fn set_directory_retry_secs(&mut self, secs: u64) {
        self.directory_retry_secs = secs.clamp(1, 300);
    }

    /// Brings every bounded field back into range, e.g. after loading from disk.
    pub fn clamp_all(&mut self) {
        self.set_correlation_window_secs(self.correlation_window_secs);
        self.set_sweep_interval_secs(self.sweep_interval_secs);
        self.set_poll_interval_ms(self.poll_interval_ms);
        self.set_directory_retry_secs(self.directory_retry_secs);
    }
}
