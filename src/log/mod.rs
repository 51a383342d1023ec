pub mod finder;
pub mod watcher;

pub use finder::{find_latest_log_file_in_dir, list_log_files, resolve_log_directory, select_active};
pub use watcher::{
    IngestStats, LogChunk, LogPipeline, LogTracker, TrackerState, log_watcher_thread,
    process_full_log_file,
};
