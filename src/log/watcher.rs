use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::diagnostics::DiagnosticFeed;
use crate::error::TrackerError;
use crate::log::finder::{list_log_files, resolve_log_directory, select_active};
use crate::models::AppSettings;
use crate::parsing::{EventRouter, LineParser};
use crate::store::EventStore;
use crate::utils::time::LogClock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerState {
    Discovering,
    Tracking { path: PathBuf, offset: u64 },
}

/// Complete lines appended since the previous poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChunk {
    pub path: PathBuf,
    pub text: String,
    /// Tracking moved to another file of the family; `text` starts at its beginning.
    pub rotated: bool,
    /// The file shrank under us; `text` starts at its beginning and anything
    /// derived from the earlier contents belongs to a previous session.
    pub truncated: bool,
}

/// Follows the numbered log family in one directory.
#[derive(Debug)]
pub struct LogTracker {
    directory: PathBuf,
    state: TrackerState,
    backfill: bool,
    retry_interval: Duration,
    /// Set while the directory is missing; doubles as the "already reported" flag.
    next_directory_check: Option<Instant>,
    pending_rotation: bool,
    pending_truncation: bool,
}

impl LogTracker {
    pub fn new(directory: impl Into<PathBuf>, backfill: bool) -> Self {
        Self {
            directory: directory.into(),
            state: TrackerState::Discovering,
            backfill,
            retry_interval: Duration::from_secs(5),
            next_directory_check: None,
            pending_rotation: false,
            pending_truncation: false,
        }
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    /// One step of the state machine. Errors are transient: the tracker keeps
    /// its position and the next poll tries again.
    pub fn poll(&mut self) -> Result<Option<LogChunk>, TrackerError> {
        if !self.directory_available()? {
            return Ok(None);
        }

        let entries =
            list_log_files(&self.directory).map_err(|e| TrackerError::io(&self.directory, e))?;
        let Some(active) = select_active(&entries) else {
            return Ok(None);
        };

        let switch_to = match &self.state {
            TrackerState::Discovering => {
                let offset = if self.backfill { 0 } else { active.len };
                info!(path = %active.path.display(), offset, "tracking log file");
                Some(offset)
            }
            TrackerState::Tracking { path, .. } if *path != active.path => {
                // Only move once the other file is strictly newer; equal mtimes
                // say nothing about which one the game is writing.
                let current = entries.iter().find(|entry| entry.path == *path);
                if current.is_none_or(|current| active.modified > current.modified) {
                    info!(
                        from = %path.display(),
                        to = %active.path.display(),
                        "log file rotated"
                    );
                    self.pending_rotation = true;
                    Some(0)
                } else {
                    None
                }
            }
            TrackerState::Tracking { .. } => None,
        };
        if let Some(offset) = switch_to {
            self.state = TrackerState::Tracking {
                path: active.path.clone(),
                offset,
            };
        }

        self.read_appended()
    }

    fn directory_available(&mut self) -> Result<bool, TrackerError> {
        if self
            .next_directory_check
            .is_some_and(|next| Instant::now() < next)
        {
            return Ok(false);
        }

        if self.directory.is_dir() {
            if self.next_directory_check.take().is_some() {
                info!(path = %self.directory.display(), "log directory available");
            }
            return Ok(true);
        }

        let first_miss = self.next_directory_check.is_none();
        self.next_directory_check = Some(Instant::now() + self.retry_interval);
        if first_miss {
            Err(TrackerError::DirectoryMissing(self.directory.clone()))
        } else {
            Ok(false)
        }
    }

    fn read_appended(&mut self) -> Result<Option<LogChunk>, TrackerError> {
        let TrackerState::Tracking { path, offset } = &mut self.state else {
            return Ok(None);
        };

        let len = fs::metadata(&*path)
            .map_err(|e| TrackerError::io(path.clone(), e))?
            .len();
        if len < *offset {
            warn!(path = %path.display(), offset = *offset, len, "log file truncated");
            *offset = 0;
            self.pending_truncation = true;
        }

        let mut text = String::new();
        if len > *offset {
            let mut file = File::open(&*path).map_err(|e| TrackerError::io(path.clone(), e))?;
            file.seek(SeekFrom::Start(*offset))
                .map_err(|e| TrackerError::io(path.clone(), e))?;
            let mut buffer = Vec::new();
            file.take(len - *offset)
                .read_to_end(&mut buffer)
                .map_err(|e| TrackerError::io(path.clone(), e))?;

            // A line still being written stays in the file until its newline lands.
            if let Some(end) = buffer.iter().rposition(|b| *b == b'\n') {
                buffer.truncate(end + 1);
                *offset += buffer.len() as u64;
                text = String::from_utf8_lossy(&buffer).into_owned();
            }
        }

        if text.is_empty() && !self.pending_rotation && !self.pending_truncation {
            return Ok(None);
        }
        debug!(path = %path.display(), offset = *offset, bytes = text.len(), "read log chunk");
        Ok(Some(LogChunk {
            path: path.clone(),
            text,
            rotated: std::mem::take(&mut self.pending_rotation),
            truncated: std::mem::take(&mut self.pending_truncation),
        }))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub lines: usize,
    pub events: usize,
    pub malformed: usize,
    pub correlations: usize,
}

impl IngestStats {
    fn absorb(&mut self, other: IngestStats) {
        self.lines += other.lines;
        self.events += other.events;
        self.malformed += other.malformed;
        self.correlations += other.correlations;
    }
}

/// Parser plus router: the single writer feeding one store.
#[derive(Debug)]
pub struct LogPipeline {
    parser: LineParser,
    router: EventRouter,
    feed: Arc<DiagnosticFeed>,
    applied: Option<AppSettings>,
}

impl LogPipeline {
    pub fn new(store: Arc<EventStore>, feed: Arc<DiagnosticFeed>, settings: &AppSettings) -> Self {
        let mut pipeline = Self {
            parser: LineParser::default(),
            router: EventRouter::from_settings(store, settings),
            feed,
            applied: None,
        };
        pipeline.configure(settings);
        pipeline
    }

    pub fn with_clock(mut self, clock: LogClock) -> Self {
        self.parser = self.parser.with_clock(clock);
        self
    }

    /// Applies changed settings; a no-op when nothing changed since last time.
    pub fn configure(&mut self, settings: &AppSettings) {
        if self.applied.as_ref() == Some(settings) {
            return;
        }
        self.parser.set_allow_list(settings.actor_allow_list.clone());
        self.parser.set_parse_immunity(settings.parse_immunity);
        self.router.configure(settings);
        self.feed.set_debug_enabled(settings.debug_feed);
        self.applied = Some(settings.clone());
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Whether any stamped line has gone through this pipeline yet.
    pub fn has_started(&self) -> bool {
        self.parser.clock().last().is_some()
    }

    pub fn ingest_line(&mut self, line: &str) -> IngestStats {
        let mut stats = IngestStats {
            lines: 1,
            ..IngestStats::default()
        };
        match self.parser.parse_line(line) {
            Ok(Some(event)) => {
                self.feed
                    .debug_with(|| format!("{}: {}", event.kind_name(), line.trim()));
                stats.events = 1;
                for correlation in self.router.route(event) {
                    self.feed.debug_with(|| {
                        format!(
                            "{} {}: {} damage, {} absorbed",
                            correlation.target,
                            correlation.damage_type,
                            correlation.damage,
                            correlation.absorbed
                        )
                    });
                    stats.correlations += 1;
                }
            }
            Ok(None) => {}
            Err(e) => {
                stats.malformed = 1;
                self.feed.warning(format!("dropped line ({}): {}", e, line.trim()));
            }
        }
        stats
    }

    pub fn ingest_text(&mut self, text: &str) -> IngestStats {
        let mut stats = IngestStats::default();
        for line in text.lines() {
            stats.absorb(self.ingest_line(line));
        }
        stats
    }

    /// The log was truncated: a new session starts on the same file.
    pub fn begin_epoch(&mut self) -> u32 {
        self.parser.restart_clock();
        self.router.begin_epoch()
    }

    pub fn handle_chunk(&mut self, chunk: &LogChunk) -> IngestStats {
        if chunk.truncated {
            let epoch = self.begin_epoch();
            self.feed.warning(format!(
                "{} was truncated, starting epoch {}",
                chunk.path.display(),
                epoch
            ));
        } else if chunk.rotated {
            // Same stream, same clock: a session crossing midnight while
            // switching files still rolls the date.
            self.feed
                .info(format!("now following {}", chunk.path.display()));
        }
        self.ingest_text(&chunk.text)
    }
}

/// Reads a whole file once through `pipeline`.
pub fn process_full_log_file(file_path: &Path, pipeline: &mut LogPipeline) -> Result<IngestStats, TrackerError> {
    let file_content = fs::read(file_path).map_err(|e| TrackerError::io(file_path, e))?;

    // Convert bytes to string, replacing invalid UTF-8 sequences
    let content_str = String::from_utf8_lossy(&file_content);
    let stats = pipeline.ingest_text(&content_str);
    info!(
        path = %file_path.display(),
        lines = stats.lines,
        events = stats.events,
        malformed = stats.malformed,
        "processed log file"
    );
    Ok(stats)
}

/// Ingestion loop: poll, parse, route, then wait for the next cycle or a
/// shutdown message. Settings are re-read each cycle. The pipeline is shared
/// so other imports go through the same writer.
pub fn log_watcher_thread(
    pipeline: Arc<Mutex<LogPipeline>>,
    feed: Arc<DiagnosticFeed>,
    settings: Arc<RwLock<AppSettings>>,
    shutdown: Receiver<()>,
) {
    let initial = settings.read().clone();
    let mut configured_directory = initial.log_directory.clone();
    let mut tracker = new_tracker(&initial);
    feed.info(format!("watching {}", tracker.directory().display()));

    loop {
        let current = settings.read().clone();
        if current.log_directory != configured_directory {
            configured_directory = current.log_directory.clone();
            tracker = new_tracker(&current);
            feed.info(format!("watching {}", tracker.directory().display()));
        }

        match tracker.poll() {
            Ok(Some(chunk)) => {
                let mut pipeline = pipeline.lock();
                pipeline.configure(&current);
                let stats = pipeline.handle_chunk(&chunk);
                if stats.events > 0 {
                    debug!(lines = stats.lines, events = stats.events, "ingested chunk");
                }
            }
            Ok(None) => {}
            Err(e @ TrackerError::DirectoryMissing(_)) => feed.warning(e.to_string()),
            Err(e) => feed.warning(format!("transient read failure: {}", e)),
        }

        match shutdown.recv_timeout(Duration::from_millis(current.poll_interval_ms)) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(events = pipeline.lock().router().store().len(), "log watcher stopped");
}

fn new_tracker(settings: &AppSettings) -> LogTracker {
    LogTracker::new(
        resolve_log_directory(settings.log_directory.as_deref()),
        settings.backfill,
    )
    .with_retry_interval(Duration::from_secs(settings.directory_retry_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn append(path: &Path, text: &str) {
        let mut file = OpenOptions::new().create(true).append(true).open(path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    fn age(path: &Path, secs: u64) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn discovery_starts_at_end() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("nwclientLog1.txt");
        append(&log, "old one\nold two\n");

        let mut tracker = LogTracker::new(dir.path(), false);
        assert_eq!(tracker.poll().unwrap(), None);
        assert_eq!(
            tracker.state(),
            &TrackerState::Tracking {
                path: log.clone(),
                offset: 16
            }
        );

        append(&log, "fresh\n");
        let chunk = tracker.poll().unwrap().unwrap();
        assert_eq!(chunk.text, "fresh\n");
        assert!(!chunk.rotated && !chunk.truncated);
        assert_eq!(tracker.poll().unwrap(), None);
    }

    #[test]
    fn backfill_reads_history() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("nwclientLog1.txt");
        append(&log, "old one\nold two\n");

        let mut tracker = LogTracker::new(dir.path(), true);
        assert_eq!(tracker.poll().unwrap().unwrap().text, "old one\nold two\n");
    }

    #[test]
    fn partial_line_waits_for_newline() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("nwclientLog1.txt");
        append(&log, "");
        let mut tracker = LogTracker::new(dir.path(), false);
        tracker.poll().unwrap();

        append(&log, "first\nsec");
        assert_eq!(tracker.poll().unwrap().unwrap().text, "first\n");
        assert_eq!(tracker.poll().unwrap(), None);
        append(&log, "ond\n");
        assert_eq!(tracker.poll().unwrap().unwrap().text, "second\n");
    }

    #[test]
    fn newer_file_takes_over_from_zero() {
        let dir = TempDir::new().unwrap();
        let log1 = dir.path().join("nwclientLog1.txt");
        append(&log1, "session one\n");
        age(&log1, 120);

        let mut tracker = LogTracker::new(dir.path(), false);
        tracker.poll().unwrap();
        append(&log1, "still one\n");
        age(&log1, 60);
        assert_eq!(tracker.poll().unwrap().unwrap().text, "still one\n");

        let log2 = dir.path().join("nwclientLog2.txt");
        append(&log2, "session two\n");
        let chunk = tracker.poll().unwrap().unwrap();
        assert!(chunk.rotated);
        assert_eq!(chunk.path, log2);
        assert_eq!(chunk.text, "session two\n");
        assert_eq!(
            tracker.state(),
            &TrackerState::Tracking {
                path: log2,
                offset: 12
            }
        );
    }

    #[test]
    fn shrinking_file_is_reread_from_zero() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("nwclientLog1.txt");
        append(&log, "a long first session line\n");

        let mut tracker = LogTracker::new(dir.path(), false);
        tracker.poll().unwrap();

        fs::write(&log, "restart\n").unwrap();
        let chunk = tracker.poll().unwrap().unwrap();
        assert!(chunk.truncated);
        assert!(!chunk.rotated);
        assert_eq!(chunk.text, "restart\n");

        let next = tracker.poll().unwrap();
        assert_eq!(next, None);
    }

    #[test]
    fn missing_directory_reported_once() {
        let dir = TempDir::new().unwrap();
        let logs = dir.path().join("logs");
        let mut tracker = LogTracker::new(&logs, false).with_retry_interval(Duration::ZERO);

        assert!(matches!(tracker.poll(), Err(TrackerError::DirectoryMissing(_))));
        assert!(matches!(tracker.poll(), Ok(None)));

        fs::create_dir(&logs).unwrap();
        assert!(matches!(tracker.poll(), Ok(None)));
        append(&logs.join("nwclientLog1.txt"), "hello\n");
        assert!(matches!(tracker.poll(), Ok(None)));
        assert!(matches!(tracker.state(), TrackerState::Tracking { .. }));
    }

    #[test]
    fn retry_interval_throttles_checks() {
        let dir = TempDir::new().unwrap();
        let logs = dir.path().join("logs");
        let mut tracker =
            LogTracker::new(&logs, false).with_retry_interval(Duration::from_secs(300));
        assert!(tracker.poll().is_err());

        fs::create_dir(&logs).unwrap();
        append(&logs.join("nwclientLog1.txt"), "hello\n");
        // Not looked at again until the interval passes.
        assert!(matches!(tracker.poll(), Ok(None)));
        assert_eq!(tracker.state(), &TrackerState::Discovering);
    }
}
