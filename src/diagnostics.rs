use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

pub const DEFAULT_FEED_CAPACITY: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum DiagnosticLevel {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticEntry {
    pub seq: u64,
    pub logged_at: DateTime<Local>,
    pub level: DiagnosticLevel,
    pub message: String,
}

#[derive(Debug)]
struct FeedInner {
    entries: VecDeque<DiagnosticEntry>,
    next_seq: u64,
}

/// Bounded feed of notable ingestion events for the presentation layer.
///
/// Every entry is also forwarded to `tracing`. Debug entries are dropped
/// unless debug output was switched on, so a large backfill does not build
/// one message per line.
#[derive(Debug)]
pub struct DiagnosticFeed {
    inner: Mutex<FeedInner>,
    capacity: usize,
    debug_enabled: AtomicBool,
}

impl Default for DiagnosticFeed {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }
}

impl DiagnosticFeed {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(FeedInner {
                entries: VecDeque::with_capacity(capacity.min(DEFAULT_FEED_CAPACITY)),
                next_seq: 0,
            }),
            capacity: capacity.max(1),
            debug_enabled: AtomicBool::new(false),
        }
    }

    pub fn set_debug_enabled(&self, enabled: bool) {
        self.debug_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug_enabled.load(Ordering::Relaxed)
    }

    /// Only builds the message when debug output is on.
    pub fn debug_with(&self, message: impl FnOnce() -> String) {
        if self.debug_enabled() {
            let message = message();
            debug!("{}", message);
            self.push(DiagnosticLevel::Debug, message);
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.push(DiagnosticLevel::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.push(DiagnosticLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.push(DiagnosticLevel::Error, message);
    }

    fn push(&self, level: DiagnosticLevel, message: String) {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        if inner.entries.len() == self.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(DiagnosticEntry {
            seq,
            logged_at: Local::now(),
            level,
            message,
        });
    }

    /// Entries with a sequence number at or after `seq`, oldest first.
    pub fn since(&self, seq: u64) -> Vec<DiagnosticEntry> {
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .filter(|entry| entry.seq >= seq)
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> Vec<DiagnosticEntry> {
        self.since(0)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }
}
