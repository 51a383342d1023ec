use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::diagnostics::DiagnosticFeed;
use crate::error::TrackerError;
use crate::estimators::{self, DpsRow, TargetSnapshot};
use crate::log::{IngestStats, LogPipeline, log_watcher_thread, process_full_log_file};
use crate::models::AppSettings;
use crate::store::EventStore;

/// Everything the presentation layer talks to: the store, the diagnostic
/// feed and the shared settings the ingestion loop reads each cycle.
///
/// There is one pipeline per session. The ingestion thread and file imports
/// both write through it, so the store only ever has one writer.
#[derive(Debug, Clone)]
pub struct CombatSession {
    store: Arc<EventStore>,
    feed: Arc<DiagnosticFeed>,
    settings: Arc<RwLock<AppSettings>>,
    pipeline: Arc<Mutex<LogPipeline>>,
}

impl CombatSession {
    pub fn new(settings: AppSettings) -> Self {
        let store = Arc::new(EventStore::new());
        let feed = Arc::new(DiagnosticFeed::default());
        let pipeline = LogPipeline::new(Arc::clone(&store), Arc::clone(&feed), &settings);
        Self {
            store,
            feed,
            settings: Arc::new(RwLock::new(settings)),
            pipeline: Arc::new(Mutex::new(pipeline)),
        }
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn feed(&self) -> &Arc<DiagnosticFeed> {
        &self.feed
    }

    pub fn settings(&self) -> &Arc<RwLock<AppSettings>> {
        &self.settings
    }

    /// Clears every event and derived value and puts the target filter back
    /// to "all". Views compare `reset_generation` to notice.
    pub fn reset(&self) {
        self.store.reset();
        self.settings.write().target_filter = None;
        self.feed.info("session reset");
    }

    pub fn reset_generation(&self) -> u64 {
        self.store.generation()
    }

    pub fn set_target_filter(&self, target: Option<String>) {
        self.settings.write().target_filter = target;
    }

    pub fn dps_table(&self) -> Vec<DpsRow> {
        let (mode, filter) = {
            let settings = self.settings.read();
            (settings.dps_mode, settings.target_filter.clone())
        };
        estimators::dps_table(&self.store, mode, filter.as_deref())
    }

    pub fn target_snapshots(&self) -> Vec<TargetSnapshot> {
        let filter = self.settings.read().target_filter.clone();
        estimators::all_target_snapshots(&self.store, filter.as_deref())
    }

    /// Imports a past log in one go, on the calling thread. Live ingestion
    /// waits while the import holds the pipeline. The import is its own game
    /// session, so it opens a new epoch once anything has been read before.
    pub fn ingest_file(&self, path: &Path) -> Result<IngestStats, TrackerError> {
        let settings = self.settings.read().clone();
        let mut pipeline = self.pipeline.lock();
        pipeline.configure(&settings);
        if pipeline.has_started() {
            pipeline.begin_epoch();
        }
        let stats = process_full_log_file(path, &mut pipeline)?;
        self.feed.info(format!(
            "imported {}: {} events from {} lines",
            path.display(),
            stats.events,
            stats.lines
        ));
        Ok(stats)
    }

    /// Starts the background ingestion loop.
    pub fn spawn_ingestion(&self) -> IngestionHandle {
        let (shutdown, receiver) = mpsc::channel();
        let pipeline = Arc::clone(&self.pipeline);
        let feed = Arc::clone(&self.feed);
        let settings = Arc::clone(&self.settings);
        let join = thread::spawn(move || {
            log_watcher_thread(pipeline, feed, settings, receiver);
        });
        IngestionHandle {
            shutdown,
            join: Some(join),
        }
    }
}

/// Owner of the ingestion thread. Dropping it stops the loop as well.
#[derive(Debug)]
pub struct IngestionHandle {
    shutdown: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl IngestionHandle {
    /// Asks the loop to stop after its current cycle and waits for it.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!("ingestion thread panicked");
            } else {
                info!("ingestion stopped");
            }
        }
    }
}

impl Drop for IngestionHandle {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}
