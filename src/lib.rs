pub mod diagnostics;
pub mod error;
pub mod estimators;
pub mod log;
pub mod models;
pub mod parsing;
pub mod session;
pub mod store;
pub mod utils;


pub use diagnostics::{DiagnosticEntry, DiagnosticFeed, DiagnosticLevel};
pub use error::{ParseError, SettingsError, TrackerError};
pub use estimators::{
    DpsRow, TargetSnapshot, dps_table, engine_immunity_percentage, immunity_percentage, target_snapshot,
};
pub use log::{LogPipeline, LogTracker, log_watcher_thread, process_full_log_file};
pub use models::{
    AcEstimate, AppSettings, AttackEvent, AttackOutcome, CombatEvent, DamageEvent, DpsMode,
    ImmunityAbsorptionEvent, SaveEvent, SaveKind, TargetProfile,
};
pub use parsing::{EventRouter, LineParser};
pub use session::{CombatSession, IngestionHandle};
pub use store::{EventStore, StoredEvent};
