pub mod events;
pub mod settings;
pub mod stats;
pub mod target;

pub use events::{
    AttackEvent, AttackOutcome, CombatEvent, DamageEvent, ImmunityAbsorptionEvent, SaveEvent,
    SaveKind,
};
pub use settings::{AppSettings, DpsMode};
pub use stats::DpsAccumulator;
pub use target::{AcEstimate, AcTracker, AttackBonusTable, ImmunityRecord, SaveRecord, TargetProfile};
