use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackOutcome {
    Hit,
    CriticalHit,
    Miss,
    MissConcealment,
    MissNatural1,
}

impl AttackOutcome {
    pub fn is_hit(self) -> bool {
        matches!(self, AttackOutcome::Hit | AttackOutcome::CriticalHit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveKind {
    Fortitude,
    Reflex,
    Will,
}

impl SaveKind {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "fort" | "fortitude" => Some(SaveKind::Fortitude),
            "reflex" => Some(SaveKind::Reflex),
            "will" => Some(SaveKind::Will),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DamageEvent {
    pub timestamp: NaiveDateTime,
    pub source: String,
    pub target: String,
    pub total: u32,
    /// Breakdown in the order the clauses appear on the line.
    pub breakdown: Vec<(String, u32)>,
}

impl DamageEvent {
    pub fn amount_of(&self, damage_type: &str) -> Option<u32> {
        self.breakdown
            .iter()
            .find(|(dtype, _)| dtype == damage_type)
            .map(|(_, amount)| *amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImmunityAbsorptionEvent {
    pub timestamp: NaiveDateTime,
    pub target: String,
    pub damage_type: String,
    pub absorbed: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttackEvent {
    pub timestamp: NaiveDateTime,
    pub source: String,
    pub target: String,
    pub attack_bonus: i32,
    pub roll: u32,
    pub outcome: AttackOutcome,
    pub total: i32,
}

impl AttackEvent {
    pub fn is_natural_20(&self) -> bool {
        self.roll == 20
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveEvent {
    pub timestamp: NaiveDateTime,
    pub actor: String,
    pub kind: SaveKind,
    /// Save bonus the actor rolled with.
    pub value: i32,
    pub roll: u32,
    pub dc: Option<u32>,
    pub succeeded: bool,
}

/// One typed event extracted from a single log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CombatEvent {
    Damage(DamageEvent),
    Immunity(ImmunityAbsorptionEvent),
    Attack(AttackEvent),
    Save(SaveEvent),
}

impl CombatEvent {
    pub fn timestamp(&self) -> NaiveDateTime {
        match self {
            CombatEvent::Damage(e) => e.timestamp,
            CombatEvent::Immunity(e) => e.timestamp,
            CombatEvent::Attack(e) => e.timestamp,
            CombatEvent::Save(e) => e.timestamp,
        }
    }

    /// The acting entity, if the line names one.
    pub fn actor(&self) -> Option<&str> {
        match self {
            CombatEvent::Damage(e) => Some(&e.source),
            CombatEvent::Attack(e) => Some(&e.source),
            CombatEvent::Save(e) => Some(&e.actor),
            CombatEvent::Immunity(_) => None,
        }
    }

    /// The entity on the receiving end. Saves are indexed under the saving actor.
    pub fn target(&self) -> Option<&str> {
        match self {
            CombatEvent::Damage(e) => Some(&e.target),
            CombatEvent::Attack(e) => Some(&e.target),
            CombatEvent::Immunity(e) => Some(&e.target),
            CombatEvent::Save(e) => Some(&e.actor),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            CombatEvent::Damage(_) => "damage",
            CombatEvent::Immunity(_) => "immunity",
            CombatEvent::Attack(_) => "attack",
            CombatEvent::Save(_) => "save",
        }
    }
}
