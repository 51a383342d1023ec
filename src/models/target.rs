use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::models::events::{AttackEvent, AttackOutcome, SaveKind};

/// Reported armor class for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AcEstimate {
    Unknown,
    Exact { ac: i32 },
    /// Inclusive bounds.
    Range { low: i32, high: i32 },
    /// Only hits seen so far.
    AtMost { high: i32 },
    /// Only misses seen so far.
    AtLeast { low: i32 },
}

impl fmt::Display for AcEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcEstimate::Unknown => write!(f, "-"),
            AcEstimate::Exact { ac } => write!(f, "{}", ac),
            AcEstimate::Range { low, high } => write!(f, "{}-{}", low, high),
            AcEstimate::AtMost { high } => write!(f, "<={}", high),
            AcEstimate::AtLeast { low } => write!(f, ">{}", low.saturating_sub(1)),
        }
    }
}

/// Running AC bounds for one target.
///
/// Qualifying hit totals are kept as a set so that a later, higher miss can
/// discard the hits it contradicts (those landed while the target's AC was
/// temporarily lowered, e.g. flat-footed). Hits at or below the current best
/// miss are rejected on arrival for the same reason.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcTracker {
    hits: BTreeSet<i32>,
    max_miss: Option<i32>,
}

impl AcTracker {
    pub fn observe(&mut self, attack: &AttackEvent) {
        match attack.outcome {
            AttackOutcome::Hit | AttackOutcome::CriticalHit => {
                if !attack.is_natural_20() {
                    self.record_hit(attack.total);
                }
            }
            AttackOutcome::Miss => self.record_miss(attack.total),
            // Neither says anything about the target's AC.
            AttackOutcome::MissNatural1 | AttackOutcome::MissConcealment => {}
        }
    }

    pub fn record_hit(&mut self, total: i32) {
        if self.max_miss.is_none_or(|miss| total > miss) {
            self.hits.insert(total);
        }
    }

    pub fn record_miss(&mut self, total: i32) {
        if self.max_miss.is_none_or(|miss| total > miss) {
            self.max_miss = Some(total);
            self.hits = match total.checked_add(1) {
                Some(above) => self.hits.split_off(&above),
                None => BTreeSet::new(),
            };
        }
    }

    pub fn min_hit(&self) -> Option<i32> {
        self.hits.first().copied()
    }

    pub fn max_miss(&self) -> Option<i32> {
        self.max_miss
    }

    pub fn estimate(&self) -> AcEstimate {
        match (self.min_hit(), self.max_miss) {
            (Some(hit), Some(miss)) if miss.saturating_add(1) == hit => AcEstimate::Exact { ac: hit },
            (Some(hit), Some(miss)) => AcEstimate::Range {
                low: miss.saturating_add(1),
                high: hit,
            },
            (Some(hit), None) => AcEstimate::AtMost { high: hit },
            (None, Some(miss)) => AcEstimate::AtLeast { low: miss.saturating_add(1) },
            (None, None) => AcEstimate::Unknown,
        }
    }
}

/// Frequency table of attack bonuses a combatant rolled with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttackBonusTable {
    counts: BTreeMap<i32, u32>,
}

impl AttackBonusTable {
    pub fn record(&mut self, bonus: i32) {
        let count = self.counts.entry(bonus).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Most frequent bonus; ties go to the higher bonus.
    pub fn mode(&self) -> Option<i32> {
        self.counts
            .iter()
            .max_by_key(|(bonus, count)| (**count, **bonus))
            .map(|(bonus, _)| *bonus)
    }

    pub fn samples(&self) -> u32 {
        self.counts.values().sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveRecord {
    pub fortitude: Option<i32>,
    pub reflex: Option<i32>,
    pub will: Option<i32>,
}

impl SaveRecord {
    pub fn update(&mut self, kind: SaveKind, value: i32) {
        let slot = match kind {
            SaveKind::Fortitude => &mut self.fortitude,
            SaveKind::Reflex => &mut self.reflex,
            SaveKind::Will => &mut self.will,
        };
        if slot.is_none_or(|current| value > current) {
            *slot = Some(value);
        }
    }

    pub fn get(&self, kind: SaveKind) -> Option<i32> {
        match kind {
            SaveKind::Fortitude => self.fortitude,
            SaveKind::Reflex => self.reflex,
            SaveKind::Will => self.will,
        }
    }
}

/// Damage and absorption from the same correlated hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImmunityRecord {
    pub max_damage: u32,
    pub max_absorbed: u32,
    pub samples: u32,
}

impl ImmunityRecord {
    /// The pair only moves as a unit, and only when the new hit did more damage.
    pub fn record(&mut self, damage: u32, absorbed: u32) -> bool {
        self.samples = self.samples.saturating_add(1);
        if self.samples == 1 || damage > self.max_damage {
            self.max_damage = damage;
            self.max_absorbed = absorbed;
            return true;
        }
        false
    }
}

#[derive(Debug, Clone, Default)]
pub struct TargetProfile {
    pub ac: AcTracker,
    pub attack_bonus: AttackBonusTable,
    pub saves: SaveRecord,
    pub immunities: BTreeMap<String, ImmunityRecord>,
    /// Largest single-hit amount seen per damage type, correlated or not.
    pub max_hit_by_type: BTreeMap<String, u32>,
}

impl TargetProfile {
    pub fn record_damage_taken(&mut self, breakdown: &[(String, u32)]) {
        for (dtype, amount) in breakdown {
            let max = self.max_hit_by_type.entry(dtype.clone()).or_insert(0);
            if *amount > *max {
                *max = *amount;
            }
        }
    }

    pub fn record_immunity(&mut self, damage_type: &str, damage: u32, absorbed: u32) -> bool {
        self.immunities
            .entry(damage_type.to_string())
            .or_default()
            .record(damage, absorbed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_ac_from_tight_bounds() {
        let mut ac = AcTracker::default();
        ac.record_hit(30);
        ac.record_hit(28);
        ac.record_miss(25);
        ac.record_miss(27);
        assert_eq!(ac.estimate(), AcEstimate::Exact { ac: 28 });
        assert_eq!(ac.estimate().to_string(), "28");
    }

    #[test]
    fn higher_miss_discards_contradicted_hits() {
        let mut ac = AcTracker::default();
        ac.record_hit(30);
        ac.record_hit(34);
        ac.record_miss(27);
        ac.record_miss(31);
        // 30 landed while the target was flat-footed.
        assert_eq!(ac.min_hit(), Some(34));
        assert_eq!(ac.estimate(), AcEstimate::Range { low: 32, high: 34 });

        let mut ac = AcTracker::default();
        for hit in [30, 28] {
            ac.record_hit(hit);
        }
        for miss in [25, 27, 31] {
            ac.record_miss(miss);
        }
        assert_eq!(ac.min_hit(), None);
        assert_eq!(ac.estimate(), AcEstimate::AtLeast { low: 32 });
    }

    #[test]
    fn hits_below_known_miss_are_ignored() {
        let mut ac = AcTracker::default();
        ac.record_miss(40);
        ac.record_hit(35);
        assert_eq!(ac.estimate(), AcEstimate::AtLeast { low: 41 });
        ac.record_hit(44);
        assert_eq!(ac.estimate(), AcEstimate::Range { low: 41, high: 44 });
    }

    #[test]
    fn extreme_totals_stay_in_range() {
        let mut ac = AcTracker::default();
        ac.record_hit(i32::MAX);
        ac.record_miss(i32::MAX);
        assert_eq!(ac.min_hit(), None);
        assert_eq!(ac.estimate(), AcEstimate::AtLeast { low: i32::MAX });

        let mut ac = AcTracker::default();
        ac.record_miss(i32::MAX - 1);
        ac.record_hit(i32::MAX);
        assert_eq!(ac.estimate(), AcEstimate::Exact { ac: i32::MAX });

        let mut ac = AcTracker::default();
        ac.record_miss(i32::MIN);
        assert_eq!(ac.estimate().to_string(), format!(">{}", i32::MIN));
    }

    #[test]
    fn attack_bonus_mode_prefers_higher_on_tie() {
        let mut table = AttackBonusTable::default();
        for bonus in [71, 71, 71, 77] {
            table.record(bonus);
        }
        assert_eq!(table.mode(), Some(71));

        let mut table = AttackBonusTable::default();
        for bonus in [50, 50, 55, 55] {
            table.record(bonus);
        }
        assert_eq!(table.mode(), Some(55));
        assert_eq!(AttackBonusTable::default().mode(), None);
    }

    #[test]
    fn saves_keep_highest_per_kind() {
        let mut saves = SaveRecord::default();
        saves.update(SaveKind::Will, 12);
        saves.update(SaveKind::Will, 9);
        saves.update(SaveKind::Reflex, -2);
        assert_eq!(saves.get(SaveKind::Will), Some(12));
        assert_eq!(saves.get(SaveKind::Reflex), Some(-2));
        assert_eq!(saves.get(SaveKind::Fortitude), None);
    }

    #[test]
    fn immunity_pair_moves_together() {
        let mut record = ImmunityRecord::default();
        assert!(record.record(100, 50));
        // A temporary full immunity on a smaller hit must not replace the pair.
        assert!(!record.record(40, 40));
        assert_eq!((record.max_damage, record.max_absorbed), (100, 50));
        assert!(record.record(120, 10));
        assert_eq!((record.max_damage, record.max_absorbed), (120, 10));
        assert_eq!(record.samples, 3);
    }
}
