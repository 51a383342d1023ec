//! Read-only queries over the store: DPS table, hit rates and per-target
//! snapshots for whatever presentation sits on top.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::models::stats::{calculate_dps, elapsed_seconds};
use crate::models::{AcEstimate, CombatEvent, DpsAccumulator, DpsMode, SaveRecord, TargetProfile};
use crate::store::{EventStore, StoreView};

/// Reverse of the engine's reduction: the share of the raw hit that was
/// absorbed, rounded to a whole percent.
pub fn immunity_percentage(max_damage: u32, max_absorbed: u32) -> Option<u8> {
    let raw = u64::from(max_damage) + u64::from(max_absorbed);
    if raw == 0 {
        return None;
    }
    let pct = (u64::from(max_absorbed) as f64 * 100.0 / raw as f64).round();
    Some(pct.clamp(0.0, 100.0) as u8)
}

/// The smallest whole percent for which the engine's own reduction,
/// `max(1, floor(raw * pct / 100))`, absorbs exactly `max_absorbed` of the raw
/// hit. `None` when no percent reproduces the pair, which usually means the
/// two numbers came from different hits.
pub fn engine_immunity_percentage(max_damage: u32, max_absorbed: u32) -> Option<u8> {
    let raw = u64::from(max_damage) + u64::from(max_absorbed);
    if raw == 0 {
        return None;
    }
    if max_absorbed == 0 {
        return Some(0);
    }
    (1..=100u8).find(|pct| (raw * u64::from(*pct) / 100).max(1) == u64::from(max_absorbed))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeDps {
    pub damage_type: String,
    pub total: u64,
    pub dps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DpsRow {
    pub actor: String,
    pub total_damage: u64,
    pub elapsed_secs: i64,
    pub dps: f64,
    /// `None` until the actor has rolled at least one attack.
    pub hit_rate: Option<f64>,
    pub by_type: Vec<TypeDps>,
}

/// One row per damage-dealing actor, highest DPS first.
///
/// Only the current epoch counts. With a `target_filter`, totals and first
/// timestamps only count damage against that target; the end of the window is
/// always the most recent damage anyone dealt.
pub fn dps_table(store: &EventStore, mode: DpsMode, target_filter: Option<&str>) -> Vec<DpsRow> {
    store.with_view(|view| {
        let Some(last) = view.dps_global.last_damage_time else {
            return Vec::new();
        };

        let (global, per_actor) = match target_filter {
            Some(target) => accumulate_against(view, target),
            None => (view.dps_global.clone(), view.dps_by_actor.clone()),
        };

        let mut rows: Vec<DpsRow> = per_actor
            .into_iter()
            .filter_map(|(actor, acc)| {
                let first = match mode {
                    DpsMode::PerActor => acc.first_damage_time,
                    DpsMode::Global => global.first_damage_time,
                }?;
                let elapsed = elapsed_seconds(first, last);
                let hit_rate = hit_rate_in(view, &actor, target_filter);
                Some(build_row(actor, &acc, elapsed, hit_rate))
            })
            .collect();

        rows.sort_by(|a, b| b.dps.total_cmp(&a.dps).then_with(|| a.actor.cmp(&b.actor)));
        rows
    })
}

/// Party-wide DPS over the global window.
pub fn global_dps(store: &EventStore, target_filter: Option<&str>) -> Option<f64> {
    store.with_view(|view| {
        let last = view.dps_global.last_damage_time?;
        let global = match target_filter {
            Some(target) => accumulate_against(view, target).0,
            None => view.dps_global.clone(),
        };
        let first = global.first_damage_time?;
        Some(calculate_dps(global.total_damage, elapsed_seconds(first, last)))
    })
}

/// Percentage of an actor's attacks that hit, optionally against one target.
pub fn hit_rate(store: &EventStore, actor: &str, target: Option<&str>) -> Option<f64> {
    store.with_view(|view| hit_rate_in(view, actor, target))
}

/// Hit rate for every actor that has attacked.
pub fn hit_rates(store: &EventStore, target: Option<&str>) -> BTreeMap<String, f64> {
    store.with_view(|view| {
        view.by_actor
            .keys()
            .filter_map(|actor| hit_rate_in(view, actor, target).map(|rate| (actor.clone(), rate)))
            .collect()
    })
}

fn hit_rate_in(view: &StoreView<'_>, actor: &str, target: Option<&str>) -> Option<f64> {
    let events = view.by_actor.get(actor)?;
    let (mut attempts, mut hits) = (0u32, 0u32);
    for stored in events {
        let CombatEvent::Attack(attack) = &stored.event else {
            continue;
        };
        if target.is_some_and(|t| t != attack.target) {
            continue;
        }
        attempts += 1;
        if attack.outcome.is_hit() {
            hits += 1;
        }
    }
    (attempts > 0).then(|| f64::from(hits) / f64::from(attempts) * 100.0)
}

fn accumulate_against(view: &StoreView<'_>, target: &str) -> (DpsAccumulator, BTreeMap<String, DpsAccumulator>) {
    let mut global = DpsAccumulator::default();
    let mut per_actor: BTreeMap<String, DpsAccumulator> = BTreeMap::new();
    for stored in view.by_target.get(target).into_iter().flatten() {
        if stored.epoch != view.epoch {
            continue;
        }
        if let CombatEvent::Damage(damage) = &stored.event {
            global.record(damage.timestamp, damage.total, &damage.breakdown);
            per_actor
                .entry(damage.source.clone())
                .or_default()
                .record(damage.timestamp, damage.total, &damage.breakdown);
        }
    }
    (global, per_actor)
}

fn build_row(actor: String, acc: &DpsAccumulator, elapsed: i64, hit_rate: Option<f64>) -> DpsRow {
    let by_type = acc
        .damage_by_type
        .iter()
        .map(|(damage_type, total)| TypeDps {
            damage_type: damage_type.clone(),
            total: *total,
            dps: calculate_dps(*total, elapsed),
        })
        .collect();
    DpsRow {
        actor,
        total_damage: acc.total_damage,
        elapsed_secs: elapsed,
        dps: calculate_dps(acc.total_damage, elapsed),
        hit_rate,
        by_type,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DamageTypeSnapshot {
    pub damage_type: String,
    /// Damage of the correlated hit behind `max_absorbed`.
    pub max_damage: Option<u32>,
    pub max_absorbed: Option<u32>,
    pub immunity_pct: Option<u8>,
    /// Same pair run through the engine's floor rule instead of rounding.
    pub engine_immunity_pct: Option<u8>,
    pub samples: u32,
    /// Largest single hit of this type, correlated or not.
    pub max_hit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSnapshot {
    pub target: String,
    pub ac: AcEstimate,
    pub ac_display: String,
    pub attack_bonus: Option<i32>,
    pub ab_display: String,
    pub saves: SaveRecord,
    pub damage_types: Vec<DamageTypeSnapshot>,
}

impl TargetSnapshot {
    fn from_profile(target: &str, profile: &TargetProfile) -> Self {
        let ac = profile.ac.estimate();
        let attack_bonus = profile.attack_bonus.mode();

        let types: BTreeSet<&String> = profile
            .immunities
            .keys()
            .chain(profile.max_hit_by_type.keys())
            .collect();
        let damage_types = types
            .into_iter()
            .map(|damage_type| {
                let record = profile.immunities.get(damage_type);
                DamageTypeSnapshot {
                    damage_type: damage_type.clone(),
                    max_damage: record.map(|r| r.max_damage),
                    max_absorbed: record.map(|r| r.max_absorbed),
                    immunity_pct: record.and_then(|r| immunity_percentage(r.max_damage, r.max_absorbed)),
                    engine_immunity_pct: record
                        .and_then(|r| engine_immunity_percentage(r.max_damage, r.max_absorbed)),
                    samples: record.map_or(0, |r| r.samples),
                    max_hit: profile.max_hit_by_type.get(damage_type).copied(),
                }
            })
            .collect();

        TargetSnapshot {
            target: target.to_string(),
            ac,
            ac_display: ac.to_string(),
            attack_bonus,
            ab_display: attack_bonus.map_or_else(|| "-".to_string(), |ab| ab.to_string()),
            saves: profile.saves,
            damage_types,
        }
    }
}

pub fn target_snapshot(store: &EventStore, target: &str) -> Option<TargetSnapshot> {
    store.with_view(|view| {
        view.profiles
            .get(target)
            .map(|profile| TargetSnapshot::from_profile(target, profile))
    })
}

/// Snapshots for every known entity, sorted by name, or just the filtered one.
pub fn all_target_snapshots(store: &EventStore, target_filter: Option<&str>) -> Vec<TargetSnapshot> {
    store.with_view(|view| {
        let empty = TargetProfile::default();
        let names: BTreeSet<&String> = view.targets.iter().chain(view.profiles.keys()).collect();
        names
            .into_iter()
            .filter(|name| target_filter.is_none_or(|t| t == name.as_str()))
            .map(|name| TargetSnapshot::from_profile(name, view.profiles.get(name).unwrap_or(&empty)))
            .collect()
    })
}
