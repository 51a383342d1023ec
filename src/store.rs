//! Concurrent holder of every parsed event plus the counters derived from them.
//!
//! One writer (the router) and any number of readers share the store. Each
//! append takes the write lock once and updates the event list, both indices
//! and the derived counters before releasing it, so readers never see half
//! of an event.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDateTime;
use parking_lot::RwLock;

use crate::models::{CombatEvent, DpsAccumulator, TargetProfile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    /// Position in arrival order since the last reset.
    pub seq: u64,
    /// Bumped each time the log was truncated under us.
    pub epoch: u32,
    pub event: CombatEvent,
}

#[derive(Debug, Default)]
struct StoreInner {
    events: Vec<Arc<StoredEvent>>,
    by_target: HashMap<String, Vec<Arc<StoredEvent>>>,
    by_actor: HashMap<String, Vec<Arc<StoredEvent>>>,
    targets: BTreeSet<String>,
    actors: BTreeSet<String>,
    profiles: BTreeMap<String, TargetProfile>,
    dps_by_actor: BTreeMap<String, DpsAccumulator>,
    dps_global: DpsAccumulator,
    epoch: u32,
}

impl StoreInner {
    fn push(&mut self, event: CombatEvent) -> Arc<StoredEvent> {
        self.apply(&event);

        let stored = Arc::new(StoredEvent {
            seq: self.events.len() as u64,
            epoch: self.epoch,
            event,
        });
        if let Some(target) = stored.event.target() {
            self.targets.insert(target.to_string());
            self.by_target
                .entry(target.to_string())
                .or_default()
                .push(Arc::clone(&stored));
        }
        if let Some(actor) = stored.event.actor() {
            self.actors.insert(actor.to_string());
            self.by_actor
                .entry(actor.to_string())
                .or_default()
                .push(Arc::clone(&stored));
        }
        self.events.push(Arc::clone(&stored));
        stored
    }

    fn apply(&mut self, event: &CombatEvent) {
        match event {
            CombatEvent::Damage(damage) => {
                self.dps_global
                    .record(damage.timestamp, damage.total, &damage.breakdown);
                self.dps_by_actor
                    .entry(damage.source.clone())
                    .or_default()
                    .record(damage.timestamp, damage.total, &damage.breakdown);
                self.profiles
                    .entry(damage.target.clone())
                    .or_default()
                    .record_damage_taken(&damage.breakdown);
            }
            CombatEvent::Attack(attack) => {
                self.profiles
                    .entry(attack.target.clone())
                    .or_default()
                    .ac
                    .observe(attack);
                // The bonus belongs to whoever rolled it.
                self.profiles
                    .entry(attack.source.clone())
                    .or_default()
                    .attack_bonus
                    .record(attack.attack_bonus);
            }
            CombatEvent::Save(save) => {
                self.profiles
                    .entry(save.actor.clone())
                    .or_default()
                    .saves
                    .update(save.kind, save.value);
            }
            // Absorption only reaches a profile once it has been paired with
            // the hit it belongs to.
            CombatEvent::Immunity(_) => {}
        }
    }
}

#[derive(Debug, Default)]
pub struct EventStore {
    inner: RwLock<StoreInner>,
    generation: RwLock<u64>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, event: CombatEvent) -> Arc<StoredEvent> {
        self.inner.write().push(event)
    }

    /// Appends `event` together with the (damage type, damage, absorbed) pairs
    /// it completed against its target, under one write guard. The returned
    /// flags say, per pair, whether the target's recorded maximum changed.
    pub fn append_correlated(
        &self,
        event: CombatEvent,
        pairs: &[(String, u32, u32)],
    ) -> (Arc<StoredEvent>, Vec<bool>) {
        let mut inner = self.inner.write();
        let updated = match event.target() {
            Some(target) => {
                let profile = inner.profiles.entry(target.to_string()).or_default();
                pairs
                    .iter()
                    .map(|(damage_type, damage, absorbed)| profile.record_immunity(damage_type, *damage, *absorbed))
                    .collect()
            }
            None => vec![false; pairs.len()],
        };
        (inner.push(event), updated)
    }

    /// Commits one correlated (damage, absorbed) pair. Returns whether the
    /// target's recorded maximum pair changed.
    pub fn record_immunity(&self, target: &str, damage_type: &str, damage: u32, absorbed: u32) -> bool {
        let mut inner = self.inner.write();
        inner
            .profiles
            .entry(target.to_string())
            .or_default()
            .record_immunity(damage_type, damage, absorbed)
    }

    /// Starts a new ordering epoch after the log was truncated. Events and
    /// profiles stay; the DPS windows start over with the new session.
    pub fn begin_epoch(&self) -> u32 {
        let mut inner = self.inner.write();
        inner.epoch += 1;
        inner.dps_global = DpsAccumulator::default();
        inner.dps_by_actor.clear();
        inner.epoch
    }

    pub fn epoch(&self) -> u32 {
        self.inner.read().epoch
    }

    pub fn query_by_target(&self, id: &str) -> Vec<Arc<StoredEvent>> {
        self.inner.read().by_target.get(id).cloned().unwrap_or_default()
    }

    pub fn query_by_actor(&self, id: &str) -> Vec<Arc<StoredEvent>> {
        self.inner.read().by_actor.get(id).cloned().unwrap_or_default()
    }

    /// Every entity that has been on the receiving end of an event.
    pub fn known_targets(&self) -> BTreeSet<String> {
        self.inner.read().targets.clone()
    }

    pub fn known_actors(&self) -> BTreeSet<String> {
        self.inner.read().actors.clone()
    }

    pub fn events(&self) -> Vec<Arc<StoredEvent>> {
        self.inner.read().events.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn profile(&self, id: &str) -> Option<TargetProfile> {
        self.inner.read().profiles.get(id).cloned()
    }

    pub fn dps_accumulators(&self) -> (DpsAccumulator, BTreeMap<String, DpsAccumulator>) {
        let inner = self.inner.read();
        (inner.dps_global.clone(), inner.dps_by_actor.clone())
    }

    pub fn last_damage_time(&self) -> Option<NaiveDateTime> {
        self.inner.read().dps_global.last_damage_time
    }

    /// Runs `f` against a consistent view of everything derived so far.
    pub(crate) fn with_view<R>(&self, f: impl FnOnce(&StoreView<'_>) -> R) -> R {
        let inner = self.inner.read();
        let view = StoreView {
            profiles: &inner.profiles,
            dps_by_actor: &inner.dps_by_actor,
            dps_global: &inner.dps_global,
            by_target: &inner.by_target,
            by_actor: &inner.by_actor,
            targets: &inner.targets,
            epoch: inner.epoch,
        };
        f(&view)
    }

    /// Drops every event and derived counter in one step.
    pub fn reset(&self) {
        // Hold the write lock across the generation bump so a reader that sees
        // the new generation also sees the empty store.
        let mut inner = self.inner.write();
        *inner = StoreInner::default();
        *self.generation.write() += 1;
    }

    /// Increases on every `reset`. Consumers holding state of their own compare it.
    pub fn generation(&self) -> u64 {
        *self.generation.read()
    }
}

/// Borrowed, read-locked view used by the estimators.
pub(crate) struct StoreView<'a> {
    pub profiles: &'a BTreeMap<String, TargetProfile>,
    pub dps_by_actor: &'a BTreeMap<String, DpsAccumulator>,
    pub dps_global: &'a DpsAccumulator,
    pub by_target: &'a HashMap<String, Vec<Arc<StoredEvent>>>,
    pub by_actor: &'a HashMap<String, Vec<Arc<StoredEvent>>>,
    pub targets: &'a BTreeSet<String>,
    pub epoch: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttackEvent, AttackOutcome, DamageEvent, SaveEvent, SaveKind};
    use chrono::NaiveDate;
    use std::thread;

    fn at(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 9)
            .and_then(|d| d.and_hms_opt(14, 30, 0))
            .unwrap()
            + chrono::Duration::seconds(secs)
    }

    fn damage(source: &str, target: &str, secs: i64, amount: u32) -> CombatEvent {
        CombatEvent::Damage(DamageEvent {
            timestamp: at(secs),
            source: source.to_string(),
            target: target.to_string(),
            total: amount,
            breakdown: vec![("Physical".to_string(), amount)],
        })
    }

    #[test]
    fn indices_follow_appends() {
        let store = EventStore::new();
        store.append(damage("Woo", "Goblin", 0, 10));
        store.append(damage("Rogue", "Goblin", 1, 20));
        store.append(damage("Woo", "Orc", 2, 30));

        assert_eq!(store.query_by_target("Goblin").len(), 2);
        assert_eq!(store.query_by_actor("Woo").len(), 2);
        assert!(store.query_by_actor("Nobody").is_empty());
        assert_eq!(
            store.known_targets().into_iter().collect::<Vec<_>>(),
            vec!["Goblin", "Orc"]
        );
        assert_eq!(
            store.known_actors().into_iter().collect::<Vec<_>>(),
            vec!["Rogue", "Woo"]
        );

        let seqs: Vec<u64> = store.events().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn attacks_and_saves_feed_profiles() {
        let store = EventStore::new();
        store.append(CombatEvent::Attack(AttackEvent {
            timestamp: at(0),
            source: "Ogre".to_string(),
            target: "Woo".to_string(),
            attack_bonus: 30,
            roll: 10,
            outcome: AttackOutcome::Hit,
            total: 40,
        }));
        store.append(CombatEvent::Save(SaveEvent {
            timestamp: at(1),
            actor: "Ogre".to_string(),
            kind: SaveKind::Fortitude,
            value: 25,
            roll: 7,
            dc: Some(40),
            succeeded: false,
        }));

        let woo = store.profile("Woo").unwrap();
        assert_eq!(woo.ac.min_hit(), Some(40));
        let ogre = store.profile("Ogre").unwrap();
        assert_eq!(ogre.attack_bonus.mode(), Some(30));
        assert_eq!(ogre.saves.fortitude, Some(25));
    }

    #[test]
    fn epochs_tag_events() {
        let store = EventStore::new();
        store.append(damage("Woo", "Goblin", 0, 10));
        assert_eq!(store.begin_epoch(), 1);
        let stored = store.append(damage("Woo", "Goblin", 0, 10));
        assert_eq!(stored.epoch, 1);
        assert_eq!(stored.seq, 1);
    }

    #[test]
    fn new_epoch_restarts_dps_windows() {
        let store = EventStore::new();
        store.append(damage("Woo", "Goblin", 0, 10));
        store.append(damage("Rogue", "Goblin", 10, 10));
        store.begin_epoch();
        store.append(damage("Woo", "Goblin", 100, 30));

        let (global, per_actor) = store.dps_accumulators();
        assert_eq!(global.total_damage, 30);
        assert_eq!(global.first_damage_time, Some(at(100)));
        assert_eq!(per_actor.keys().collect::<Vec<_>>(), vec!["Woo"]);
        assert_eq!(store.len(), 3);
        assert_eq!(store.query_by_target("Goblin").len(), 3);
    }

    #[test]
    fn correlated_append_commits_pairs_with_event() {
        let store = EventStore::new();
        let (stored, updated) = store.append_correlated(
            damage("Woo", "Dragon", 0, 100),
            &[("Physical".to_string(), 100, 25)],
        );
        assert_eq!(stored.seq, 0);
        assert_eq!(updated, vec![true]);

        let (_, updated) = store.append_correlated(
            damage("Woo", "Dragon", 1, 40),
            &[("Physical".to_string(), 40, 40)],
        );
        assert_eq!(updated, vec![false]);
        let record = store.profile("Dragon").unwrap().immunities["Physical"];
        assert_eq!((record.max_damage, record.max_absorbed, record.samples), (100, 25, 2));
    }

    #[test]
    fn reset_clears_everything() {
        let store = EventStore::new();
        store.append(damage("Woo", "Goblin", 0, 10));
        store.record_immunity("Goblin", "Fire", 10, 5);
        let generation = store.generation();

        store.reset();
        assert!(store.is_empty());
        assert!(store.known_targets().is_empty());
        assert!(store.profile("Goblin").is_none());
        assert_eq!(store.last_damage_time(), None);
        assert_eq!(store.generation(), generation + 1);
    }

    #[test]
    fn readers_see_whole_appends() {
        let store = Arc::new(EventStore::new());
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..500 {
                    store.append(damage("Woo", "Goblin", i, 1));
                }
            })
        };
        let reader = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..500 {
                    store.with_view(|view| {
                        let indexed = view.by_target.get("Goblin").map_or(0, |v| v.len());
                        assert_eq!(indexed as u64, view.dps_global.total_damage);
                    });
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(store.len(), 500);
    }
}
