use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta};
use tracing::debug;

use crate::models::{AppSettings, CombatEvent, DamageEvent, ImmunityAbsorptionEvent};
use crate::store::EventStore;

type PendingKey = (String, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingEntry {
    timestamp: NaiveDateTime,
    amount: u32,
}

/// A damage sub-amount paired with the absorption line reported for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    pub target: String,
    pub damage_type: String,
    pub damage: u32,
    pub absorbed: u32,
    /// Whether the pair replaced the target's recorded maximum.
    pub updated: bool,
}

/// Dispatches parsed events into the store and pairs damage with the
/// immunity lines that trail (or occasionally precede) it.
///
/// Both sides wait in buffers keyed by (target, damage type). Windows are
/// measured on event timestamps so a replay behaves like the live run.
#[derive(Debug)]
pub struct EventRouter {
    store: Arc<EventStore>,
    pending_damage: HashMap<PendingKey, VecDeque<PendingEntry>>,
    pending_immunity: HashMap<PendingKey, VecDeque<PendingEntry>>,
    window: TimeDelta,
    sweep_interval: TimeDelta,
    last_sweep: Option<NaiveDateTime>,
    latest_seen: Option<NaiveDateTime>,
    generation: u64,
}

impl EventRouter {
    pub fn new(store: Arc<EventStore>, window_secs: u32, sweep_interval_secs: u32) -> Self {
        let generation = store.generation();
        Self {
            store,
            pending_damage: HashMap::new(),
            pending_immunity: HashMap::new(),
            window: TimeDelta::seconds(i64::from(window_secs)),
            sweep_interval: TimeDelta::seconds(i64::from(sweep_interval_secs.max(1))),
            last_sweep: None,
            latest_seen: None,
            generation,
        }
    }

    pub fn from_settings(store: Arc<EventStore>, settings: &AppSettings) -> Self {
        Self::new(
            store,
            settings.correlation_window_secs,
            settings.sweep_interval_secs,
        )
    }

    pub fn configure(&mut self, settings: &AppSettings) {
        self.window = TimeDelta::seconds(i64::from(settings.correlation_window_secs));
        self.sweep_interval = TimeDelta::seconds(i64::from(settings.sweep_interval_secs.max(1)));
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn window_secs(&self) -> i64 {
        self.window.num_seconds()
    }

    pub fn route(&mut self, event: CombatEvent) -> Vec<Correlation> {
        self.sync_generation();

        let timestamp = event.timestamp();
        if self.latest_seen.is_none_or(|seen| timestamp > seen) {
            self.latest_seen = Some(timestamp);
        }

        let pairs = match &event {
            CombatEvent::Damage(damage) => self.buffer_damage(damage),
            CombatEvent::Immunity(immunity) => self.match_immunity(immunity).into_iter().collect(),
            CombatEvent::Attack(_) | CombatEvent::Save(_) => Vec::new(),
        };

        let correlations = if pairs.is_empty() {
            self.store.append(event);
            Vec::new()
        } else {
            let target = event.target().unwrap_or_default().to_string();
            let (_, updated) = self.store.append_correlated(event, &pairs);
            pairs
                .into_iter()
                .zip(updated)
                .map(|((damage_type, damage, absorbed), updated)| {
                    debug!(name = %target, damage_type = %damage_type, damage, absorbed, updated, "correlated immunity");
                    Correlation {
                        target: target.clone(),
                        damage_type,
                        damage,
                        absorbed,
                        updated,
                    }
                })
                .collect()
        };

        self.maybe_sweep();
        correlations
    }

    /// Called when the log was truncated. Anything still buffered belongs to
    /// the previous session.
    pub fn begin_epoch(&mut self) -> u32 {
        self.clear_pending();
        self.store.begin_epoch()
    }

    pub fn pending_damage_len(&self) -> usize {
        self.pending_damage.values().map(VecDeque::len).sum()
    }

    pub fn pending_immunity_len(&self) -> usize {
        self.pending_immunity.values().map(VecDeque::len).sum()
    }

    /// Drops buffered entries that fell out of the window relative to the
    /// newest timestamp seen so far.
    pub fn sweep(&mut self) -> usize {
        let Some(now) = self.latest_seen else {
            return 0;
        };
        let cutoff = now - self.window;
        let removed = expire(&mut self.pending_damage, cutoff) + expire(&mut self.pending_immunity, cutoff);
        self.last_sweep = Some(now);
        if removed > 0 {
            debug!(removed, "swept uncorrelated entries");
        }
        removed
    }

    fn maybe_sweep(&mut self) {
        let Some(now) = self.latest_seen else {
            return;
        };
        match self.last_sweep {
            Some(last) if now - last < self.sweep_interval => {}
            Some(_) => {
                self.sweep();
            }
            None => self.last_sweep = Some(now),
        }
    }

    fn sync_generation(&mut self) {
        let generation = self.store.generation();
        if generation != self.generation {
            self.generation = generation;
            self.clear_pending();
        }
    }

    fn clear_pending(&mut self) {
        self.pending_damage.clear();
        self.pending_immunity.clear();
        self.last_sweep = None;
        self.latest_seen = None;
    }

    /// Pairs each sub-amount with a waiting immunity line, or buffers it.
    fn buffer_damage(&mut self, damage: &DamageEvent) -> Vec<(String, u32, u32)> {
        let mut pairs = Vec::new();
        for (damage_type, amount) in &damage.breakdown {
            let key = (damage.target.clone(), damage_type.clone());
            let queued = self
                .pending_immunity
                .get_mut(&key)
                .and_then(|queue| take_nearest(queue, damage.timestamp, self.window));

            match queued {
                Some(absorbed) => pairs.push((damage_type.clone(), *amount, absorbed.amount)),
                None => self.pending_damage.entry(key).or_default().push_back(PendingEntry {
                    timestamp: damage.timestamp,
                    amount: *amount,
                }),
            }
        }
        pairs
    }

    fn match_immunity(&mut self, immunity: &ImmunityAbsorptionEvent) -> Option<(String, u32, u32)> {
        let key = (immunity.target.clone(), immunity.damage_type.clone());
        let found = self
            .pending_damage
            .get_mut(&key)
            .and_then(|queue| take_nearest(queue, immunity.timestamp, self.window));

        match found {
            Some(hit) => Some((immunity.damage_type.clone(), hit.amount, immunity.absorbed)),
            None => {
                self.pending_immunity.entry(key).or_default().push_back(PendingEntry {
                    timestamp: immunity.timestamp,
                    amount: immunity.absorbed,
                });
                None
            }
        }
    }
}

/// Removes and returns the entry closest in time to `at`, if one lies within
/// `window`. Ties go to the most recent entry.
fn take_nearest(queue: &mut VecDeque<PendingEntry>, at: NaiveDateTime, window: TimeDelta) -> Option<PendingEntry> {
    let index = queue
        .iter()
        .enumerate()
        .filter(|(_, entry)| (at - entry.timestamp).abs() <= window)
        .min_by_key(|(i, entry)| ((at - entry.timestamp).abs(), std::cmp::Reverse(*i)))
        .map(|(i, _)| i)?;
    queue.remove(index)
}

fn expire(buffers: &mut HashMap<PendingKey, VecDeque<PendingEntry>>, cutoff: NaiveDateTime) -> usize {
    let mut removed = 0;
    buffers.retain(|_, queue| {
        let before = queue.len();
        queue.retain(|entry| entry.timestamp >= cutoff);
        removed += before - queue.len();
        !queue.is_empty()
    });
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 9)
            .and_then(|d| d.and_hms_opt(14, 30, 0))
            .unwrap()
            + TimeDelta::seconds(secs)
    }

    fn hit(secs: i64, target: &str, parts: &[(&str, u32)]) -> CombatEvent {
        CombatEvent::Damage(DamageEvent {
            timestamp: at(secs),
            source: "Woo".to_string(),
            target: target.to_string(),
            total: parts.iter().map(|(_, n)| n).sum(),
            breakdown: parts.iter().map(|(t, n)| (t.to_string(), *n)).collect(),
        })
    }

    fn absorb(secs: i64, target: &str, damage_type: &str, absorbed: u32) -> CombatEvent {
        CombatEvent::Immunity(ImmunityAbsorptionEvent {
            timestamp: at(secs),
            target: target.to_string(),
            damage_type: damage_type.to_string(),
            absorbed,
        })
    }

    fn router(window: u32) -> EventRouter {
        EventRouter::new(Arc::new(EventStore::new()), window, 5)
    }

    fn pair(router: &EventRouter, target: &str, damage_type: &str) -> Option<(u32, u32)> {
        router
            .store()
            .profile(target)
            .and_then(|p| p.immunities.get(damage_type).map(|r| (r.max_damage, r.max_absorbed)))
    }

    #[test]
    fn immunity_after_damage_is_paired() {
        let mut router = router(1);
        assert!(router.route(hit(0, "Dragon", &[("Fire", 100), ("Physical", 20)])).is_empty());
        let correlations = router.route(absorb(0, "Dragon", "Fire", 50));

        assert_eq!(correlations.len(), 1);
        assert!(correlations[0].updated);
        assert_eq!(pair(&router, "Dragon", "Fire"), Some((100, 50)));
        // The physical part never saw an immunity line.
        assert_eq!(router.pending_damage_len(), 1);
        assert_eq!(router.store().len(), 2);
    }

    #[test]
    fn immunity_before_damage_is_paired() {
        let mut router = router(1);
        assert!(router.route(absorb(3, "Dragon", "Cold", 10)).is_empty());
        assert_eq!(router.pending_immunity_len(), 1);

        let correlations = router.route(hit(4, "Dragon", &[("Cold", 40)]));
        assert_eq!(correlations.len(), 1);
        assert_eq!(pair(&router, "Dragon", "Cold"), Some((40, 10)));
        assert_eq!(router.pending_immunity_len(), 0);
        assert_eq!(router.pending_damage_len(), 0);
    }

    #[test]
    fn type_and_target_must_match() {
        let mut router = router(1);
        router.route(hit(0, "Dragon", &[("Fire", 100)]));
        assert!(router.route(absorb(0, "Dragon", "Cold", 50)).is_empty());
        assert!(router.route(absorb(0, "Goblin", "Fire", 50)).is_empty());
        assert_eq!(pair(&router, "Dragon", "Fire"), None);
    }

    #[test]
    fn each_hit_pairs_once() {
        let mut router = router(1);
        router.route(hit(0, "Dragon", &[("Fire", 100)]));
        router.route(absorb(0, "Dragon", "Fire", 50));
        // A second absorption has nothing left to pair with.
        assert!(router.route(absorb(0, "Dragon", "Fire", 70)).is_empty());
        assert_eq!(pair(&router, "Dragon", "Fire"), Some((100, 50)));
    }

    #[test]
    fn nearest_hit_wins() {
        let mut router = router(2);
        router.route(hit(0, "Dragon", &[("Fire", 30)]));
        router.route(hit(1, "Dragon", &[("Fire", 80)]));
        let correlations = router.route(absorb(1, "Dragon", "Fire", 40));
        assert_eq!(correlations[0].damage, 80);
    }

    #[test]
    fn late_immunity_leaves_later_pair_alone() {
        let mut router = router(1);
        router.route(hit(0, "Dragon", &[("Fire", 100)]));
        router.route(absorb(0, "Dragon", "Fire", 50));

        router.route(hit(10, "Dragon", &[("Fire", 300)]));
        // Arrives long after the 300 hit; must not be paired with it.
        assert!(router.route(absorb(15, "Dragon", "Fire", 5)).is_empty());
        // Nor with a later, unrelated hit.
        assert!(router.route(hit(20, "Dragon", &[("Fire", 500)])).is_empty());

        assert_eq!(pair(&router, "Dragon", "Fire"), Some((100, 50)));
    }

    #[test]
    fn zero_window_needs_same_second() {
        let mut router = router(0);
        router.route(hit(0, "Dragon", &[("Acid", 60)]));
        assert!(router.route(absorb(1, "Dragon", "Acid", 20)).is_empty());

        router.route(hit(2, "Dragon", &[("Acid", 80)]));
        assert_eq!(router.route(absorb(2, "Dragon", "Acid", 20)).len(), 1);
        assert_eq!(pair(&router, "Dragon", "Acid"), Some((80, 20)));
    }

    #[test]
    fn wide_window_pairs_slow_lines() {
        let mut router = router(300);
        router.route(hit(0, "Dragon", &[("Sonic", 90)]));
        assert_eq!(router.route(absorb(240, "Dragon", "Sonic", 10)).len(), 1);
    }

    #[test]
    fn sweep_discards_stale_entries() {
        let mut router = router(1);
        router.route(hit(0, "Dragon", &[("Fire", 10), ("Cold", 10)]));
        router.route(absorb(0, "Goblin", "Acid", 5));
        assert_eq!(router.pending_damage_len(), 2);
        assert_eq!(router.pending_immunity_len(), 1);

        // Sweep interval is 5s of log time.
        router.route(hit(6, "Orc", &[("Physical", 1)]));
        assert_eq!(router.pending_damage_len(), 1);
        assert_eq!(router.pending_immunity_len(), 0);
    }

    #[test]
    fn store_reset_drops_buffers() {
        let mut router = router(1);
        router.route(hit(0, "Dragon", &[("Fire", 100)]));
        router.store().reset();

        assert!(router.route(absorb(0, "Dragon", "Fire", 50)).is_empty());
        assert_eq!(router.pending_damage_len(), 0);
        assert_eq!(router.pending_immunity_len(), 1);
    }

    #[test]
    fn pair_is_visible_only_with_its_event() {
        let store = Arc::new(EventStore::new());
        let mut router = EventRouter::new(Arc::clone(&store), 1, 5);
        let reader = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..500 {
                    store.with_view(|view| {
                        for (target, profile) in view.profiles {
                            let absorptions = view
                                .by_target
                                .get(target)
                                .map_or(0, |events| {
                                    events
                                        .iter()
                                        .filter(|e| matches!(e.event, CombatEvent::Immunity(_)))
                                        .count()
                                });
                            let paired: u32 = profile.immunities.values().map(|r| r.samples).sum();
                            assert_eq!(paired as usize, absorptions, "{target}");
                        }
                    });
                }
            })
        };
        for i in 0..200 {
            let target = format!("Dragon {}", i % 7);
            router.route(hit(i, &target, &[("Fire", 100)]));
            router.route(absorb(i, &target, "Fire", 50));
        }
        reader.join().unwrap();
        assert_eq!(store.len(), 400);
    }

    #[test]
    fn new_epoch_drops_buffers() {
        let mut router = router(1);
        router.route(hit(0, "Dragon", &[("Fire", 100)]));
        assert_eq!(router.begin_epoch(), 1);
        assert!(router.route(absorb(0, "Dragon", "Fire", 50)).is_empty());
    }
}
