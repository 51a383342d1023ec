use std::collections::BTreeMap;

use chrono::NaiveDateTime;

/// Damage dealt by one actor (or by everyone, for the global accumulator).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DpsAccumulator {
    pub first_damage_time: Option<NaiveDateTime>,
    pub last_damage_time: Option<NaiveDateTime>,
    pub total_damage: u64,
    pub damage_by_type: BTreeMap<String, u64>,
}

impl DpsAccumulator {
    pub fn record(&mut self, timestamp: NaiveDateTime, total: u32, breakdown: &[(String, u32)]) {
        self.update_action_time(timestamp);
        self.total_damage += u64::from(total);
        for (dtype, amount) in breakdown {
            *self.damage_by_type.entry(dtype.clone()).or_insert(0) += u64::from(*amount);
        }
    }

    pub fn update_action_time(&mut self, timestamp: NaiveDateTime) {
        if self.first_damage_time.is_none_or(|first| timestamp < first) {
            self.first_damage_time = Some(timestamp);
        }
        if self.last_damage_time.is_none_or(|last| timestamp > last) {
            self.last_damage_time = Some(timestamp);
        }
    }
}

/// Seconds between two log timestamps, never negative.
pub fn elapsed_seconds(first: NaiveDateTime, last: NaiveDateTime) -> i64 {
    (last - first).num_seconds().max(0)
}

/// Damage per second over `elapsed` seconds. A zero-length window (a single
/// instant of damage) reports the raw total, as if one second had passed.
pub fn calculate_dps(total: u64, elapsed: i64) -> f64 {
    let duration_secs = if elapsed > 0 { elapsed } else { 1 };
    total as f64 / duration_secs as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(secs: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 9)
            .and_then(|d| d.and_hms_opt(14, 30, 0))
            .unwrap()
            + chrono::Duration::seconds(i64::from(secs))
    }

    #[test]
    fn accumulates_totals_and_types() {
        let mut acc = DpsAccumulator::default();
        acc.record(at(5), 100, &[("Fire".into(), 60), ("Physical".into(), 40)]);
        acc.record(at(1), 50, &[("Fire".into(), 50)]);
        assert_eq!(acc.total_damage, 150);
        assert_eq!(acc.damage_by_type["Fire"], 110);
        assert_eq!(acc.first_damage_time, Some(at(1)));
        assert_eq!(acc.last_damage_time, Some(at(5)));
    }

    #[test]
    fn zero_elapsed_reports_raw_total() {
        assert_eq!(calculate_dps(200, 0), 200.0);
        assert_eq!(calculate_dps(200, 10), 20.0);
        assert_eq!(elapsed_seconds(at(10), at(4)), 0);
    }
}
