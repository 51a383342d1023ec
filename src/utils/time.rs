use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};

/// Backward jumps up to this many seconds are clock jitter, not a new day.
pub const CLOCK_JITTER_TOLERANCE_SECS: i64 = 60;

pub fn format_duration(seconds: i64) -> String {
    if seconds >= 60 {
        let minutes = seconds / 60;
        let remaining_seconds = seconds % 60;
        format!("[{}m:{}s]", minutes, remaining_seconds)
    } else {
        format!("[{}s]", seconds)
    }
}

/// Parses the `HH:MM:SS` part of a header like "Tue Jul 29 14:10:26".
pub fn parse_time_of_day(stamp: &str) -> Option<NaiveTime> {
    let time_part = stamp.split_whitespace().find(|part| part.contains(':'))?;
    let mut parts = time_part.split(':');
    let hours = parts.next()?.parse::<u32>().ok()?;
    let minutes = parts.next()?.parse::<u32>().ok()?;
    let seconds = parts.next()?.parse::<u32>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveTime::from_hms_opt(hours, minutes, seconds)
}

/// Turns the date-less clock of the game log into full timestamps.
///
/// The log only carries a time of day. The date is carried forward from the
/// previous line and advanced by one day whenever the time of day drops by
/// more than the jitter tolerance, which is how a session crossing midnight
/// shows up.
#[derive(Debug, Clone)]
pub struct LogClock {
    date: NaiveDate,
    last: Option<NaiveDateTime>,
    tolerance_secs: i64,
    restarted: bool,
}

impl Default for LogClock {
    fn default() -> Self {
        Self::starting_on(Local::now().date_naive())
    }
}

impl LogClock {
    pub fn starting_on(date: NaiveDate) -> Self {
        Self {
            date,
            last: None,
            tolerance_secs: CLOCK_JITTER_TOLERANCE_SECS,
            restarted: false,
        }
    }

    pub fn with_tolerance(mut self, secs: i64) -> Self {
        self.tolerance_secs = secs.max(0);
        self
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn last(&self) -> Option<NaiveDateTime> {
        self.last
    }

    /// Timestamp for the next line. Never earlier than the previous result.
    pub fn observe(&mut self, time: NaiveTime) -> NaiveDateTime {
        let mut candidate = self.date.and_time(time);
        if let Some(last) = self.last {
            let back = (last - candidate).num_seconds();
            // A restarted game cannot be earlier on the same day.
            let tolerance = if self.restarted { 0 } else { self.tolerance_secs };
            if back > tolerance {
                if let Some(next) = self.date.succ_opt() {
                    self.date = next;
                }
                candidate = self.date.and_time(time);
            } else if back > 0 {
                candidate = last;
            }
        }
        self.restarted = false;
        self.last = Some(candidate);
        candidate
    }

    /// The log was truncated and a new game session follows. Its first line
    /// stays on the current date if it is later in the day, otherwise it
    /// moves to the next day, so the session never lands before the old one.
    pub fn restart(&mut self) {
        self.restarted = true;
    }
}
