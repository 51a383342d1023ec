use std::collections::HashSet;

use chrono::NaiveDateTime;
use regex::Captures;

use crate::error::ParseError;
use crate::models::{
    AttackEvent, AttackOutcome, CombatEvent, DamageEvent, ImmunityAbsorptionEvent, SaveEvent,
    SaveKind,
};
use crate::parsing::regex::*;
use crate::utils::time::{LogClock, parse_time_of_day};

/// Turns single log lines into typed combat events.
///
/// The only state is the log clock (to derive full dates) and the two
/// filters; no line depends on the lines around it.
#[derive(Debug, Clone)]
pub struct LineParser {
    allow_list: Option<HashSet<String>>,
    parse_immunity: bool,
    clock: LogClock,
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new(Vec::new(), true)
    }
}

impl LineParser {
    pub fn new(allow_list: Vec<String>, parse_immunity: bool) -> Self {
        Self {
            allow_list: None,
            parse_immunity,
            clock: LogClock::default(),
        }
        .with_allow_list(allow_list)
    }

    pub fn with_clock(mut self, clock: LogClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_allow_list(mut self, names: Vec<String>) -> Self {
        self.set_allow_list(names);
        self
    }

    pub fn set_allow_list(&mut self, names: Vec<String>) {
        let names: HashSet<String> = names
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        self.allow_list = if names.is_empty() { None } else { Some(names) };
    }

    pub fn set_parse_immunity(&mut self, enabled: bool) {
        self.parse_immunity = enabled;
    }

    pub fn parse_immunity(&self) -> bool {
        self.parse_immunity
    }

    pub fn clock(&self) -> &LogClock {
        &self.clock
    }

    /// Called when the log was truncated and a new session begins on the same
    /// file.
    pub fn restart_clock(&mut self) {
        self.clock.restart();
    }

    /// `Ok(None)` for anything that is not a combat line (or is filtered out),
    /// `Err` when a line matched a template but carried an unreadable number.
    pub fn parse_line(&mut self, line: &str) -> Result<Option<CombatEvent>, ParseError> {
        let Some(header) = RE_HEADER.captures(line) else {
            return Ok(None);
        };
        let body = header.name("body").map_or("", |m| m.as_str());
        if body.is_empty() {
            return Ok(None);
        }

        let Some(time) = parse_time_of_day(&header["stamp"]) else {
            // Only a problem if the rest of the line is something we would have kept.
            if self.recognizes(body) {
                return Err(ParseError::malformed("timestamp", &header["stamp"]));
            }
            return Ok(None);
        };

        // Every stamped line moves the clock, so midnight is noticed even
        // when it falls between non-combat chatter.
        let timestamp = self.clock.observe(time);

        let Some(event) = self.parse_body(body, timestamp)? else {
            return Ok(None);
        };
        if !self.is_allowed(&event) {
            return Ok(None);
        }
        Ok(Some(event))
    }

    fn recognizes(&self, body: &str) -> bool {
        RE_DAMAGE.is_match(body)
            || (self.parse_immunity && RE_ABSORB.is_match(body))
            || RE_ATTACK.is_match(body)
            || RE_SAVE.is_match(body)
    }

    /// Immunity lines name no attacker, so they always pass; they can only
    /// pair with damage that was itself allowed through.
    fn is_allowed(&self, event: &CombatEvent) -> bool {
        let Some(names) = &self.allow_list else {
            return true;
        };
        matches!(event, CombatEvent::Immunity(_))
            || event.actor().is_some_and(|name| names.contains(name))
            || event.target().is_some_and(|name| names.contains(name))
    }

    fn parse_body(
        &self,
        body: &str,
        timestamp: NaiveDateTime,
    ) -> Result<Option<CombatEvent>, ParseError> {
        if let Some(caps) = RE_DAMAGE.captures(body) {
            return parse_damage(&caps, timestamp).map(Some);
        }

        if self.parse_immunity {
            if let Some(caps) = RE_ABSORB.captures(body) {
                return Ok(Some(CombatEvent::Immunity(ImmunityAbsorptionEvent {
                    timestamp,
                    target: clean_name(&caps["target"]),
                    damage_type: normalize_type(&caps["type"]),
                    absorbed: parse_amount("absorbed", &caps["amount"])?,
                })));
            }
        }

        if let Some(caps) = RE_ATTACK.captures(body) {
            return parse_attack(&caps, timestamp);
        }

        if let Some(caps) = RE_SAVE.captures(body) {
            return parse_save(&caps, timestamp);
        }

        Ok(None)
    }
}

fn clean_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_type(raw: &str) -> String {
    clean_name(raw.trim_end_matches('.'))
}

fn parse_amount(field: &'static str, raw: &str) -> Result<u32, ParseError> {
    let digits: String = raw.chars().filter(|c| *c != ',').collect();
    digits
        .parse::<u32>()
        .map_err(|_| ParseError::malformed(field, raw))
}

fn parse_signed(field: &'static str, sign: &str, raw: &str) -> Result<i32, ParseError> {
    let value = raw
        .parse::<i32>()
        .map_err(|_| ParseError::malformed(field, raw))?;
    if sign == "-" {
        value
            .checked_neg()
            .ok_or_else(|| ParseError::malformed(field, raw))
    } else {
        Ok(value)
    }
}

/// Splits "21 Physical 13 Positive Energy 1 Pure" into ordered (type, amount)
/// pairs. A type runs from one number to the next, so names may span words.
pub fn parse_damage_breakdown(breakdown: &str) -> Result<Vec<(String, u32)>, ParseError> {
    let mut clauses: Vec<(String, u32)> = Vec::new();
    let mut current: Option<(Vec<&str>, u32)> = None;

    for token in breakdown.split_whitespace() {
        if token.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            if let Some((words, amount)) = current.take() {
                push_clause(&mut clauses, &words, amount);
            }
            current = Some((Vec::new(), parse_amount("breakdown amount", token)?));
        } else if let Some((words, _)) = current.as_mut() {
            words.push(token);
        }
    }
    if let Some((words, amount)) = current {
        push_clause(&mut clauses, &words, amount);
    }
    Ok(clauses)
}

fn push_clause(clauses: &mut Vec<(String, u32)>, words: &[&str], amount: u32) {
    if words.is_empty() {
        return;
    }
    let dtype = words.join(" ");
    // The game never repeats a type, but merge rather than lose damage if it does.
    if let Some((_, existing)) = clauses.iter_mut().find(|(t, _)| *t == dtype) {
        *existing = existing.saturating_add(amount);
    } else {
        clauses.push((dtype, amount));
    }
}

fn parse_damage(caps: &Captures, timestamp: NaiveDateTime) -> Result<CombatEvent, ParseError> {
    Ok(CombatEvent::Damage(DamageEvent {
        timestamp,
        source: clean_name(&caps["attacker"]),
        target: clean_name(&caps["target"]),
        total: parse_amount("damage total", &caps["total"])?,
        breakdown: parse_damage_breakdown(&caps["breakdown"])?,
    }))
}

fn parse_attack(
    caps: &Captures,
    timestamp: NaiveDateTime,
) -> Result<Option<CombatEvent>, ParseError> {
    let rest = &caps["rest"];

    let mut hit = false;
    let mut critical = false;
    let mut missed = false;
    let mut concealed = false;
    for outcome in RE_ATTACK_OUTCOME.captures_iter(rest) {
        let outcome = outcome["outcome"].to_ascii_lowercase();
        if outcome == "critical hit" {
            critical = true;
        } else if outcome == "hit" {
            hit = true;
        } else if outcome.starts_with("target concealed") || outcome.starts_with("attacker miss chance") {
            concealed = true;
        } else {
            missed = true;
        }
    }

    // Without a roll there is nothing to estimate from.
    let Some(roll_caps) = RE_ATTACK_ROLL.captures(rest) else {
        return Ok(None);
    };
    let roll = parse_amount("attack roll", &roll_caps["roll"])?;
    let attack_bonus = parse_signed("attack bonus", &roll_caps["sign"], &roll_caps["bonus"])?;
    let total = i32::try_from(roll)
        .ok()
        .and_then(|roll| roll.checked_add(attack_bonus))
        .ok_or_else(|| ParseError::malformed("attack roll", &roll_caps[0]))?;

    let outcome = if critical {
        AttackOutcome::CriticalHit
    } else if hit {
        AttackOutcome::Hit
    } else if concealed {
        AttackOutcome::MissConcealment
    } else if missed && roll == 1 {
        AttackOutcome::MissNatural1
    } else if missed {
        AttackOutcome::Miss
    } else {
        return Ok(None);
    };

    Ok(Some(CombatEvent::Attack(AttackEvent {
        timestamp,
        source: clean_name(&caps["attacker"]),
        target: clean_name(&caps["target"]),
        attack_bonus,
        roll,
        outcome,
        total,
    })))
}

fn parse_save(caps: &Captures, timestamp: NaiveDateTime) -> Result<Option<CombatEvent>, ParseError> {
    let Some(kind) = SaveKind::from_label(&caps["save_type"]) else {
        return Ok(None);
    };
    let rest = &caps["rest"];
    let Some(roll_caps) = RE_SAVE_ROLL.captures(rest) else {
        return Ok(None);
    };

    let succeeded = RE_SAVE_OUTCOME
        .captures(rest)
        .is_some_and(|c| c["result"].to_ascii_lowercase().starts_with("succ"));
    let dc = match RE_SAVE_DC.captures(rest) {
        Some(dc_caps) => Some(parse_amount("save dc", &dc_caps["dc"])?),
        None => None,
    };

    Ok(Some(CombatEvent::Save(SaveEvent {
        timestamp,
        actor: clean_name(&caps["target"]),
        kind,
        value: parse_signed("save bonus", &roll_caps["sign"], &roll_caps["bonus"])?,
        roll: parse_amount("save roll", &roll_caps["roll"])?,
        dc,
        succeeded,
    })))
}
