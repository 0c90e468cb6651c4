//! Finds the handlers an incoming request, event or clock strike reaches.
//!
//! Path patterns and cron schedules are compiled on first use and cached per
//! [`HandlerId`], so repeated dispatches in a test run do not recompile them.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use cron::Schedule;
use hostbed_core::{EventHandler, HandlerId, HttpHandler, Method, Registry, TimerHandler};
use parking_lot::RwLock;
use regex::Regex;
use tracing::{trace, warn};

/// Compiles a path pattern into an anchored regex.
///
/// `*` stands for exactly one non-empty segment, everything else matches
/// literally. A query string or fragment may follow the path.
pub fn compile_path_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let mut source = String::from("^");
    for (i, segment) in pattern.split('/').enumerate() {
        if i > 0 {
            source.push('/');
        }
        if segment == "*" {
            source.push_str("[^/?#]+");
        } else {
            source.push_str(&regex::escape(segment));
        }
    }
    source.push_str("(?:[?#].*)?$");
    Regex::new(&source)
}

/// Parses a cron expression.
///
/// Five-field expressions fire at second 0. The day-of-week field uses
/// classic numbering (0-7, Sunday as 0 or 7) and is rewritten for the `cron`
/// crate, which counts 1-7 from Sunday.
pub fn parse_schedule(expression: &str) -> Result<Schedule, cron::error::Error> {
    let mut fields: Vec<String> = expression.split_whitespace().map(str::to_string).collect();
    if fields.len() == 5 {
        fields.insert(0, "0".to_string());
    }
    if let Some(days) = fields.get_mut(5) {
        *days = classic_days_of_week(days);
    }
    Schedule::from_str(&fields.join(" "))
}

/// Rewrites a classic day-of-week field into the `cron` crate's numbering.
///
/// Named days pass through. Numeric items become an explicit list, so
/// ranges ending on Sunday (`5-7`) stay valid. Items that do not parse are
/// left alone for the `cron` crate to reject.
fn classic_days_of_week(field: &str) -> String {
    if field == "*" || field == "?" {
        return field.to_string();
    }
    field
        .split(',')
        .map(|item| {
            if item.bytes().any(|b| b.is_ascii_alphabetic()) {
                return item.to_string();
            }
            match classic_days(item) {
                Some(days) => days
                    .iter()
                    .map(u8::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
                None => item.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// The days one classic item (`N`, `N-M`, `*/S`, `N/S`, `N-M/S`) selects, in
/// `cron` crate numbering.
fn classic_days(item: &str) -> Option<BTreeSet<u8>> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, step.parse::<u8>().ok().filter(|s| *s > 0)?),
        None => (item, 1),
    };
    let (start, end): (u8, u8) = match range.split_once('-') {
        _ if range == "*" => (0, 6),
        Some((start, end)) => (start.parse().ok()?, end.parse().ok()?),
        None if item.contains('/') => (range.parse().ok()?, 6),
        None => {
            let day = range.parse().ok()?;
            (day, day)
        }
    };
    if start > end || end > 7 {
        return None;
    }
    Some(
        (start..=end)
            .step_by(usize::from(step))
            .map(|day| day % 7 + 1)
            .collect(),
    )
}

/// Whether `schedule` fires exactly at `instant`, to the millisecond.
pub fn fires_at(schedule: &Schedule, instant: DateTime<Utc>) -> bool {
    let from = instant - TimeDelta::milliseconds(1);
    schedule
        .after(&from)
        .next()
        .is_some_and(|next| next.timestamp_millis() == instant.timestamp_millis())
}

/// Timer handlers due at an instant.
#[derive(Debug, Default)]
pub struct TimerResolution<'a> {
    pub due: Vec<&'a TimerHandler>,
    /// Handlers whose schedule does not parse, with the reason.
    pub invalid: Vec<(&'a TimerHandler, String)>,
}

/// Handler lookup with a per-handler matcher cache.
#[derive(Debug, Default)]
pub struct Resolver {
    paths: RwLock<HashMap<HandlerId, Option<Arc<Regex>>>>,
    schedules: RwLock<HashMap<HandlerId, Result<Arc<Schedule>, String>>>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn path_matcher(&self, handler: &HttpHandler) -> Option<Arc<Regex>> {
        if let Some(cached) = self.paths.read().get(&handler.id) {
            return cached.clone();
        }
        let compiled = match compile_path_pattern(&handler.path_pattern) {
            Ok(regex) => Some(Arc::new(regex)),
            Err(e) => {
                warn!(pattern = %handler.path_pattern, error = %e, "Unusable path pattern");
                None
            }
        };
        self.paths
            .write()
            .entry(handler.id)
            .or_insert(compiled)
            .clone()
    }

    fn schedule(&self, handler: &TimerHandler) -> Result<Arc<Schedule>, String> {
        if let Some(cached) = self.schedules.read().get(&handler.id) {
            return cached.clone();
        }
        let parsed = parse_schedule(&handler.schedule)
            .map(Arc::new)
            .map_err(|e| e.to_string());
        self.schedules
            .write()
            .entry(handler.id)
            .or_insert(parsed)
            .clone()
    }

    /// HTTP handlers whose method and pattern match `path`.
    pub fn resolve_http<'a>(
        &self,
        registry: &'a Registry,
        method: Method,
        path: &str,
    ) -> Vec<&'a HttpHandler> {
        let matching: Vec<_> = registry
            .http_handlers()
            .iter()
            .filter(|h| h.method == method)
            .filter(|h| self.path_matcher(h).is_some_and(|re| re.is_match(path)))
            .collect();
        trace!(%method, path, matches = matching.len(), "Resolved HTTP handlers");
        matching
    }

    /// Event handlers registered for `topic` and `event_type`.
    pub fn resolve_events<'a>(
        &self,
        registry: &'a Registry,
        topic: &str,
        event_type: &str,
    ) -> Vec<&'a EventHandler> {
        registry
            .event_handlers()
            .iter()
            .filter(|h| h.topic == topic && h.event_type == event_type)
            .collect()
    }

    /// Timer handlers whose schedule fires at `instant`.
    pub fn resolve_timers<'a>(
        &self,
        registry: &'a Registry,
        instant: DateTime<Utc>,
    ) -> TimerResolution<'a> {
        let mut resolution = TimerResolution::default();
        for handler in registry.timer_handlers() {
            match self.schedule(handler) {
                Ok(schedule) if fires_at(&schedule, instant) => resolution.due.push(handler),
                Ok(_) => {}
                Err(reason) => resolution.invalid.push((handler, reason)),
            }
        }
        trace!(%instant, due = resolution.due.len(), "Resolved timer handlers");
        resolution
    }

    /// Number of cached matchers, paths and schedules together.
    pub fn cached(&self) -> usize {
        self.paths.read().len() + self.schedules.read().len()
    }
}
