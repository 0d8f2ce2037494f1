//! Append-only event bus and its pull-based consumers.
//!
//! Only the engine publishes. Observers hold an [`EventReader`] (a clone of
//! the shared log handle with read-only methods) and pull with cursors, so a
//! narration layer or analytics task can run on another thread without any
//! path back into simulation state.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sim_core::{SimEvent, SimEventKind, SimError, TeamName};
use tracing::debug;

type Log = Arc<RwLock<Vec<SimEvent>>>;

/// Owner of the event log.
#[derive(Resource, Debug, Default)]
pub struct SimEventBus {
    log: Log,
}

impl SimEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a previously published log.
    pub(crate) fn restore(events: Vec<SimEvent>) -> Self {
        Self {
            log: Arc::new(RwLock::new(events)),
        }
    }

    /// Sequence and append a draft. The stored event is never changed again.
    pub(crate) fn publish(&self, mut draft: SimEvent) -> u64 {
        let mut log = self.log.write().unwrap_or_else(PoisonError::into_inner);
        let seq = log.len() as u64;
        draft.seq = seq;
        debug!(seq, kind = draft.kind.as_str(), tick = draft.tick, "event published");
        log.push(draft);
        seq
    }

    pub fn reader(&self) -> EventReader {
        EventReader {
            log: Arc::clone(&self.log),
        }
    }

    pub fn len(&self) -> usize {
        self.reader().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read-only handle on the event log.
#[derive(Clone, Debug)]
pub struct EventReader {
    log: Log,
}

impl EventReader {
    pub fn len(&self) -> usize {
        self.log.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, seq: u64) -> Option<SimEvent> {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(seq as usize)
            .cloned()
    }

    /// Events with `seq >= from`, oldest first, at most `limit`.
    pub fn since(&self, from: u64, limit: Option<usize>) -> Vec<SimEvent> {
        let log = self.log.read().unwrap_or_else(PoisonError::into_inner);
        log.iter()
            .skip(from as usize)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Most recent events first.
    pub fn recent(&self, limit: usize) -> Vec<SimEvent> {
        let log = self.log.read().unwrap_or_else(PoisonError::into_inner);
        log.iter().rev().take(limit).cloned().collect()
    }

    /// Full copy of the log, oldest first.
    pub fn all(&self) -> Vec<SimEvent> {
        self.since(0, None)
    }

    /// Cursor starting at the beginning of the log.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            reader: self.clone(),
            cursor: 0,
            kinds: None,
        }
    }

    /// Cursor that only sees events published from now on.
    pub fn subscribe_from_now(&self) -> Subscription {
        Subscription {
            cursor: self.len() as u64,
            ..self.subscribe()
        }
    }
}

/// A consumer's position in the log.
#[derive(Clone, Debug)]
pub struct Subscription {
    reader: EventReader,
    cursor: u64,
    kinds: Option<BTreeSet<SimEventKind>>,
}

impl Subscription {
    /// Only deliver the given kinds.
    pub fn only(mut self, kinds: &[SimEventKind]) -> Self {
        self.kinds = Some(kinds.iter().copied().collect());
        self
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Everything published since the last poll that passes the filter.
    pub fn poll(&mut self) -> Vec<SimEvent> {
        let batch = self.reader.since(self.cursor, None);
        self.cursor += batch.len() as u64;
        match &self.kinds {
            Some(kinds) => batch.into_iter().filter(|e| kinds.contains(&e.kind)).collect(),
            None => batch,
        }
    }
}

/// Read-only observer of published events.
pub trait EventConsumer: Send + Sync {
    fn name(&self) -> &'static str;
    fn consume(&mut self, event: &SimEvent);
    /// JSON summary of what the consumer has seen.
    fn summary(&self) -> serde_json::Value;
}

/// Collects lines for spoken commentary; silent events are skipped.
#[derive(Debug, Default)]
pub struct NarrationFeed {
    lines: Vec<String>,
}

impl NarrationFeed {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl EventConsumer for NarrationFeed {
    fn name(&self) -> &'static str {
        "narration"
    }

    fn consume(&mut self, event: &SimEvent) {
        if let Some(hint) = &event.narration_hint {
            self.lines.push(format!("[{}] {}", event.title, hint));
        }
    }

    fn summary(&self) -> serde_json::Value {
        json!({ "lines": self.lines.len(), "latest": self.lines.last() })
    }
}

/// Counts events by kind and by team.
#[derive(Debug, Default)]
pub struct AnalyticsTally {
    by_kind: BTreeMap<SimEventKind, u64>,
    by_team: BTreeMap<TeamName, u64>,
}

impl AnalyticsTally {
    pub fn count(&self, kind: SimEventKind) -> u64 {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }

    pub fn team_count(&self, team: &TeamName) -> u64 {
        self.by_team.get(team).copied().unwrap_or(0)
    }
}

impl EventConsumer for AnalyticsTally {
    fn name(&self) -> &'static str {
        "analytics"
    }

    fn consume(&mut self, event: &SimEvent) {
        *self.by_kind.entry(event.kind).or_default() += 1;
        for team in &event.teams {
            *self.by_team.entry(team.clone()).or_default() += 1;
        }
    }

    fn summary(&self) -> serde_json::Value {
        let kinds: BTreeMap<&str, u64> = self
            .by_kind
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        let teams: BTreeMap<&str, u64> = self
            .by_team
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        json!({ "by_kind": kinds, "by_team": teams })
    }
}

/// Keeps the last `capacity` events as JSON lines.
#[derive(Debug)]
pub struct TraceLog {
    capacity: usize,
    lines: Vec<String>,
    seen: u64,
}

impl Default for TraceLog {
    fn default() -> Self {
        Self {
            capacity: 256,
            lines: Vec::new(),
            seen: 0,
        }
    }
}

impl TraceLog {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl EventConsumer for TraceLog {
    fn name(&self) -> &'static str {
        "trace"
    }

    fn consume(&mut self, event: &SimEvent) {
        self.seen += 1;
        match serde_json::to_string(event) {
            Ok(line) => self.lines.push(line),
            Err(e) => debug!(seq = event.seq, error = %e, "event not traceable"),
        }
        if self.lines.len() > self.capacity {
            let excess = self.lines.len() - self.capacity;
            self.lines.drain(..excess);
        }
    }

    fn summary(&self) -> serde_json::Value {
        json!({ "seen": self.seen, "kept": self.lines.len() })
    }
}

/// Consumer variants known at compile time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerKind {
    Narration,
    Analytics,
    Trace,
}

impl ConsumerKind {
    pub const ALL: [ConsumerKind; 3] = [
        ConsumerKind::Narration,
        ConsumerKind::Analytics,
        ConsumerKind::Trace,
    ];
}

impl FromStr for ConsumerKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "narration" => Ok(ConsumerKind::Narration),
            "analytics" => Ok(ConsumerKind::Analytics),
            "trace" => Ok(ConsumerKind::Trace),
            other => Err(SimError::InvalidInput(format!("unknown consumer {other}"))),
        }
    }
}

/// Construct the consumer for a kind.
pub fn consumer_for(kind: ConsumerKind) -> Box<dyn EventConsumer> {
    match kind {
        ConsumerKind::Narration => Box::<NarrationFeed>::default(),
        ConsumerKind::Analytics => Box::<AnalyticsTally>::default(),
        ConsumerKind::Trace => Box::<TraceLog>::default(),
    }
}

/// A fixed set of consumers, each with its own cursor.
pub struct ConsumerRegistry {
    entries: Vec<(Box<dyn EventConsumer>, Subscription)>,
}

impl ConsumerRegistry {
    pub fn new(reader: &EventReader, kinds: &[ConsumerKind]) -> Self {
        let mut kinds = kinds.to_vec();
        kinds.sort();
        kinds.dedup();
        Self {
            entries: kinds
                .into_iter()
                .map(|k| (consumer_for(k), reader.subscribe()))
                .collect(),
        }
    }

    /// Deliver pending events to every consumer; returns deliveries made.
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        for (consumer, sub) in &mut self.entries {
            for event in sub.poll() {
                consumer.consume(&event);
                delivered += 1;
            }
        }
        delivered
    }

    pub fn summaries(&self) -> BTreeMap<&'static str, serde_json::Value> {
        self.entries
            .iter()
            .map(|(c, _)| (c.name(), c.summary()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(kind: SimEventKind, team: &str) -> SimEvent {
        SimEvent::new(kind, 1, 1).team(&TeamName::from(team)).title(kind.as_str())
    }

    #[test]
    fn publish_assigns_sequence_in_order() {
        let bus = SimEventBus::new();
        assert_eq!(bus.publish(draft(SimEventKind::RaceResult, "A")), 0);
        assert_eq!(bus.publish(draft(SimEventKind::Forfeit, "B")), 1);
        let all = bus.reader().all();
        assert_eq!(all.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(bus.reader().recent(1)[0].kind, SimEventKind::Forfeit);
    }

    #[test]
    fn subscriptions_resume_from_their_cursor() {
        let bus = SimEventBus::new();
        let reader = bus.reader();
        let mut all = reader.subscribe();
        let mut forfeits = reader.subscribe().only(&[SimEventKind::Forfeit]);
        bus.publish(draft(SimEventKind::RaceResult, "A"));
        bus.publish(draft(SimEventKind::Forfeit, "B"));
        assert_eq!(all.poll().len(), 2);
        assert!(all.poll().is_empty());
        let mut late = reader.subscribe_from_now();
        bus.publish(draft(SimEventKind::Forfeit, "C"));
        assert_eq!(forfeits.poll().len(), 2);
        assert_eq!(late.poll().len(), 1);
        assert_eq!(all.cursor(), 2);
    }

    #[test]
    fn registry_pumps_each_consumer_once() {
        let bus = SimEventBus::new();
        bus.publish(draft(SimEventKind::RaceResult, "A").narrate("A takes the flag"));
        bus.publish(draft(SimEventKind::Transfer, "B"));
        let mut registry = ConsumerRegistry::new(
            &bus.reader(),
            &[ConsumerKind::Trace, ConsumerKind::Narration, ConsumerKind::Analytics, ConsumerKind::Trace],
        );
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.pump(), 6);
        assert_eq!(registry.pump(), 0);
        let s = registry.summaries();
        assert_eq!(s["narration"]["lines"], 1);
        assert_eq!(s["analytics"]["by_kind"]["transfer"], 1);
        assert_eq!(s["trace"]["seen"], 2);
    }

    #[test]
    fn consumer_names_parse() {
        for k in ConsumerKind::ALL {
            let name = serde_json::to_value(k).unwrap();
            assert_eq!(name.as_str().unwrap().parse::<ConsumerKind>().unwrap(), k);
        }
        assert!("radio".parse::<ConsumerKind>().is_err());
    }
}
