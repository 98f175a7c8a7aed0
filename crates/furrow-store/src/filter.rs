//! Event filtering for listings.

use chrono::{DateTime, Utc};
use furrow_canonical::Epc;
use furrow_core::{BackendError, Event, EventQuery, EventType};

/// Predicate over events.
pub trait EventFilter {
    /// Returns true if the event matches.
    fn matches(&self, event: &Event) -> bool;

    /// Bounds the store query can apply up front.
    fn time_bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (None, None)
    }
}

/// Events that mention an EPC anywhere (carried, consumed or produced).
#[derive(Debug, Clone)]
pub struct EpcFilter {
    /// EPC to match.
    pub epc: Epc,
}

impl EventFilter for EpcFilter {
    fn matches(&self, event: &Event) -> bool {
        event.all_epcs().any(|e| e == &self.epc)
    }
}

/// Filter by event type.
#[derive(Debug, Clone)]
pub struct EventTypeFilter {
    /// Event type to match.
    pub event_type: EventType,
}

impl EventFilter for EventTypeFilter {
    fn matches(&self, event: &Event) -> bool {
        event.event_type == self.event_type
    }
}

/// Filter by event time, both bounds inclusive.
#[derive(Debug, Clone, Default)]
pub struct TimeRangeFilter {
    /// Earliest event time.
    pub after: Option<DateTime<Utc>>,
    /// Latest event time.
    pub before: Option<DateTime<Utc>>,
}

impl EventFilter for TimeRangeFilter {
    fn matches(&self, event: &Event) -> bool {
        self.after.map_or(true, |a| event.event_time >= a)
            && self.before.map_or(true, |b| event.event_time <= b)
    }

    fn time_bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (self.after, self.before)
    }
}

/// All filters must match.
#[derive(Default)]
pub struct AndFilter {
    /// Filters to combine.
    pub filters: Vec<Box<dyn EventFilter>>,
}

impl AndFilter {
    /// Adds a filter.
    pub fn with(mut self, filter: impl EventFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl EventFilter for AndFilter {
    fn matches(&self, event: &Event) -> bool {
        self.filters.iter().all(|f| f.matches(event))
    }

    fn time_bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        self.filters
            .iter()
            .map(|f| f.time_bounds())
            .fold((None, None), |(after, before), (a, b)| {
                (max_opt(after, a), min_opt(before, b))
            })
    }
}

fn max_opt(x: Option<DateTime<Utc>>, y: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (x, y) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, y) => x.or(y),
    }
}

fn min_opt(x: Option<DateTime<Utc>>, y: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (x, y) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, y) => x.or(y),
    }
}

/// Matching events ordered by event time, then id.
pub fn select<Q, F>(store: &Q, filter: &F) -> Result<Vec<Event>, BackendError>
where
    Q: EventQuery + ?Sized,
    F: EventFilter + ?Sized,
{
    let (after, before) = filter.time_bounds();
    let mut events: Vec<Event> = store
        .events_between(after, before)?
        .into_iter()
        .filter(|e| filter.matches(e))
        .collect();
    events.sort_by(|a, b| a.event_time.cmp(&b.event_time).then_with(|| a.id.cmp(&b.id)));
    Ok(events)
}
