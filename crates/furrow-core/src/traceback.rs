//! Backward lineage reconstruction.
//!
//! [`LiveGraphWalk`] rebuilds the provenance tree of an EPC from raw events:
//! one containment query for the seeds, one time-bounded query for every
//! candidate predecessor, then an in-memory walk. [`MaterializedIndexLookup`]
//! reads the store's precomputed lineage index instead. [`TracebackEngine`]
//! prefers the live walk and degrades to the index when it fails for reasons
//! other than bad input or an unknown identifier.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use furrow_canonical::{Epc, EventId};
use serde::{Deserialize, Serialize};

use crate::events::{Event, EventType};
use crate::query::{BackendError, EventQuery};

/// Depth used when the caller does not specify one.
pub const DEFAULT_MAX_DEPTH: u32 = 10;

/// Largest accepted `max_depth`.
pub const MAX_TRACE_DEPTH: u32 = 64;

/// Trace query knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceOptions {
    /// Levels below the root that may be expanded.
    pub max_depth: u32,
    /// Keep `read_point` / `biz_location` on returned events.
    pub include_location: bool,
    /// Wall-clock budget for the live walk.
    pub deadline: Option<Duration>,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            include_location: true,
            deadline: None,
        }
    }
}

/// Event plus its predecessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceNode {
    /// The event at this position.
    pub event: Event,
    /// Distance from the root.
    pub depth: u32,
    /// Predecessors, one branch per linking EPC.
    pub children: Vec<TraceNode>,
}

impl TraceNode {
    /// Depth-first iterator over this node and its descendants.
    pub fn iter(&self) -> impl Iterator<Item = &TraceNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

/// Result of a live walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceTree {
    /// Most recent event carrying the identifier.
    pub root_node: TraceNode,
    /// Distinct events in the tree.
    pub total_events: usize,
    /// Greatest depth of any node.
    pub max_depth_reached: u32,
    /// Leaves with no predecessor at all.
    pub origin_events: Vec<EventId>,
}

/// Result of an index lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedLineage {
    /// Upstream events, most recent first.
    pub events: Vec<Event>,
    /// Number of events.
    pub total_events: usize,
}

/// Lineage tagged with the source that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Lineage {
    /// Full tree from the live walk.
    LiveWalk(TraceTree),
    /// Flat list from the lineage index.
    Index(IndexedLineage),
}

impl Lineage {
    /// Number of events returned.
    pub fn total_events(&self) -> usize {
        match self {
            Lineage::LiveWalk(tree) => tree.total_events,
            Lineage::Index(flat) => flat.total_events,
        }
    }
}

/// Traceback failure.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// No event carries the identifier.
    #[error("no events found for {0}")]
    NotFound(Epc),
    /// Rejected query parameters.
    #[error("invalid trace query: {0}")]
    InvalidInput(String),
    /// The live walk exceeded its deadline.
    #[error("trace exceeded deadline of {0:?}")]
    Timeout(Duration),
    /// The store failed.
    #[error(transparent)]
    Query(#[from] BackendError),
    /// The store keeps no lineage index.
    #[error("lineage index unavailable")]
    IndexUnavailable,
}

impl TraceError {
    fn allows_fallback(&self) -> bool {
        !matches!(self, TraceError::NotFound(_) | TraceError::InvalidInput(_))
    }
}

/// Strategy for answering a trace query.
pub trait LineageSource {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Lineage of `epc`. Options are assumed already validated.
    fn lineage(&self, epc: &Epc, options: &TraceOptions) -> Result<Lineage, TraceError>;
}

fn newest_first(a: &Event, b: &Event) -> std::cmp::Ordering {
    b.event_time.cmp(&a.event_time).then_with(|| a.id.cmp(&b.id))
}

fn present(event: &Event, include_location: bool) -> Event {
    if include_location {
        event.clone()
    } else {
        event.clone().without_location()
    }
}

/// Rebuilds the lineage tree from raw events.
pub struct LiveGraphWalk<'s, Q: ?Sized> {
    store: &'s Q,
}

impl<'s, Q: EventQuery + ?Sized> LiveGraphWalk<'s, Q> {
    /// Walks events served by `store`.
    pub fn new(store: &'s Q) -> Self {
        Self { store }
    }
}

impl<Q: EventQuery + ?Sized> LineageSource for LiveGraphWalk<'_, Q> {
    fn name(&self) -> &'static str {
        "live_walk"
    }

    fn lineage(&self, epc: &Epc, options: &TraceOptions) -> Result<Lineage, TraceError> {
        let started = Instant::now();

        let mut seeds = self.store.events_carrying(epc)?;
        seeds.sort_by(newest_first);
        let root = seeds
            .into_iter()
            .next()
            .ok_or_else(|| TraceError::NotFound(epc.clone()))?;

        let mut candidates = self.store.events_between(None, Some(root.event_time))?;
        candidates.sort_by(newest_first);

        let mut walk = Walk::new(&candidates, options, started);
        walk.check_deadline()?;
        walk.visited.insert(root.id.clone());
        let root_node = walk.expand(&root, 0)?;

        tracing::debug!(
            %epc,
            total_events = walk.total,
            max_depth_reached = walk.max_depth_reached,
            discarded = walk.discarded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "live trace complete"
        );

        Ok(Lineage::LiveWalk(TraceTree {
            root_node,
            total_events: walk.total,
            max_depth_reached: walk.max_depth_reached,
            origin_events: walk.origins,
        }))
    }
}

struct Walk<'e> {
    producers: HashMap<&'e Epc, Vec<&'e Event>>,
    carriers: HashMap<&'e Epc, Vec<&'e Event>>,
    visited: HashSet<EventId>,
    origins: Vec<EventId>,
    total: usize,
    max_depth_reached: u32,
    discarded: usize,
    options: &'e TraceOptions,
    started: Instant,
}

impl<'e> Walk<'e> {
    fn new(candidates: &'e [Event], options: &'e TraceOptions, started: Instant) -> Self {
        let mut producers: HashMap<&Epc, Vec<&Event>> = HashMap::new();
        let mut carriers: HashMap<&Epc, Vec<&Event>> = HashMap::new();
        // `candidates` is already newest-first; per-EPC lists keep that order.
        for event in candidates {
            for epc in &event.output_epc_list {
                producers.entry(epc).or_default().push(event);
            }
            let mut seen = HashSet::new();
            for epc in event.carried_epcs() {
                if seen.insert(epc) {
                    carriers.entry(epc).or_default().push(event);
                }
            }
        }
        Self {
            producers,
            carriers,
            visited: HashSet::new(),
            origins: Vec::new(),
            total: 0,
            max_depth_reached: 0,
            discarded: 0,
            options,
            started,
        }
    }

    fn check_deadline(&self) -> Result<(), TraceError> {
        match self.options.deadline {
            Some(limit) if self.started.elapsed() >= limit => Err(TraceError::Timeout(limit)),
            _ => Ok(()),
        }
    }

    /// Latest event strictly before `node` per linking EPC, deduplicated.
    fn predecessors(&mut self, node: &Event) -> Vec<&'e Event> {
        let (links, index): (Vec<&Epc>, _) = match node.event_type {
            EventType::Transformation => (node.input_epc_list.iter().collect(), &self.producers),
            _ => (node.carried_epcs().collect(), &self.carriers),
        };

        let mut picked: Vec<&'e Event> = Vec::new();
        let mut discarded = 0;
        for epc in links {
            let Some(list) = index.get(epc) else { continue };
            let mut choice = None;
            for candidate in list {
                if candidate.id == node.id {
                    continue;
                }
                if candidate.event_time < node.event_time {
                    choice = Some(*candidate);
                    break;
                }
                discarded += 1;
            }
            if let Some(event) = choice {
                if !picked.iter().any(|p| p.id == event.id) {
                    picked.push(event);
                }
            }
        }
        if discarded > 0 {
            tracing::debug!(node = %node.id, discarded, "ignored candidates not strictly earlier");
        }
        self.discarded += discarded;
        picked
    }

    fn expand(&mut self, event: &Event, depth: u32) -> Result<TraceNode, TraceError> {
        self.check_deadline()?;
        self.total += 1;
        self.max_depth_reached = self.max_depth_reached.max(depth);

        let predecessors = self.predecessors(event);
        let mut children = Vec::new();
        if depth < self.options.max_depth {
            for predecessor in predecessors.iter().copied() {
                if !self.visited.insert(predecessor.id.clone()) {
                    continue;
                }
                children.push(self.expand(predecessor, depth + 1)?);
            }
        }
        if predecessors.is_empty() {
            self.origins.push(event.id.clone());
        }

        Ok(TraceNode {
            event: present(event, self.options.include_location),
            depth,
            children,
        })
    }
}

/// Reads the store's precomputed lineage index.
pub struct MaterializedIndexLookup<'s, Q: ?Sized> {
    store: &'s Q,
}

impl<'s, Q: EventQuery + ?Sized> MaterializedIndexLookup<'s, Q> {
    /// Looks up lineage in `store`'s index.
    pub fn new(store: &'s Q) -> Self {
        Self { store }
    }
}

impl<Q: EventQuery + ?Sized> LineageSource for MaterializedIndexLookup<'_, Q> {
    fn name(&self) -> &'static str {
        "index"
    }

    fn lineage(&self, epc: &Epc, options: &TraceOptions) -> Result<Lineage, TraceError> {
        let mut events = self
            .store
            .lineage_index(epc)?
            .ok_or(TraceError::IndexUnavailable)?;
        if events.is_empty() {
            return Err(TraceError::NotFound(epc.clone()));
        }
        events.sort_by(newest_first);
        let events: Vec<Event> = events
            .iter()
            .map(|e| present(e, options.include_location))
            .collect();
        Ok(Lineage::Index(IndexedLineage {
            total_events: events.len(),
            events,
        }))
    }
}

/// Trace entry point: validates the query, runs the live walk, falls back to the index.
pub struct TracebackEngine<'s, Q: ?Sized> {
    live: LiveGraphWalk<'s, Q>,
    index: MaterializedIndexLookup<'s, Q>,
}

impl<'s, Q: EventQuery + ?Sized> TracebackEngine<'s, Q> {
    /// Engine over `store`.
    pub fn new(store: &'s Q) -> Self {
        Self {
            live: LiveGraphWalk::new(store),
            index: MaterializedIndexLookup::new(store),
        }
    }

    /// Traces `identifier` backward to its origins.
    pub fn trace(&self, identifier: &str, options: &TraceOptions) -> Result<Lineage, TraceError> {
        if identifier.trim().is_empty() {
            return Err(TraceError::InvalidInput("identifier is empty".into()));
        }
        if options.max_depth > MAX_TRACE_DEPTH {
            return Err(TraceError::InvalidInput(format!(
                "max_depth {} exceeds {}",
                options.max_depth, MAX_TRACE_DEPTH
            )));
        }
        let epc = Epc::parse(identifier).map_err(|e| TraceError::InvalidInput(e.to_string()))?;

        tracing::debug!(%epc, max_depth = options.max_depth, "trace requested");
        match self.live.lineage(&epc, options) {
            Ok(lineage) => Ok(lineage),
            Err(err) if err.allows_fallback() => {
                tracing::warn!(%epc, error = %err, source = self.index.name(), "live trace failed, falling back");
                self.index.lineage(&epc, options).map_err(|fallback| {
                    tracing::warn!(%epc, error = %fallback, "lineage index lookup failed");
                    err
                })
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::Map;

    fn event(id: &str, hour: u32, event_type: EventType) -> Event {
        Event {
            id: EventId::new(id),
            event_type,
            action: None,
            event_time: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
            recorded_at: None,
            biz_step: None,
            disposition: None,
            epc_list: vec![],
            input_epc_list: vec![],
            output_epc_list: vec![],
            quantity_list: vec![],
            input_quantity_list: vec![],
            output_quantity_list: vec![],
            read_point: Some("farm".into()),
            biz_location: None,
            source_type: Default::default(),
            metadata: Map::new(),
        }
    }

    fn ids(node: &TraceNode) -> Vec<&str> {
        node.iter().map(|n| n.event.id.as_str()).collect()
    }

    #[test]
    fn same_time_candidates_are_not_predecessors() {
        let mut a = event("a", 8, EventType::Object);
        a.epc_list = vec![Epc::new("E1")];
        let mut b = event("b", 8, EventType::Object);
        b.epc_list = vec![Epc::new("E1")];
        let events = vec![a, b];

        let lineage = TracebackEngine::new(&events)
            .trace("E1", &TraceOptions::default())
            .unwrap();
        let Lineage::LiveWalk(tree) = lineage else {
            panic!("expected live walk");
        };
        // Tie on time resolves the root by smallest id.
        assert_eq!(ids(&tree.root_node), vec!["a"]);
        assert_eq!(tree.origin_events, vec![EventId::new("a")]);
    }

    #[test]
    fn tie_break_prefers_smallest_id() {
        let mut x = event("x", 7, EventType::Object);
        x.epc_list = vec![Epc::new("E1")];
        let mut w = event("w", 7, EventType::Object);
        w.epc_list = vec![Epc::new("E1")];
        let mut root = event("r", 9, EventType::Object);
        root.epc_list = vec![Epc::new("E1")];
        let events = vec![x, w, root];

        let Lineage::LiveWalk(tree) = TracebackEngine::new(&events)
            .trace("E1", &TraceOptions::default())
            .unwrap()
        else {
            panic!("expected live walk");
        };
        assert_eq!(tree.root_node.children[0].event.id.as_str(), "w");
    }

    #[test]
    fn depth_truncated_leaf_is_not_an_origin() {
        let mut a = event("a", 1, EventType::Object);
        a.output_epc_list = vec![Epc::new("E1")];
        let mut b = event("b", 2, EventType::Object);
        b.epc_list = vec![Epc::new("E1")];
        let events = vec![a, b];

        let options = TraceOptions {
            max_depth: 0,
            ..TraceOptions::default()
        };
        let Lineage::LiveWalk(tree) = TracebackEngine::new(&events).trace("E1", &options).unwrap() else {
            panic!("expected live walk");
        };
        assert_eq!(tree.total_events, 1);
        assert!(tree.origin_events.is_empty());
    }

    #[test]
    fn rejects_depth_above_cap() {
        let events: Vec<Event> = vec![];
        let options = TraceOptions {
            max_depth: MAX_TRACE_DEPTH + 1,
            ..TraceOptions::default()
        };
        assert!(matches!(
            TracebackEngine::new(&events).trace("E1", &options),
            Err(TraceError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_empty_identifier() {
        let events: Vec<Event> = vec![];
        assert!(matches!(
            TracebackEngine::new(&events).trace("  ", &TraceOptions::default()),
            Err(TraceError::InvalidInput(_))
        ));
    }

    #[test]
    fn slice_store_has_no_index_fallback() {
        let mut a = event("a", 1, EventType::Object);
        a.epc_list = vec![Epc::new("E1")];
        let events = vec![a];
        let options = TraceOptions {
            deadline: Some(Duration::ZERO),
            ..TraceOptions::default()
        };
        assert!(matches!(
            TracebackEngine::new(&events).trace("E1", &options),
            Err(TraceError::Timeout(_))
        ));
    }

    #[test]
    fn lineage_serializes_with_source_tag() {
        let lineage = Lineage::Index(IndexedLineage {
            events: vec![],
            total_events: 0,
        });
        let value = serde_json::to_value(&lineage).unwrap();
        assert_eq!(value["source"], "index");
        assert_eq!(value["total_events"], 0);
    }
}
