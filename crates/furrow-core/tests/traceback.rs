use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use furrow_canonical::{Epc, EventId, QuantityItem};
use furrow_core::{
    BackendError, Event, EventQuery, EventType, Lineage, SourceType, TraceError, TraceNode,
    TraceOptions, TraceTree, TracebackEngine,
};
use proptest::prelude::*;
use serde_json::Map;

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
}

fn epcs(list: &[&str]) -> Vec<Epc> {
    list.iter().map(|s| Epc::new(*s)).collect()
}

fn blank(id: &str, hour: u32, event_type: EventType) -> Event {
    Event {
        id: EventId::new(id),
        event_type,
        action: None,
        event_time: at(hour),
        recorded_at: None,
        biz_step: None,
        disposition: None,
        epc_list: vec![],
        input_epc_list: vec![],
        output_epc_list: vec![],
        quantity_list: vec![],
        input_quantity_list: vec![],
        output_quantity_list: vec![],
        read_point: Some("urn:epc:id:sgln:0614141.00001.0".into()),
        biz_location: Some("urn:epc:id:sgln:0614141.00002.0".into()),
        source_type: SourceType::Manual,
        metadata: Map::new(),
    }
}

fn object(id: &str, hour: u32, epc_list: &[&str], output: &[&str]) -> Event {
    let mut e = blank(id, hour, EventType::Object);
    e.epc_list = epcs(epc_list);
    e.output_epc_list = epcs(output);
    e
}

fn transformation(id: &str, hour: u32, inputs: &[&str], outputs: &[&str]) -> Event {
    let mut e = blank(id, hour, EventType::Transformation);
    e.input_epc_list = epcs(inputs);
    e.output_epc_list = epcs(outputs);
    e.input_quantity_list = vec![QuantityItem::new(100.0, "kg")];
    e.output_quantity_list = vec![QuantityItem::new(85.0, "kg")];
    e
}

fn scenario_a() -> Vec<Event> {
    vec![
        object("harvest", 1, &[], &["E1"]),
        transformation("roast", 2, &["E1"], &["E2"]),
        object("ship", 3, &["E2"], &[]),
    ]
}

fn live(lineage: Lineage) -> TraceTree {
    match lineage {
        Lineage::LiveWalk(tree) => tree,
        Lineage::Index(_) => panic!("expected live walk"),
    }
}

fn node_ids(node: &TraceNode) -> Vec<String> {
    node.iter().map(|n| n.event.id.to_string()).collect()
}

fn assert_causal(node: &TraceNode) {
    for child in &node.children {
        assert!(
            child.event.event_time < node.event.event_time,
            "{} is not earlier than {}",
            child.event.id,
            node.event.id
        );
        assert_eq!(child.depth, node.depth + 1);
        assert_causal(child);
    }
}

#[test]
fn scenario_a_harvest_transform_ship() {
    let events = scenario_a();
    let tree = live(
        TracebackEngine::new(&events)
            .trace("E2", &TraceOptions::default())
            .unwrap(),
    );

    assert_eq!(tree.root_node.event.id.as_str(), "ship");
    assert_eq!(node_ids(&tree.root_node), vec!["ship", "roast", "harvest"]);
    assert_eq!(tree.total_events, 3);
    assert_eq!(tree.max_depth_reached, 2);
    assert_eq!(tree.origin_events, vec![EventId::new("harvest")]);
    assert_causal(&tree.root_node);
}

#[test]
fn repeated_traces_are_identical() {
    let events = scenario_a();
    let engine = TracebackEngine::new(&events);
    let first = engine.trace("E2", &TraceOptions::default()).unwrap();
    let second = engine.trace("E2", &TraceOptions::default()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn depth_bound_limits_expansion() {
    let events: Vec<Event> = (1..=5)
        .map(|h| object(&format!("obs-{}", h), h, &["E1"], &[]))
        .collect();
    let engine = TracebackEngine::new(&events);

    let options = TraceOptions {
        max_depth: 2,
        ..TraceOptions::default()
    };
    let tree = live(engine.trace("E1", &options).unwrap());
    assert_eq!(tree.max_depth_reached, 2);
    assert_eq!(tree.total_events, 3);
    assert!(tree.origin_events.is_empty());

    let seed_only = TraceOptions {
        max_depth: 0,
        ..TraceOptions::default()
    };
    let tree = live(engine.trace("E1", &seed_only).unwrap());
    assert_eq!(node_ids(&tree.root_node), vec!["obs-5"]);
    assert!(tree.root_node.children.is_empty());
}

#[test]
fn transformation_fans_in_per_input() {
    let events = vec![
        object("farm-a", 1, &[], &["BEANS-A"]),
        object("farm-b", 1, &[], &["BEANS-B"]),
        transformation("blend", 3, &["BEANS-A", "BEANS-B"], &["BLEND-1"]),
    ];
    let tree = live(
        TracebackEngine::new(&events)
            .trace("BLEND-1", &TraceOptions::default())
            .unwrap(),
    );
    let children: Vec<&str> = tree
        .root_node
        .children
        .iter()
        .map(|c| c.event.id.as_str())
        .collect();
    assert_eq!(children, vec!["farm-a", "farm-b"]);
    assert_eq!(
        tree.origin_events,
        vec![EventId::new("farm-a"), EventId::new("farm-b")]
    );
}

#[test]
fn shared_ancestor_is_visited_once() {
    let events = vec![
        object("a", 1, &[], &["E1"]),
        object("b", 2, &["E1"], &[]),
        object("d", 2, &["E1"], &["E2"]),
        object("c", 3, &["E1", "E2"], &[]),
    ];
    let tree = live(
        TracebackEngine::new(&events)
            .trace("E2", &TraceOptions::default())
            .unwrap(),
    );
    let ids = node_ids(&tree.root_node);
    assert_eq!(ids, vec!["c", "b", "a", "d"]);
    assert_eq!(tree.total_events, 4);
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());
}

#[test]
fn unknown_identifier_is_not_found() {
    let events = scenario_a();
    assert!(matches!(
        TracebackEngine::new(&events).trace("E404", &TraceOptions::default()),
        Err(TraceError::NotFound(_))
    ));
}

#[test]
fn location_can_be_stripped() {
    let events = scenario_a();
    let options = TraceOptions {
        include_location: false,
        ..TraceOptions::default()
    };
    let tree = live(TracebackEngine::new(&events).trace("E2", &options).unwrap());
    assert!(tree
        .root_node
        .iter()
        .all(|n| n.event.read_point.is_none() && n.event.biz_location.is_none()));
}

/// Event list with a hand-built lineage index and an optional broken range query.
struct IndexedEvents {
    events: Vec<Event>,
    index: HashMap<Epc, Vec<EventId>>,
    range_fails: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("range scan unavailable")]
struct RangeScanDown;

impl EventQuery for IndexedEvents {
    fn events_carrying(&self, epc: &Epc) -> Result<Vec<Event>, BackendError> {
        self.events.events_carrying(epc)
    }

    fn events_between(
        &self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>, BackendError> {
        if self.range_fails {
            return Err(BackendError::new(RangeScanDown));
        }
        self.events.events_between(after, before)
    }

    fn event(&self, id: &EventId) -> Result<Option<Event>, BackendError> {
        self.events.event(id)
    }

    fn lineage_index(&self, epc: &Epc) -> Result<Option<Vec<Event>>, BackendError> {
        let Some(ids) = self.index.get(epc) else {
            return Ok(Some(vec![]));
        };
        Ok(Some(
            self.events
                .iter()
                .filter(|e| ids.contains(&e.id))
                .cloned()
                .collect(),
        ))
    }
}

fn indexed(range_fails: bool) -> IndexedEvents {
    let mut index = HashMap::new();
    index.insert(
        Epc::new("E2"),
        vec![
            EventId::new("harvest"),
            EventId::new("roast"),
            EventId::new("ship"),
        ],
    );
    IndexedEvents {
        events: scenario_a(),
        index,
        range_fails,
    }
}

#[test]
fn timeout_falls_back_to_index() {
    let store = indexed(false);
    let options = TraceOptions {
        deadline: Some(Duration::ZERO),
        ..TraceOptions::default()
    };
    match TracebackEngine::new(&store).trace("E2", &options).unwrap() {
        Lineage::Index(flat) => {
            assert_eq!(flat.total_events, 3);
            let ids: Vec<&str> = flat.events.iter().map(|e| e.id.as_str()).collect();
            assert_eq!(ids, vec!["ship", "roast", "harvest"]);
        }
        Lineage::LiveWalk(_) => panic!("expected index fallback"),
    }
}

#[test]
fn backend_failure_falls_back_to_index() {
    let store = indexed(true);
    let lineage = TracebackEngine::new(&store)
        .trace("E2", &TraceOptions::default())
        .unwrap();
    assert!(matches!(lineage, Lineage::Index(_)));
    let value = serde_json::to_value(&lineage).unwrap();
    assert_eq!(value["source"], "index");
}

#[test]
fn not_found_does_not_fall_back() {
    let store = indexed(false);
    assert!(matches!(
        TracebackEngine::new(&store).trace("E404", &TraceOptions::default()),
        Err(TraceError::NotFound(_))
    ));
}

const POOL: [&str; 5] = ["E0", "E1", "E2", "E3", "E4"];

fn arb_event(index: usize) -> impl Strategy<Value = Event> {
    (
        0u32..12,
        any::<bool>(),
        proptest::sample::subsequence(POOL.to_vec(), 0..3),
        proptest::sample::subsequence(POOL.to_vec(), 1..3),
    )
        .prop_map(move |(hour, is_transformation, first, second)| {
            let id = format!("ev-{:02}", index);
            if is_transformation && !first.is_empty() {
                transformation(&id, hour, &first, &second)
            } else {
                object(&id, hour, &second, &first)
            }
        })
}

fn arb_events() -> impl Strategy<Value = Vec<Event>> {
    (1usize..16).prop_flat_map(|n| (0..n).map(arb_event).collect::<Vec<_>>())
}

proptest! {
    #[test]
    fn every_edge_points_back_in_time(events in arb_events(), pick in 0usize..5) {
        let engine = TracebackEngine::new(&events);
        match engine.trace(POOL[pick], &TraceOptions::default()) {
            Ok(Lineage::LiveWalk(tree)) => {
                assert_causal(&tree.root_node);
                let ids = node_ids(&tree.root_node);
                let unique: HashSet<_> = ids.iter().collect();
                prop_assert_eq!(unique.len(), ids.len());
                prop_assert_eq!(tree.total_events, ids.len());
            }
            Ok(Lineage::Index(_)) => prop_assert!(false, "slice store has no index"),
            Err(TraceError::NotFound(_)) => {}
            Err(other) => prop_assert!(false, "unexpected error {}", other),
        }
    }
}
