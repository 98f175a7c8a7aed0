//! List command implementation.

use chrono::{DateTime, Utc};
use furrow_canonical::Epc;
use furrow_core::EventType;
use furrow_store::{select, AndFilter, EpcFilter, EventTypeFilter, TimeRangeFilter};

use crate::context::Context;
use crate::output;

fn parse_time(label: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>, Box<dyn std::error::Error>> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(&v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| Box::<dyn std::error::Error>::from(format!("Invalid --{} time {}: {}", label, v, e)))
        })
        .transpose()
}

pub fn run(
    ctx: &Context,
    epc: Option<String>,
    event_type: Option<String>,
    after: Option<String>,
    before: Option<String>,
    json_output: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut filter = AndFilter::default();
    if let Some(epc) = epc {
        filter = filter.with(EpcFilter {
            epc: Epc::parse(epc).map_err(|e| format!("Invalid EPC: {}", e))?,
        });
    }
    if let Some(name) = event_type {
        let event_type: EventType = serde_json::from_value(serde_json::Value::String(name.clone()))
            .map_err(|_| format!("Unknown event type: {}", name))?;
        filter = filter.with(EventTypeFilter { event_type });
    }
    let after = parse_time("after", after)?;
    let before = parse_time("before", before)?;
    if after.is_some() || before.is_some() {
        filter = filter.with(TimeRangeFilter { after, before });
    }

    let store = ctx.open_store_read_only()?;
    let events = select(&store, &filter)?;

    if json_output {
        output::print_json(&events)?;
    } else {
        output::print_event_header();
        for event in &events {
            println!("{}", output::format_event_row(event));
        }
        println!();
        println!("{} events", events.len());
    }
    Ok(())
}
