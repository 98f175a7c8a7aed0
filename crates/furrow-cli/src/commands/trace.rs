//! Trace command implementation.

use std::time::Duration;

use furrow_canonical::Epc;
use furrow_core::{Lineage, TraceError, TraceNode, TraceOptions, TracebackEngine};
use serde_json::json;

use crate::context::Context;
use crate::output;

pub fn run(
    ctx: &Context,
    epc: String,
    max_depth: u32,
    include_location: bool,
    deadline_ms: Option<u64>,
    json_output: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = ctx.open_store_read_only()?;
    let options = TraceOptions {
        max_depth,
        include_location,
        deadline: deadline_ms.map(Duration::from_millis),
    };

    let lineage = match TracebackEngine::new(&store).trace(&epc, &options) {
        Ok(lineage) => lineage,
        Err(TraceError::NotFound(_)) if json_output => {
            output::print_json(&json!({"error": "not_found", "identifier": epc}))?;
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    if json_output {
        return output::print_json(&lineage);
    }

    let fields = Epc::new(epc.as_str()).describe();
    let kind = serde_json::to_value(fields.kind)?;
    match (&fields.company_prefix, &fields.reference, &fields.serial) {
        (Some(prefix), Some(reference), serial) => println!(
            "{} ({} {}.{}{})",
            epc,
            kind.as_str().unwrap_or("?"),
            prefix,
            reference,
            serial.as_deref().map(|s| format!(" #{}", s)).unwrap_or_default()
        ),
        _ => println!("{} ({})", epc, kind.as_str().unwrap_or("?")),
    }
    println!();

    match &lineage {
        Lineage::LiveWalk(tree) => {
            print_node(&tree.root_node);
            println!();
            println!("Events:      {}", tree.total_events);
            println!("Max depth:   {}", tree.max_depth_reached);
            let origins: Vec<&str> = tree.origin_events.iter().map(|id| id.as_str()).collect();
            println!("Origins:     {}", origins.join(", "));
        }
        Lineage::Index(flat) => {
            println!("Live walk unavailable; lineage index ({} events):", flat.total_events);
            output::print_event_header();
            for event in &flat.events {
                println!("{}", output::format_event_row(event));
            }
        }
    }
    Ok(())
}

fn print_node(node: &TraceNode) {
    let event = &node.event;
    let location = event
        .biz_location
        .as_deref()
        .or(event.read_point.as_deref())
        .map(|l| format!(" @ {}", l))
        .unwrap_or_default();
    println!(
        "{}{} {} {} {}{}",
        "  ".repeat(node.depth as usize),
        event.event_time.format("%Y-%m-%dT%H:%M:%SZ"),
        output::event_type_name(event),
        event.biz_step.as_deref().unwrap_or("-"),
        output::truncate(event.id.as_str(), 16),
        location
    );
    for child in &node.children {
        print_node(child);
    }
}
