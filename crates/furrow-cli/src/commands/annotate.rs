//! Annotate command: re-run mass balance for a stored transformation.

use furrow_canonical::EventId;
use furrow_core::{MassBalanceRecord, Recorder};
use serde_json::json;

use crate::context::Context;
use crate::output;

pub fn run(ctx: &Context, event_id: String, reason: String, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let event_id = EventId::parse(&event_id).map_err(|e| format!("Invalid event id: {}", e))?;
    let store = ctx.open_store()?;
    let recorder = Recorder::new(&store, ctx.validator()?);
    let recorded = recorder.revalidate(&event_id, &reason)?;
    let record = MassBalanceRecord::from_event(&recorded.event);

    if json_output {
        output::print_json(&json!({
            "event_id": recorded.event.id,
            "block_number": recorded.block.block_number,
            "mass_balance": record.map(|r| r.verdict),
        }))?;
    } else {
        println!("Annotated {}", recorded.event.id);
        println!("Audit block #{}", recorded.block.block_number);
        if let Some(record) = record {
            output::print_verdict(&record.verdict);
        }
    }
    Ok(())
}
