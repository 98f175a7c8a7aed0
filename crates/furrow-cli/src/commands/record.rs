//! Record command implementation.

use furrow_canonical::ProductKey;
use furrow_core::{Event, MassBalanceRecord, RecordOptions, Recorder};
use serde_json::json;

use crate::context::{read_input, Context};
use crate::output;

pub struct Params {
    pub reason: String,
    pub product_type: Option<String>,
    pub custom_factor: Option<f64>,
    pub tolerance: Option<f64>,
}

pub fn run(ctx: &Context, input: String, params: Params, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let text = read_input(&input)?;
    let event: Event = serde_json::from_str(&text).map_err(|e| format!("Invalid event JSON: {}", e))?;

    let product_type = params
        .product_type
        .map(|p| ProductKey::parse(&p))
        .transpose()
        .map_err(|e| format!("Invalid product type: {}", e))?;
    let options = RecordOptions {
        product_type,
        custom_factor: params.custom_factor,
        tolerance: params.tolerance,
        reason: params.reason,
    };

    let store = ctx.open_store()?;
    let recorder = Recorder::new(&store, ctx.validator()?);
    let recorded = recorder.record_event(event, &options)?;
    let verdict = MassBalanceRecord::from_event(&recorded.event);

    if json_output {
        output::print_json(&json!({
            "event_id": recorded.event.id,
            "block_number": recorded.block.block_number,
            "mass_balance": verdict.map(|r| r.verdict),
        }))?;
    } else {
        println!("Recorded {}", recorded.event.id);
        println!("Audit block #{}", recorded.block.block_number);
        if let Some(record) = verdict {
            output::print_verdict(&record.verdict);
        }
    }
    Ok(())
}
