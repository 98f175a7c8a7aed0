//! Standalone mass-balance check.

use furrow_core::MassBalanceRequest;

use crate::context::{read_input, Context};
use crate::output;

pub fn run(ctx: &Context, input: String, strict: bool, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let text = read_input(&input)?;
    let request: MassBalanceRequest =
        serde_json::from_str(&text).map_err(|e| format!("Invalid mass-balance request: {}", e))?;
    let verdict = ctx.validator()?.validate(&request)?;

    if json_output {
        output::print_json(&verdict)?;
    } else {
        output::print_verdict(&verdict);
    }

    if strict && !verdict.valid {
        std::process::exit(1);
    }
    Ok(())
}
