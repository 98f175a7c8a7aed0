//! Audit chain commands.

use furrow_canonical::EntityType;
use furrow_core::AuditChain;

use crate::context::Context;
use crate::output;

pub fn verify(ctx: &Context, strict: bool, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = ctx.open_store_read_only()?;
    let chain = AuditChain::new(&store).with_grace(ctx.grace());
    let report = chain.verify_chain()?;

    if json_output {
        output::print_json(&report)?;
    } else {
        println!("Total blocks:   {}", report.total_blocks);
        println!("Valid blocks:   {}", report.valid_blocks);
        println!("Invalid blocks: {}", report.invalid_blocks);
        if !report.invalid.is_empty() {
            println!();
            println!("{:<12} {}", "BLOCK", "REASON");
            println!("{}", "-".repeat(50));
            for failure in &report.invalid {
                let reason = serde_json::to_value(failure.reason)?;
                println!(
                    "{:<12} {}",
                    failure.block_number,
                    reason["reason"].as_str().unwrap_or("?")
                );
            }
        }
    }

    if strict && !report.is_intact() {
        std::process::exit(1);
    }
    Ok(())
}

pub fn trail(
    ctx: &Context,
    entity_type: String,
    entity_id: String,
    json_output: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let entity_type =
        EntityType::parse(&entity_type).map_err(|e| format!("Invalid entity type: {}", e))?;
    let store = ctx.open_store_read_only()?;
    let blocks = AuditChain::new(&store).get_trail(&entity_type, &entity_id)?;

    if json_output {
        return output::print_json(&blocks);
    }

    println!("{:<8} {:<10} {:<20} {:<30} {}", "BLOCK", "ACTION", "CREATED_AT", "FIELDS", "REASON");
    println!("{}", "-".repeat(100));
    for block in &blocks {
        let fields: Vec<&str> = block.payload.changes.keys().map(String::as_str).collect();
        let action = serde_json::to_value(block.action_type)?;
        let reason = if block.payload.reason_missing() {
            "(no reason)"
        } else {
            block.payload.reason.as_str()
        };
        println!(
            "{:<8} {:<10} {:<20} {:<30} {}",
            block.block_number,
            action.as_str().unwrap_or("?"),
            block.created_at.format("%Y-%m-%dT%H:%M:%SZ"),
            output::truncate(&fields.join(","), 30),
            reason
        );
    }
    Ok(())
}
