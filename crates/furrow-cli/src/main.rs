//! Furrow CLI - record, trace and audit supply-chain events.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod context;
mod output;

use commands::{annotate, audit, balance, list, record, trace};
use context::Context;

#[derive(Parser)]
#[command(name = "furrow")]
#[command(about = "Supply-chain provenance: traceback, mass balance and audit chain")]
#[command(version)]
struct Cli {
    /// Journal file holding events and audit blocks
    #[arg(long, global = true, env = "FURROW_JOURNAL", default_value = "furrow.frj")]
    journal: PathBuf,
    /// Conversion factor table (JSON array); built-in table when omitted
    #[arg(long, global = true, env = "FURROW_FACTORS")]
    factors: Option<PathBuf>,
    /// Seconds an unsealed trailing audit block is treated as in flight
    #[arg(long, global = true, env = "FURROW_GRACE_SECS", default_value_t = furrow_core::DEFAULT_GRACE_SECS)]
    grace_secs: i64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record an event read from a JSON file ("-" for stdin)
    Record {
        /// Event JSON file
        input: String,
        /// Reason stored in the audit block
        #[arg(long, default_value = "")]
        reason: String,
        /// Conversion table key for transformations
        #[arg(long)]
        product_type: Option<String>,
        /// Expected conversion factor in percent, overriding the table
        #[arg(long)]
        custom_factor: Option<f64>,
        /// Tolerance in percentage points, overriding the table
        #[arg(long)]
        tolerance: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Re-run mass balance for a stored transformation
    Annotate {
        /// Event id
        event_id: String,
        /// Reason stored in the audit block
        #[arg(long, default_value = "")]
        reason: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Trace an EPC back to its origins
    Trace {
        /// EPC or lot identifier
        epc: String,
        /// Levels to walk back (max 64)
        #[arg(long, default_value_t = furrow_core::DEFAULT_MAX_DEPTH)]
        max_depth: u32,
        /// Strip read point and business location
        #[arg(long)]
        no_location: bool,
        /// Give up on the live walk after N milliseconds and use the lineage index
        #[arg(long)]
        deadline_ms: Option<u64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a standalone mass-balance request
    Balance {
        /// Request JSON file ("-" for stdin)
        input: String,
        /// Exit with error code if the verdict is invalid
        #[arg(long)]
        strict: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Audit chain operations
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
    /// List stored events
    List {
        /// Only events mentioning this EPC
        #[arg(long)]
        epc: Option<String>,
        /// Only events of this type (object, aggregation, transaction, transformation)
        #[arg(long = "type")]
        event_type: Option<String>,
        /// Only events at or after this RFC 3339 time
        #[arg(long)]
        after: Option<String>,
        /// Only events at or before this RFC 3339 time
        #[arg(long)]
        before: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum AuditCommands {
    /// Verify every block of the chain
    Verify {
        /// Exit with error code if any block fails
        #[arg(long)]
        strict: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the audit trail of one entity
    Trail {
        /// Entity type, e.g. "event"
        entity_type: String,
        /// Entity id
        entity_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("FURROW_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let ctx = Context::new(cli.journal, cli.factors, cli.grace_secs);
    let result = match cli.command {
        Commands::Record {
            input,
            reason,
            product_type,
            custom_factor,
            tolerance,
            json,
        } => record::run(
            &ctx,
            input,
            record::Params {
                reason,
                product_type,
                custom_factor,
                tolerance,
            },
            json,
        ),
        Commands::Annotate {
            event_id,
            reason,
            json,
        } => annotate::run(&ctx, event_id, reason, json),
        Commands::Trace {
            epc,
            max_depth,
            no_location,
            deadline_ms,
            json,
        } => trace::run(&ctx, epc, max_depth, !no_location, deadline_ms, json),
        Commands::Balance {
            input,
            strict,
            json,
        } => balance::run(&ctx, input, strict, json),
        Commands::Audit { command } => match command {
            AuditCommands::Verify { strict, json } => audit::verify(&ctx, strict, json),
            AuditCommands::Trail {
                entity_type,
                entity_id,
                json,
            } => audit::trail(&ctx, entity_type, entity_id, json),
        },
        Commands::List {
            epc,
            event_type,
            after,
            before,
            json,
        } => list::run(&ctx, epc, event_type, after, before, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
