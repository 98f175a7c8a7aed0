//! Output formatting utilities.

use furrow_core::{Event, Finding, MassBalanceVerdict};
use serde::Serialize;

/// Pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn event_type_name(event: &Event) -> String {
    serde_json::to_value(event.event_type)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "?".to_string())
}

/// One event as a table row.
pub fn format_event_row(event: &Event) -> String {
    let epcs: Vec<&str> = event.all_epcs().map(|e| e.as_str()).collect();
    format!(
        "{:<44} {:<15} {:<20} {:<14} {}",
        truncate(event.id.as_str(), 44),
        event_type_name(event),
        event.event_time.format("%Y-%m-%dT%H:%M:%SZ"),
        truncate(event.biz_step.as_deref().unwrap_or("-"), 14),
        truncate(&epcs.join(","), 60)
    )
}

#[allow(clippy::print_literal)]
pub fn print_event_header() {
    println!(
        "{:<44} {:<15} {:<20} {:<14} {}",
        "EVENT_ID", "TYPE", "EVENT_TIME", "BIZ_STEP", "EPCS"
    );
    println!("{}", "-".repeat(120));
}

fn finding_line(finding: &Finding) -> String {
    let kind = serde_json::to_value(finding.kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    format!("  [{:?}] {}: {}", finding.severity, kind, finding.message)
}

/// Human-readable verdict.
pub fn print_verdict(verdict: &MassBalanceVerdict) {
    match verdict.conversion_factor {
        Some(factor) => println!("Conversion factor: {:.2}%", factor),
        None => println!("Conversion factor: undefined"),
    }
    if let Some(expected) = &verdict.expected {
        println!(
            "Expected:          {:.2}% ± {:.2} ({:?})",
            expected.expected_percent, expected.tolerance_percent, expected.source
        );
    }
    println!("Valid:             {}", verdict.valid);
    if !verdict.anomalies.is_empty() {
        println!("Anomalies:");
        for finding in &verdict.anomalies {
            println!("{}", finding_line(finding));
        }
    }
    if !verdict.warnings.is_empty() {
        println!("Warnings:");
        for finding in &verdict.warnings {
            println!("{}", finding_line(finding));
        }
    }
}

pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
