//! Integration tests for CLI commands.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::{json, Value};
use tempfile::TempDir;

const ROASTED: &str = "urn:epc:class:lgtin:4012345.099999.ROAST-1";

fn furrow(journal: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_furrow"))
        .arg("--journal")
        .arg(journal)
        .args(args)
        .env_remove("FURROW_FACTORS")
        .env_remove("FURROW_GRACE_SECS")
        .env("FURROW_LOG", "off")
        .output()
        .expect("failed to run furrow")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({}): {}",
            e,
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

fn write_json(dir: &TempDir, name: &str, value: Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, serde_json::to_vec_pretty(&value).unwrap()).unwrap();
    path
}

struct Fixture {
    dir: TempDir,
    journal: PathBuf,
    transformation_id: String,
}

fn recorded(output_kg: f64) -> Fixture {
    let dir = TempDir::new().unwrap();
    let journal = dir.path().join("furrow.frj");

    let harvest = write_json(
        &dir,
        "harvest.json",
        json!({
            "event_type": "object",
            "action": "add",
            "event_time": "2024-05-01T06:00:00Z",
            "biz_step": "harvesting",
            "output_epc_list": ["urn:epc:class:lgtin:4012345.012345.LOT-A"],
            "read_point": "urn:epc:id:sgln:4012345.00001.0"
        }),
    );
    let roast = write_json(
        &dir,
        "roast.json",
        json!({
            "event_type": "transformation",
            "event_time": "2024-05-02T10:00:00Z",
            "input_epc_list": ["urn:epc:class:lgtin:4012345.012345.LOT-A"],
            "output_epc_list": [ROASTED],
            "input_quantity_list": [{"value": 100, "unit_of_measure": "kg"}],
            "output_quantity_list": [{"value": output_kg, "unit_of_measure": "kg"}]
        }),
    );
    let ship = write_json(
        &dir,
        "ship.json",
        json!({
            "event_type": "object",
            "action": "observe",
            "event_time": "2024-05-03T15:00:00Z",
            "biz_step": "shipping",
            "epc_list": [ROASTED]
        }),
    );

    let out = furrow(&journal, &["record", harvest.to_str().unwrap(), "--reason", "field log"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let out = furrow(
        &journal,
        &[
            "record",
            roast.to_str().unwrap(),
            "--reason",
            "roastery",
            "--product-type",
            "raw_coffee_to_roasted",
            "--json",
        ],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let transformation_id = stdout_json(&out)["event_id"].as_str().unwrap().to_string();

    let out = furrow(&journal, &["record", ship.to_str().unwrap(), "--reason", "dispatch"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    Fixture {
        dir,
        journal,
        transformation_id,
    }
}

#[test]
fn record_reports_the_mass_balance_verdict() {
    let dir = TempDir::new().unwrap();
    let journal = dir.path().join("furrow.frj");
    let roast = write_json(
        &dir,
        "roast.json",
        json!({
            "event_type": "transformation",
            "event_time": "2024-05-02T10:00:00Z",
            "input_quantity_list": [{"value": 100, "unit_of_measure": "kg"}],
            "output_quantity_list": [{"value": 90, "unit_of_measure": "kg"}]
        }),
    );
    let out = furrow(
        &journal,
        &["record", roast.to_str().unwrap(), "--product-type", "raw_coffee_to_roasted", "--json"],
    );
    assert!(out.status.success());
    let body = stdout_json(&out);
    assert_eq!(body["block_number"], 1);
    assert_eq!(body["mass_balance"]["valid"], false);
    assert_eq!(body["mass_balance"]["anomalies"][0]["kind"], "over_yield");
}

#[test]
fn trace_walks_back_to_the_harvest() {
    let fx = recorded(85.0);
    let out = furrow(&fx.journal, &["trace", ROASTED, "--json"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let body = stdout_json(&out);
    assert_eq!(body["source"], "live_walk");
    assert_eq!(body["total_events"], 3);
    assert_eq!(body["max_depth_reached"], 2);
    assert_eq!(body["root_node"]["event"]["biz_step"], "shipping");
    assert_eq!(
        body["root_node"]["children"][0]["event"]["id"],
        fx.transformation_id.as_str()
    );
}

#[test]
fn trace_without_location_strips_read_points() {
    let fx = recorded(85.0);
    let out = furrow(&fx.journal, &["trace", ROASTED, "--no-location", "--json"]);
    let body = stdout_json(&out);
    let harvest = &body["root_node"]["children"][0]["children"][0]["event"];
    assert_eq!(harvest["biz_step"], "harvesting");
    assert!(harvest.get("read_point").is_none());
}

#[test]
fn trace_of_unknown_epc_is_not_found() {
    let fx = recorded(85.0);
    let out = furrow(&fx.journal, &["trace", "urn:epc:id:sgtin:0.0.0", "--json"]);
    assert!(!out.status.success());
    assert_eq!(stdout_json(&out)["error"], "not_found");
}

#[test]
fn trace_rejects_excessive_depth() {
    let fx = recorded(85.0);
    let out = furrow(&fx.journal, &["trace", ROASTED, "--max-depth", "65"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("max_depth"));
}

#[test]
fn balance_checks_a_standalone_request() {
    let dir = TempDir::new().unwrap();
    let request = write_json(
        &dir,
        "request.json",
        json!({
            "input_quantities": [{"value": 100, "unit_of_measure": "kg"}],
            "output_quantities": [{"value": 150, "unit_of_measure": "kg"}],
            "custom_conversion_factor": 100,
            "tolerance": 5
        }),
    );
    let journal = dir.path().join("unused.frj");

    let out = furrow(&journal, &["balance", request.to_str().unwrap(), "--json"]);
    assert!(out.status.success());
    let verdict = stdout_json(&out);
    assert_eq!(verdict["valid"], false);
    assert_eq!(verdict["conversion_factor"], 150.0);

    let strict = furrow(&journal, &["balance", request.to_str().unwrap(), "--strict"]);
    assert_eq!(strict.status.code(), Some(1));
}

#[test]
fn custom_factor_table_is_loaded() {
    let dir = TempDir::new().unwrap();
    let factors = write_json(
        &dir,
        "factors.json",
        json!([{
            "product_key": "raw_coffee_to_roasted",
            "input_unit": "mass",
            "output_unit": "mass",
            "expected_factor_percent": 90,
            "tolerance_percent": 2
        }]),
    );
    let request = write_json(
        &dir,
        "request.json",
        json!({
            "input_quantities": [{"value": 100, "unit_of_measure": "kg"}],
            "output_quantities": [{"value": 90, "unit_of_measure": "kg"}],
            "product_type": "raw_coffee_to_roasted"
        }),
    );
    let journal = dir.path().join("unused.frj");
    let out = furrow(
        &journal,
        &["--factors", factors.to_str().unwrap(), "balance", request.to_str().unwrap(), "--json"],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(stdout_json(&out)["valid"], true);
}

#[test]
fn audit_verify_reports_an_intact_chain() {
    let fx = recorded(85.0);
    let out = furrow(&fx.journal, &["audit", "verify", "--strict", "--json"]);
    assert!(out.status.success());
    let report = stdout_json(&out);
    assert_eq!(report["total_blocks"], 3);
    assert_eq!(report["valid_blocks"], 3);
    assert_eq!(report["invalid"], json!([]));
}

#[test]
fn audit_verify_detects_a_rewritten_reason() {
    let fx = recorded(85.0);
    let mut bytes = fs::read(&fx.journal).unwrap();
    let needle = b"\"reason\":\"dispatch\"";
    let at = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("reason not found in journal");
    bytes[at + needle.len() - 2] = b'X';
    fs::write(&fx.journal, bytes).unwrap();

    let out = furrow(&fx.journal, &["audit", "verify", "--json"]);
    assert!(out.status.success());
    let report = stdout_json(&out);
    assert_eq!(report["invalid_blocks"], 1);
    assert_eq!(report["invalid"][0]["block_number"], 3);
    assert_eq!(report["invalid"][0]["reason"], "hash_mismatch");

    let strict = furrow(&fx.journal, &["audit", "verify", "--strict"]);
    assert_eq!(strict.status.code(), Some(1));
}

#[test]
fn annotate_appends_an_annotation_block() {
    let fx = recorded(90.0);
    let out = furrow(
        &fx.journal,
        &["annotate", &fx.transformation_id, "--reason", "recheck", "--json"],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(stdout_json(&out)["block_number"], 4);

    let out = furrow(&fx.journal, &["audit", "trail", "event", &fx.transformation_id, "--json"]);
    let trail = stdout_json(&out);
    assert_eq!(trail.as_array().unwrap().len(), 2);
    assert_eq!(trail[1]["action_type"], "annotate");
    assert!(trail[1]["payload"]["changes"]["metadata.mass_balance"].is_object());
}

#[test]
fn list_filters_by_type_and_time() {
    let fx = recorded(85.0);
    let out = furrow(&fx.journal, &["list", "--type", "transformation", "--json"]);
    let events = stdout_json(&out);
    assert_eq!(events.as_array().unwrap().len(), 1);

    let out = furrow(
        &fx.journal,
        &["list", "--epc", ROASTED, "--after", "2024-05-03T00:00:00Z", "--json"],
    );
    let events = stdout_json(&out);
    assert_eq!(events.as_array().unwrap().len(), 1);
    assert_eq!(events[0]["biz_step"], "shipping");

    let bad = furrow(&fx.journal, &["list", "--type", "teleport"]);
    assert!(!bad.status.success());
    drop(fx.dir);
}

#[test]
fn trace_text_output_describes_the_epc() {
    let fx = recorded(85.0);
    let out = furrow(&fx.journal, &["trace", ROASTED]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("(lot 4012345.099999 #ROAST-1)"), "{}", text);
    assert!(text.contains("Events:      3"));
}

#[test]
fn audit_verify_of_missing_journal_fails_without_creating_it() {
    let dir = TempDir::new().unwrap();
    let journal = dir.path().join("typo.frj");
    let out = furrow(&journal, &["audit", "verify", "--strict", "--json"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Failed to read journal"));
    assert!(!journal.exists());

    let out = furrow(&journal, &["list"]);
    assert!(!out.status.success());
    assert!(!journal.exists());
}

#[test]
fn read_commands_leave_a_torn_journal_untouched() {
    let fx = recorded(85.0);
    let len = fs::metadata(&fx.journal).unwrap().len();
    fs::OpenOptions::new()
        .write(true)
        .open(&fx.journal)
        .unwrap()
        .set_len(len - 3)
        .unwrap();

    let out = furrow(&fx.journal, &["audit", "verify", "--json"]);
    assert!(out.status.success());
    assert_eq!(stdout_json(&out)["total_blocks"], 2);
    let out = furrow(&fx.journal, &["trace", ROASTED, "--json"]);
    assert!(out.status.success());

    assert_eq!(fs::metadata(&fx.journal).unwrap().len(), len - 3);
}
