use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_clubd");
    let mut child = Command::new(exe)
        .env_remove("CLUBD_WORKSPACE")
        .env_remove("CLUBD_BASE_URL")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn clubd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn sprint_form(distance: f64, t10: f64, t30: f64) -> serde_json::Value {
    json!({
        "distance_meters": distance,
        "time_0_10_s": t10,
        "time_0_30_s": t30,
    })
}

#[test]
fn capture_submit_validates_saves_and_edits_in_place() {
    let workspace = temp_dir("clubd-capture-flow");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "athletes.import",
        json!({ "athletes": [{ "firstName": "Ana", "lastName": "Diaz" }] }),
    );
    let athlete = imported["athletes"][0].clone();
    let athlete_id = athlete["id"].as_i64().expect("athlete id");
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "evaluations.create",
        json!({ "name": "Preseason", "date": "2999-03-01", "location": "Field 2" }),
    );
    let evaluation_id = created["evaluation"]["id"].as_i64().expect("evaluation id");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "capture.open",
        json!({ "evaluationId": evaluation_id, "testType": "sprint" }),
    );
    let no_athlete = request(
        &mut stdin,
        &mut reader,
        "5",
        "capture.submit",
        json!({ "form": sprint_form(30.0, 1.8, 4.2) }),
    );
    assert_eq!(error_code(&no_athlete), "no_athlete_selected");

    let state = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "capture.selectAthlete",
        json!({ "athlete": athlete }),
    );
    assert_eq!(state["phase"], "ready");

    let stats_before = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "athletes.stats",
        json!({ "athleteId": athlete_id }),
    );
    assert_eq!(stats_before["test_count"], 0);

    let invalid = request(
        &mut stdin,
        &mut reader,
        "8",
        "capture.submit",
        json!({ "form": sprint_form(30.0, 4.2, 4.2) }),
    );
    assert_eq!(error_code(&invalid), "validation_failed");
    assert_eq!(
        invalid["error"]["details"]["fieldErrors"]["time_0_30_s"],
        "time_0_30_s must be greater than time_0_10_s"
    );
    assert_eq!(invalid["error"]["details"]["state"]["selectedAthlete"]["id"], athlete_id);

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "capture.submit",
        json!({ "form": sprint_form(30.0, 1.8, 4.2) }),
    );
    assert_eq!(saved["created"], true);
    assert_eq!(saved["message"], "Sprint test saved for Diaz, Ana");
    assert_eq!(saved["test"]["test_type"], "sprint");
    assert_eq!(saved["test"]["date"], "2999-03-01");
    let invalidated = saved["invalidated"].as_array().expect("invalidated");
    assert!(invalidated.contains(&json!(["tests-by-evaluation", evaluation_id])));
    assert!(invalidated.contains(&json!(["athlete-stats", athlete_id])));
    assert_eq!(saved["state"]["selectedAthlete"]["id"], athlete_id);
    assert_eq!(saved["state"]["testType"], "sprint");
    let test_id = saved["test"]["id"].as_i64().expect("test id");

    let stats_after = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "athletes.stats",
        json!({ "athleteId": athlete_id }),
    );
    assert_eq!(stats_after["test_count"], 1);
    assert_eq!(stats_after["by_type"]["sprint"], 1);

    let editing = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "capture.beginEdit",
        json!({ "testId": test_id }),
    );
    assert_eq!(editing["state"]["mode"]["kind"], "edit");
    let locked = request(
        &mut stdin,
        &mut reader,
        "12",
        "capture.setTestType",
        json!({ "testType": "yoyo" }),
    );
    assert_eq!(error_code(&locked), "edit_locked");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "capture.submit",
        json!({ "form": sprint_form(40.0, 1.9, 4.4) }),
    );
    assert_eq!(updated["created"], false);
    assert_eq!(updated["test"]["id"], test_id);
    assert_eq!(updated["state"]["mode"]["kind"], "create");

    let tests = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "evaluations.tests",
        json!({ "evaluationId": evaluation_id }),
    );
    let rows = tests["tests"].as_array().expect("tests");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["distance_meters"], 40.0);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn capture_validate_reports_field_errors_without_saving() {
    let workspace = temp_dir("clubd-capture-validate");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "athletes.import",
        json!({ "athletes": [{ "firstName": "Ben", "lastName": "Okafor" }] }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "evaluations.create",
        json!({ "name": "Midseason", "date": "2999-06-01" }),
    );
    let evaluation_id = created["evaluation"]["id"].as_i64().expect("evaluation id");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "capture.open",
        json!({ "evaluationId": evaluation_id, "testType": "endurance" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "capture.selectAthlete",
        json!({ "athlete": imported["athletes"][0] }),
    );

    let checked = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "capture.validate",
        json!({ "form": { "min_duration": "0", "total_distance_m": "abc" } }),
    );
    assert_eq!(checked["valid"], false);
    assert_eq!(checked["fieldErrors"]["min_duration"], "min_duration must be at least 1");
    assert_eq!(checked["fieldErrors"]["total_distance_m"], "total_distance_m must be a number");

    let ok = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "capture.validate",
        json!({ "form": { "min_duration": 12, "total_distance_m": 2800 } }),
    );
    assert_eq!(ok["valid"], true);
    assert_eq!(ok["payload"]["test_type"], "endurance");

    let tests = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "evaluations.tests",
        json!({ "evaluationId": evaluation_id }),
    );
    assert_eq!(tests["tests"].as_array().map(|a| a.len()), Some(0));

    drop(stdin);
    let _ = child.wait();
}
