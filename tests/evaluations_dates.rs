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

#[test]
fn evaluation_dates_are_checked_on_create_only() {
    let workspace = temp_dir("clubd-evaluation-dates");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let past = request(
        &mut stdin,
        &mut reader,
        "2",
        "evaluations.create",
        json!({ "name": "Old", "date": "2000-01-01" }),
    );
    assert_eq!(error_code(&past), "validation_failed");
    assert_eq!(
        past["error"]["details"]["fieldErrors"]["date"],
        "date cannot be in the past"
    );

    let missing = request(&mut stdin, &mut reader, "3", "evaluations.create", json!({}));
    assert_eq!(missing["error"]["details"]["fieldErrors"]["name"], "name is required");

    let listed = request_ok(&mut stdin, &mut reader, "4", "evaluations.list", json!({}));
    assert_eq!(listed["evaluations"].as_array().map(|a| a.len()), Some(0));

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "evaluations.create",
        json!({ "name": "Trials", "date": "2999-09-01", "time": "17:00" }),
    );
    assert_eq!(created["invalidated"], json!([["evaluations"]]));
    let evaluation_id = created["evaluation"]["id"].as_i64().expect("evaluation id");

    let listed = request_ok(&mut stdin, &mut reader, "6", "evaluations.list", json!({}));
    assert_eq!(listed["evaluations"].as_array().map(|a| a.len()), Some(1));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "evaluations.get",
        json!({ "evaluationId": evaluation_id }),
    );
    let moved = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "evaluations.update",
        json!({ "evaluationId": evaluation_id, "name": "Trials (archived)", "date": "2000-01-01" }),
    );
    assert_eq!(moved["evaluation"]["date"], "2000-01-01");

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "evaluations.get",
        json!({ "evaluationId": evaluation_id }),
    );
    assert_eq!(fetched["name"], "Trials (archived)");

    let missing = request(
        &mut stdin,
        &mut reader,
        "10",
        "evaluations.get",
        json!({ "evaluationId": 999 }),
    );
    assert_eq!(error_code(&missing), "not_found");

    drop(stdin);
    let _ = child.wait();
}
