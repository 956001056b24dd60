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
    let exe = env!("CARGO_BIN_EXE_schoolbookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoolbookd");
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
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
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
        "expected ok for {}: {}",
        method,
        value
    );
    value.get("result").cloned().expect("result")
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn set_period(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    session: &str,
    term: &str,
) {
    let _ = request_ok(
        stdin,
        reader,
        id,
        "settings.update",
        json!({ "patch": { "currentSession": session, "currentTerm": term } }),
    );
}

#[test]
fn period_change_rescopes_list_methods() {
    let workspace = temp_dir("schoolbook-period-gating");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    set_period(&mut stdin, &mut reader, "2", "2024/2025", "First Term");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "fees.create",
        json!({ "name": "Old Tuition", "amount": 3000 }),
    );

    // Move to another session and term; the old fee drops out of the
    // default-scoped list.
    set_period(&mut stdin, &mut reader, "4", "2025/2026", "Second Term");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "fees.create",
        json!({ "name": "New Tuition", "amount": 4000 }),
    );

    let current = request_ok(&mut stdin, &mut reader, "6", "fees.list", json!({}));
    let fees = current["fees"].as_array().expect("fees");
    assert_eq!(fees.len(), 1);
    assert_eq!(fees[0]["name"], "New Tuition");
    assert_eq!(fees[0]["session"], "2025/2026");
    assert_eq!(fees[0]["term"], "Second Term");

    // An explicit period reads back the earlier records.
    let old = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "fees.list",
        json!({ "session": "2024/2025", "term": "First Term" }),
    );
    assert_eq!(old["fees"].as_array().expect("fees").len(), 1);
    assert_eq!(old["fees"][0]["name"], "Old Tuition");

    // "ALL" lifts the filters, case-insensitively.
    let everything = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "fees.list",
        json!({ "session": "all", "term": "ALL" }),
    );
    assert_eq!(everything["fees"].as_array().expect("fees").len(), 2);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn writes_require_a_concrete_period() {
    let workspace = temp_dir("schoolbook-period-writes");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let all_session = request(
        &mut stdin,
        &mut reader,
        "2",
        "fees.create",
        json!({ "name": "Tuition", "amount": 1000, "session": "ALL" }),
    );
    assert_eq!(error_code(&all_session), "bad_params");

    let all_term = request(
        &mut stdin,
        &mut reader,
        "3",
        "expenses.create",
        json!({ "amount": 100, "remark": "Chalk", "term": "ALL" }),
    );
    assert_eq!(error_code(&all_term), "bad_params");

    // An explicit concrete period on a write sticks to the record even when
    // it is not the current one.
    let fee = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "fees.create",
        json!({
            "name": "Back Fee",
            "amount": 500,
            "session": "2023/2024",
            "term": "Third Term",
        }),
    );
    assert_eq!(fee["fee"]["session"], "2023/2024");
    assert_eq!(fee["fee"]["term"], "Third Term");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn settings_update_validates_and_rejects_atomically() {
    let workspace = temp_dir("schoolbook-settings-validation");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "settings.update",
        json!({
            "patch": {
                "schoolName": "Sunrise Academy",
                "motto": "Knowledge and Light",
                "currentTerm": "second term",
                "nextTermBegins": "2026-01-05",
            }
        }),
    );
    assert_eq!(updated["settings"]["schoolName"], "Sunrise Academy");
    // Term names are canonicalized from any casing.
    assert_eq!(updated["settings"]["currentTerm"], "Second Term");
    assert_eq!(updated["settings"]["nextTermBegins"], "2026-01-05");

    // A patch with one bad field is rejected whole.
    let bad = request(
        &mut stdin,
        &mut reader,
        "3",
        "settings.update",
        json!({
            "patch": {
                "schoolName": "Should Not Stick",
                "currentSession": "2025-2026",
            }
        }),
    );
    assert_eq!(error_code(&bad), "bad_params");
    let after = request_ok(&mut stdin, &mut reader, "4", "settings.get", json!({}));
    assert_eq!(after["settings"]["schoolName"], "Sunrise Academy");

    let bad_session = request(
        &mut stdin,
        &mut reader,
        "5",
        "settings.update",
        json!({ "patch": { "currentSession": "2025/2027" } }),
    );
    assert_eq!(error_code(&bad_session), "bad_params");

    let unknown_key = request(
        &mut stdin,
        &mut reader,
        "6",
        "settings.update",
        json!({ "patch": { "themeColor": "blue" } }),
    );
    assert_eq!(error_code(&unknown_key), "bad_params");

    let empty_subjects = request(
        &mut stdin,
        &mut reader,
        "7",
        "settings.update",
        json!({ "patch": { "subjects": [] } }),
    );
    assert_eq!(error_code(&empty_subjects), "bad_params");

    // Clearing nullable fields works with explicit null.
    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "settings.update",
        json!({ "patch": { "nextTermBegins": null, "logo": null } }),
    );
    assert!(cleared["settings"]["nextTermBegins"].is_null());
    assert!(cleared["settings"]["logo"].is_null());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
