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

#[test]
fn export_then_import_into_a_fresh_workspace() {
    let source = temp_dir("schoolbook-backup-source");
    let target = temp_dir("schoolbook-backup-target");
    let backup_path = source.join("export.json");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": source.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "settings.update",
        json!({ "patch": { "schoolName": "Sunrise Academy" } }),
    );
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        json!({ "name": "JSS 1" }),
    );
    let class_id = class["classId"].as_str().expect("classId").to_string();
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({
            "admissionNo": "SB/001",
            "firstName": "Ada",
            "lastName": "Obi",
            "gender": "Female",
            "classId": class_id,
        }),
    );
    let student_id = student["studentId"].as_str().expect("studentId").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "fees.create",
        json!({ "name": "Tuition", "amount": 5000 }),
    );

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "backup.export",
        json!({ "outPath": backup_path.to_string_lossy() }),
    );
    assert_eq!(exported["format"], "schoolbook-backup-v1");
    assert_eq!(exported["counts"]["students"], 1);
    assert_eq!(exported["counts"]["classes"], 1);
    assert!(exported["checksum"].as_str().expect("checksum").len() == 64);

    // The document on disk carries the collections as top-level keys.
    let text = std::fs::read_to_string(&backup_path).expect("read backup");
    let doc: serde_json::Value = serde_json::from_str(&text).expect("parse backup");
    assert_eq!(doc["format"], "schoolbook-backup-v1");
    assert_eq!(doc["settings"]["schoolName"], "Sunrise Academy");
    assert_eq!(doc["students"].as_array().expect("students").len(), 1);

    // Import into a completely different workspace.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "workspace.select",
        json!({ "path": target.to_string_lossy() }),
    );
    let empty = request_ok(&mut stdin, &mut reader, "8", "students.list", json!({}));
    assert!(empty["students"].as_array().expect("students").is_empty());

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "backup.import",
        json!({ "inPath": backup_path.to_string_lossy() }),
    );
    assert_eq!(imported["imported"], true);
    assert_eq!(imported["counts"]["students"], 1);

    let restored = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.get",
        json!({ "studentId": student_id }),
    );
    assert_eq!(restored["student"]["admissionNo"], "SB/001");
    assert_eq!(restored["student"]["className"], "JSS 1");
    let settings = request_ok(&mut stdin, &mut reader, "11", "settings.get", json!({}));
    assert_eq!(settings["settings"]["schoolName"], "Sunrise Academy");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(source);
    let _ = std::fs::remove_dir_all(target);
}

#[test]
fn import_survives_a_restart() {
    let workspace = temp_dir("schoolbook-backup-restart");
    let backup_path = workspace.join("export.json");

    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar();
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "2",
            "teachers.create",
            json!({ "name": "Mr. Bello" }),
        );
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "3",
            "backup.export",
            json!({ "outPath": backup_path.to_string_lossy() }),
        );
        // Mutate after the export, then restore the snapshot.
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "4",
            "teachers.create",
            json!({ "name": "Ms. Eze" }),
        );
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "5",
            "backup.import",
            json!({ "inPath": backup_path.to_string_lossy() }),
        );
        drop(stdin);
        let _ = child.wait();
    }

    // A fresh process over the same workspace sees the restored snapshot,
    // not the post-export mutation.
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let teachers = request_ok(&mut stdin, &mut reader, "2", "teachers.list", json!({}));
    let rows = teachers["teachers"].as_array().expect("teachers");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "Mr. Bello");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn import_rejections_leave_state_untouched() {
    let workspace = temp_dir("schoolbook-backup-rejections");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "staff.create",
        json!({ "name": "Mrs. Audu", "role": "Bursar" }),
    );

    let missing = request(
        &mut stdin,
        &mut reader,
        "3",
        "backup.import",
        json!({ "inPath": workspace.join("nope.json").to_string_lossy() }),
    );
    assert_eq!(error_code(&missing), "io_failed");

    let garbled = workspace.join("garbled.json");
    std::fs::write(&garbled, "{ not json").expect("write garbled");
    let parse = request(
        &mut stdin,
        &mut reader,
        "4",
        "backup.import",
        json!({ "inPath": garbled.to_string_lossy() }),
    );
    assert_eq!(error_code(&parse), "backup_parse_failed");

    let wrong_shape = workspace.join("shape.json");
    std::fs::write(&wrong_shape, r#"{ "settings": {} }"#).expect("write shape");
    let shape = request(
        &mut stdin,
        &mut reader,
        "5",
        "backup.import",
        json!({ "inPath": wrong_shape.to_string_lossy() }),
    );
    assert_eq!(error_code(&shape), "backup_shape_invalid");

    // The staff record created before the failed imports is still there.
    let staff = request_ok(&mut stdin, &mut reader, "6", "staff.list", json!({}));
    assert_eq!(staff["staff"].as_array().expect("staff").len(), 1);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
