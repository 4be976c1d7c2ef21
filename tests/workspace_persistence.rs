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
    let exe = env!("CARGO_BIN_EXE_bulletind");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn bulletind");
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
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> String {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "expected error: {}", value);
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn seed_class(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
) -> String {
    let class_id = request_ok(stdin, reader, "c", "classes.create", json!({ "name": "4ème B" }))
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();
    let roster = [
        ("Kaboré", "Issa", [("Mathématiques", 12.0, 4), ("Français", 14.0, 3)]),
        ("Zongo", "Mariam", [("Mathématiques", 17.5, 4), ("Français", 11.0, 3)]),
    ];
    for (i, (last, first, grades)) in roster.iter().enumerate() {
        let student_id = request_ok(
            stdin,
            reader,
            &format!("s-{}", i),
            "students.create",
            json!({ "classId": class_id, "lastName": last, "firstName": first }),
        )
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();
        for (j, (subject, value, coef)) in grades.iter().enumerate() {
            let _ = request_ok(
                stdin,
                reader,
                &format!("g-{}-{}", i, j),
                "grades.create",
                json!({
                    "studentId": student_id,
                    "subject": subject,
                    "value": value,
                    "coefficient": coef,
                    "type": "Devoir",
                    "date": "2026-03-12"
                }),
            );
        }
    }
    class_id
}

#[test]
fn workspace_survives_sidecar_restart() {
    let workspace = temp_dir("bulletind-persist-restart");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class_id = seed_class(&mut stdin, &mut reader);
    let before = request_ok(
        &mut stdin,
        &mut reader,
        "rank",
        "calc.overallRanking",
        json!({ "classId": class_id }),
    );
    drop(stdin);
    let _ = child.wait();
    assert!(workspace.join("workspace.json").is_file());

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let classes = request_ok(&mut stdin, &mut reader, "cl", "classes.list", json!({}));
    let listed = classes.get("classes").and_then(|v| v.as_array()).expect("classes");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].get("name").and_then(|v| v.as_str()), Some("4ème B"));

    let after = request_ok(
        &mut stdin,
        &mut reader,
        "rank2",
        "calc.overallRanking",
        json!({ "classId": class_id }),
    );
    assert_eq!(before, after);

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn exported_bundle_restores_identical_rankings() {
    let source = temp_dir("bulletind-persist-src");
    let target = temp_dir("bulletind-persist-dst");
    let bundle = source.join("export.bulletin.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": source.to_string_lossy() }),
    );
    let class_id = seed_class(&mut stdin, &mut reader);
    let before = request_ok(
        &mut stdin,
        &mut reader,
        "rank",
        "calc.overallRanking",
        json!({ "classId": class_id }),
    );

    let export = request_ok(
        &mut stdin,
        &mut reader,
        "exp",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(
        export.get("bundleFormat").and_then(|v| v.as_str()),
        Some("bulletin-workspace-v1")
    );
    assert_eq!(export.get("entryCount").and_then(|v| v.as_u64()), Some(3));
    assert!(bundle.is_file());

    let import = request_ok(
        &mut stdin,
        &mut reader,
        "imp",
        "backup.importWorkspaceBundle",
        json!({ "inPath": bundle.to_string_lossy(), "workspacePath": target.to_string_lossy() }),
    );
    assert_eq!(
        import.get("bundleFormatDetected").and_then(|v| v.as_str()),
        Some("bulletin-workspace-v1")
    );

    // Import switches the sidecar to the restored workspace.
    let health = request_ok(&mut stdin, &mut reader, "h", "health", json!({}));
    assert_eq!(
        health.get("workspacePath").and_then(|v| v.as_str()),
        Some(target.to_string_lossy().as_ref())
    );
    let after = request_ok(
        &mut stdin,
        &mut reader,
        "rank2",
        "calc.overallRanking",
        json!({ "classId": class_id }),
    );
    assert_eq!(before, after);

    let first = after
        .get("globalRankings")
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .expect("first entry");
    // Zongo: (17.5*4 + 11*3) / 7 beats Kaboré: (12*4 + 14*3) / 7.
    let expected = (17.5 * 4.0 + 11.0 * 3.0) / 7.0;
    let got = first.get("average").and_then(|v| v.as_f64()).expect("average");
    assert!((got - expected).abs() < 1e-9);

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(source);
    let _ = std::fs::remove_dir_all(target);
}

#[test]
fn importing_foreign_json_keeps_current_workspace() {
    let workspace = temp_dir("bulletind-persist-foreign");
    let foreign = temp_dir("bulletind-persist-foreign-src").join("autre.json");
    std::fs::write(&foreign, br#"{"foo":1}"#).expect("write foreign json");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class_id = seed_class(&mut stdin, &mut reader);
    let on_disk = std::fs::read(workspace.join("workspace.json")).expect("read document");

    let resp = request(
        &mut stdin,
        &mut reader,
        "imp",
        "backup.importWorkspaceBundle",
        json!({ "inPath": foreign.to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), "io_failed");
    assert_eq!(
        std::fs::read(workspace.join("workspace.json")).expect("read document"),
        on_disk
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let students = request_ok(
        &mut stdin,
        &mut reader,
        "st",
        "students.list",
        json!({ "classId": class_id }),
    );
    assert_eq!(
        students.get("students").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
    if let Some(dir) = foreign.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[test]
fn failed_write_leaves_no_phantom_records() {
    let workspace = temp_dir("bulletind-persist-failed-write");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    std::fs::remove_dir_all(&workspace).expect("remove workspace dir");

    let resp = request(
        &mut stdin,
        &mut reader,
        "c",
        "classes.create",
        json!({ "name": "Fantôme" }),
    );
    assert_eq!(error_code(&resp), "store_failed");

    let classes = request_ok(&mut stdin, &mut reader, "cl", "classes.list", json!({}));
    assert_eq!(
        classes.get("classes").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
}
