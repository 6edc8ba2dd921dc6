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
    let exe = env!("CARGO_BIN_EXE_recordsd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn recordsd");
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
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn grade_scale_defaults_update_and_drive_gpa() {
    let workspace = temp_dir("recordsd-grade-scale");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let defaults = request_ok(&mut stdin, &mut reader, "2", "settings.get", json!({}));
    let bands = defaults
        .pointer("/grading/bands")
        .and_then(|v| v.as_array())
        .expect("bands");
    let pairs: Vec<(f64, u64)> = bands
        .iter()
        .map(|b| {
            (
                b.get("minScore").and_then(|v| v.as_f64()).expect("minScore"),
                b.get("points").and_then(|v| v.as_u64()).expect("points"),
            )
        })
        .collect();
    assert_eq!(
        pairs,
        vec![(70.0, 5), (60.0, 4), (50.0, 3), (45.0, 2), (40.0, 1)]
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "c1",
        "courses.create",
        json!({
            "code": "CSC101",
            "title": "Introduction to Computing",
            "level": 100,
            "units": 2,
            "department": "Computer Science",
            "semester": "First"
        }),
    );
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "students.create",
        json!({
            "name": "Tunde Bakare",
            "matricNumber": "CSC/2023/077",
            "department": "Computer Science",
            "sessionYear": "2023-2024"
        }),
    );
    let student_id = student
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();

    let before = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "results.save",
        json!({ "studentId": student_id, "scores": { "CSC101": 42 } }),
    );
    assert_eq!(before.pointer("/summary/totalPoints").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(before.pointer("/summary/failedCourses"), Some(&json!([])));

    // Stricter scale: anything under 45 fails.
    let strict = json!({
        "bands": [
            { "minScore": 70, "points": 5 },
            { "minScore": 60, "points": 4 },
            { "minScore": 50, "points": 3 },
            { "minScore": 45, "points": 2 }
        ]
    });
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "u1",
        "settings.update",
        json!({ "grading": strict }),
    );

    let after = request_ok(
        &mut stdin,
        &mut reader,
        "g1",
        "results.get",
        json!({ "studentId": student_id }),
    );
    assert_eq!(after.pointer("/levels/0/summary/totalPoints").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(
        after.pointer("/levels/0/summary/failedCourses"),
        Some(&json!(["CSC101"]))
    );

    let unordered = request(
        &mut stdin,
        &mut reader,
        "u2",
        "settings.update",
        json!({ "grading": { "bands": [
            { "minScore": 40, "points": 1 },
            { "minScore": 70, "points": 5 }
        ] } }),
    );
    assert_eq!(error_code(&unordered), Some("bad_params"));

    let empty = request(
        &mut stdin,
        &mut reader,
        "u3",
        "settings.update",
        json!({ "grading": { "bands": [] } }),
    );
    assert_eq!(error_code(&empty), Some("bad_params"));

    let still_strict = request_ok(&mut stdin, &mut reader, "g2", "settings.get", json!({}));
    assert_eq!(
        still_strict
            .pointer("/grading/bands")
            .and_then(|v| v.as_array())
            .map(|b| b.len()),
        Some(4)
    );

    drop(stdin);
    let _ = child.wait();

    // A fresh process on the same workspace sees the saved scale.
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let reopened = request_ok(&mut stdin, &mut reader, "2", "settings.get", json!({}));
    assert_eq!(reopened.get("grading"), still_strict.get("grading"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
