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

fn create_course(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    code: &str,
    level: u16,
    units: u32,
) {
    let _ = request_ok(
        stdin,
        reader,
        id,
        "courses.create",
        json!({
            "code": code,
            "title": format!("{code} course"),
            "level": level,
            "units": units,
            "department": "Computer Science",
            "semester": "First"
        }),
    );
}

#[test]
fn promotion_accumulates_carry_over_and_stops_at_final_level() {
    let workspace = temp_dir("recordsd-promotion");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    create_course(&mut stdin, &mut reader, "c1", "CSC101", 100, 3);
    create_course(&mut stdin, &mut reader, "c2", "CSC102", 100, 4);
    create_course(&mut stdin, &mut reader, "c3", "CSC201", 200, 2);

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "students.create",
        json!({
            "name": "Emeka Nwosu",
            "matricNumber": "CSC/2023/020",
            "department": "Computer Science",
            "sessionYear": "2023-2024"
        }),
    );
    let student_id = student
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "results.save",
        json!({ "studentId": student_id, "scores": { "CSC101": 30, "CSC102": 55 } }),
    );

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "p1",
        "students.promote",
        json!({ "studentId": student_id }),
    );
    assert_eq!(first.get("fromLevel").and_then(|v| v.as_u64()), Some(100));
    assert_eq!(first.get("failedCourses"), Some(&json!(["CSC101"])));
    assert_eq!(first.pointer("/student/level").and_then(|v| v.as_u64()), Some(200));
    assert_eq!(
        first.pointer("/student/carryOverCourses"),
        Some(&json!(["CSC101"]))
    );
    assert_eq!(first.pointer("/student/carryOver").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(first.pointer("/student/totalTNU").and_then(|v| v.as_u64()), Some(7));
    assert_eq!(first.pointer("/student/totalTCP").and_then(|v| v.as_u64()), Some(12));
    assert!(first.pointer("/student/results/200").map(|v| v.is_object()).unwrap_or(false));
    assert_eq!(
        first.pointer("/student/results/100/CSC101").and_then(|v| v.as_f64()),
        Some(30.0)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "results.save",
        json!({ "studentId": student_id, "scores": { "CSC201": 20 } }),
    );

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "p2",
        "students.promote",
        json!({ "studentId": student_id }),
    );
    assert_eq!(second.pointer("/student/level").and_then(|v| v.as_u64()), Some(300));
    assert_eq!(
        second.pointer("/student/carryOverCourses"),
        Some(&json!(["CSC101", "CSC201"]))
    );
    assert_eq!(second.pointer("/student/totalTNU").and_then(|v| v.as_u64()), Some(9));
    assert_eq!(second.pointer("/student/totalTCP").and_then(|v| v.as_u64()), Some(12));

    // Nothing failed at 300, but earlier carry-overs keep the flag set.
    let clean = request_ok(
        &mut stdin,
        &mut reader,
        "r3",
        "results.save",
        json!({ "studentId": student_id, "scores": {} }),
    );
    assert_eq!(clean.pointer("/summary/failedCourses"), Some(&json!([])));
    assert_eq!(clean.get("carryOver").and_then(|v| v.as_bool()), Some(true));

    // Stored state matches what promote returned.
    let stored = request_ok(
        &mut stdin,
        &mut reader,
        "g1",
        "results.get",
        json!({ "studentId": student_id }),
    );
    let levels: Vec<u64> = stored
        .get("levels")
        .and_then(|v| v.as_array())
        .expect("levels")
        .iter()
        .filter_map(|l| l.get("level").and_then(|v| v.as_u64()))
        .collect();
    assert_eq!(levels, vec![100, 200, 300]);
    assert_eq!(
        stored.get("carryOverCourses"),
        Some(&json!(["CSC101", "CSC201"]))
    );

    let third = request_ok(
        &mut stdin,
        &mut reader,
        "p3",
        "students.promote",
        json!({ "studentId": student_id }),
    );
    assert_eq!(third.pointer("/student/level").and_then(|v| v.as_u64()), Some(400));
    assert_eq!(third.get("failedCourses"), Some(&json!([])));

    let rejected = request(
        &mut stdin,
        &mut reader,
        "p4",
        "students.promote",
        json!({ "studentId": student_id }),
    );
    assert_eq!(rejected.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(error_code(&rejected), Some("final_level"));

    let after = request_ok(
        &mut stdin,
        &mut reader,
        "g2",
        "students.get",
        json!({ "studentId": student_id }),
    );
    assert_eq!(after.pointer("/student/level").and_then(|v| v.as_u64()), Some(400));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn students_update_refuses_promotion_fields() {
    let workspace = temp_dir("recordsd-promotion-locked");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "students.create",
        json!({
            "name": "Ngozi Uche",
            "matricNumber": "CSC/2023/021",
            "department": "Computer Science",
            "sessionYear": "2023-2024"
        }),
    );
    let student_id = student
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();

    let locked = request(
        &mut stdin,
        &mut reader,
        "u1",
        "students.update",
        json!({ "studentId": student_id, "level": 300 }),
    );
    assert_eq!(error_code(&locked), Some("bad_params"));

    let dup = request(
        &mut stdin,
        &mut reader,
        "s2",
        "students.create",
        json!({
            "name": "Someone Else",
            "matricNumber": "CSC/2023/021",
            "department": "Computer Science",
            "sessionYear": "2023-2024"
        }),
    );
    assert_eq!(error_code(&dup), Some("conflict"));

    let missing = request(
        &mut stdin,
        &mut reader,
        "p1",
        "students.promote",
        json!({ "studentId": "nobody" }),
    );
    assert_eq!(error_code(&missing), Some("not_found"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
