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
    let exe = env!("CARGO_BIN_EXE_attendd");
    let mut child = Command::new(exe)
        .env_remove("ATTENDD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn send(
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
    let value = send(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = send(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().unwrap_or_else(|| json!({}))
}

fn open_with_students(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
    ids: &[&str],
) {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let students: Vec<serde_json::Value> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            json!({
                "id": id,
                "name": format!("Student {}", id),
                "rollNumber": format!("R{}", i + 1),
                "seatRow": i / 8,
                "seatColumn": i % 8
            })
        })
        .collect();
    let _ = request_ok(
        stdin,
        reader,
        "seed",
        "students.bulkCreate",
        json!({ "students": students }),
    );
}

#[test]
fn marking_same_key_twice_keeps_one_record() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_with_students(&mut stdin, &mut reader, "attendd-mark-upsert", &["s1"]);

    let params = json!({
        "studentId": "s1",
        "date": "2024-03-05",
        "period": "1",
        "status": "present",
        "timeRange": { "startTime": "09:00", "endTime": "11:00" },
        "hours": 99
    });
    let first = request_ok(&mut stdin, &mut reader, "1", "attendance.mark", params.clone());
    assert_eq!(first["mark"]["hours"].as_f64(), Some(2.0));
    let _ = request_ok(&mut stdin, &mut reader, "2", "attendance.mark", params);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.mark",
        json!({
            "studentId": "s1",
            "date": "2024-03-05",
            "period": "1",
            "status": "present",
            "timeRange": { "startTime": "09:00", "endTime": "09:45" }
        }),
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.list",
        json!({ "date": "2024-03-05" }),
    );
    let records = listed["records"].as_array().cloned().unwrap_or_default();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["hours"].as_f64(), Some(0.8));
    assert_eq!(records[0]["timeRange"]["endTime"].as_str(), Some("09:45"));
    assert_eq!(records[0]["student"]["rollNumber"].as_str(), Some("R1"));
}

#[test]
fn absent_and_negative_ranges() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_with_students(&mut stdin, &mut reader, "attendd-mark-absent", &["s1", "s2"]);

    let absent = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.mark",
        json!({
            "studentId": "s1",
            "date": "2024-03-05",
            "period": "2",
            "status": "absent",
            "timeRange": { "startTime": "09:00", "endTime": "11:00" }
        }),
    );
    assert!(absent["mark"]["timeRange"].is_null());
    assert_eq!(absent["mark"]["hours"].as_f64(), Some(0.0));

    let backwards = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.mark",
        json!({
            "studentId": "s2",
            "date": "2024-03-05",
            "period": "2",
            "status": "present",
            "timeRange": { "startTime": "11:00", "endTime": "09:00" }
        }),
    );
    assert_eq!(backwards["mark"]["hours"].as_f64(), Some(-2.0));
}

#[test]
fn invalid_writes_are_rejected_with_codes() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_with_students(&mut stdin, &mut reader, "attendd-mark-invalid", &["s1"]);

    let cases = [
        (
            json!({ "studentId": "s1", "date": "2024-03-05", "period": "1" }),
            "missing_field",
        ),
        (
            json!({ "studentId": "s1", "period": "1", "status": "present" }),
            "missing_field",
        ),
        (
            json!({ "studentId": "s1", "date": "2024-03-05", "period": "1", "status": "present",
                    "timeRange": { "startTime": "9 o'clock", "endTime": "11:00" } }),
            "invalid_time_format",
        ),
        (
            json!({ "studentId": "s1", "date": "2024-02-30", "period": "1", "status": "present" }),
            "invalid_date",
        ),
        (
            json!({ "studentId": "s1", "date": "2024-03-05", "period": "all", "status": "present" }),
            "invalid_period",
        ),
        (
            json!({ "studentId": "s1", "date": "2024-03-05", "period": "1", "status": "late" }),
            "invalid_status",
        ),
        (
            json!({ "studentId": "ghost", "date": "2024-03-05", "period": "1", "status": "present" }),
            "not_found",
        ),
    ];
    for (i, (params, code)) in cases.into_iter().enumerate() {
        let e = request_err(&mut stdin, &mut reader, &format!("c{}", i), "attendance.mark", params);
        assert_eq!(e["code"].as_str(), Some(code), "case {}: {}", i, e);
    }

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "after",
        "attendance.list",
        json!({ "date": "2024-03-05" }),
    );
    assert_eq!(listed["records"].as_array().map(|a| a.len()), Some(0));
}

#[test]
fn list_filters_by_period_and_all_is_wildcard() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_with_students(&mut stdin, &mut reader, "attendd-mark-list", &["s1", "s2"]);

    for (i, (sid, period)) in [("s1", "1"), ("s2", "1"), ("s1", "3")].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("m{}", i),
            "attendance.mark",
            json!({
                "studentId": sid,
                "date": "2024-03-05",
                "period": period,
                "status": "present",
                "timeRange": { "startTime": "10:00", "endTime": "11:00" }
            }),
        );
    }

    let p1 = request_ok(
        &mut stdin,
        &mut reader,
        "p1",
        "attendance.list",
        json!({ "date": "2024-03-05", "period": "1" }),
    );
    assert_eq!(p1["records"].as_array().map(|a| a.len()), Some(2));

    let all = request_ok(
        &mut stdin,
        &mut reader,
        "all",
        "attendance.list",
        json!({ "date": "2024-03-05", "period": "all" }),
    );
    assert_eq!(all["records"].as_array().map(|a| a.len()), Some(3));

    let view = request_ok(
        &mut stdin,
        &mut reader,
        "view",
        "attendance.dayView",
        json!({ "date": "2024-03-05" }),
    );
    assert_eq!(view["periods"]["1"]["s2"]["hours"].as_f64(), Some(1.0));
    assert_eq!(view["periods"]["3"]["s1"]["status"].as_str(), Some("present"));
    assert!(view["periods"].get("2").is_none());
}

#[test]
fn reads_and_writes_report_missing_date_alike() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_with_students(&mut stdin, &mut reader, "attendd-mark-missing-date", &["s1"]);

    let methods = [
        "attendance.mark",
        "attendance.bulkMark",
        "attendance.list",
        "attendance.dayView",
        "attendance.daySummary",
        "attendance.weekSummary",
        "attendance.reconcile",
    ];
    for (i, method) in methods.iter().enumerate() {
        let e = request_err(
            &mut stdin,
            &mut reader,
            &format!("d{}", i),
            method,
            json!({ "studentId": "s1", "period": "1", "status": "present", "studentsStatus": {} }),
        );
        assert_eq!(e["code"].as_str(), Some("missing_field"), "{}: {}", method, e);
        assert_eq!(e["details"]["field"].as_str(), Some("date"), "{}: {}", method, e);
    }
}

#[test]
fn half_range_with_malformed_start_is_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_with_students(&mut stdin, &mut reader, "attendd-mark-half-range", &["s1"]);

    let e = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.mark",
        json!({
            "studentId": "s1",
            "date": "2024-03-05",
            "period": "1",
            "status": "present",
            "timeRange": { "startTime": "garbage" }
        }),
    );
    assert_eq!(e["code"].as_str(), Some("invalid_time_format"));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.list",
        json!({ "date": "2024-03-05" }),
    );
    assert_eq!(listed["records"].as_array().map(|a| a.len()), Some(0));
}
