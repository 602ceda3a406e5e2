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
    let exe = env!("CARGO_BIN_EXE_ldtrackd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn ldtrackd");
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

fn scope() -> serde_json::Value {
    json!({ "managerId": "m1", "batchId": "b1" })
}

fn with_scope(mut extra: serde_json::Value) -> serde_json::Value {
    let base = scope();
    let obj = extra.as_object_mut().expect("params object");
    for (k, v) in base.as_object().expect("scope object") {
        obj.insert(k.clone(), v.clone());
    }
    extra
}

fn subjects(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
) -> Vec<serde_json::Value> {
    request_ok(stdin, reader, id, "subjects.list", scope())
        .get("subjects")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("subjects array")
}

fn combined_rows(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
) -> Vec<serde_json::Value> {
    request_ok(stdin, reader, id, "scores.combined", scope())
        .get("rows")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("rows array")
}

#[test]
fn score_update_with_total_registers_subject_exactly_once() {
    let workspace = temp_dir("ldtrack-subjects-once");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "interns.create",
        with_scope(json!({ "empId": "E1", "name": "Asha", "email": "asha@example.com" })),
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "scores.update",
        with_scope(json!({ "empId": "E1", "subject": "Quiz1", "score": 8, "totalMarks": 10 })),
    );
    // Same subject again with a new total: replaced, not duplicated.
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "scores.update",
        with_scope(json!({ "empId": "E1", "subject": "Quiz1", "score": 9, "totalMarks": 20 })),
    );

    let listed = subjects(&mut stdin, &mut reader, "5");
    let quiz: Vec<_> = listed
        .iter()
        .filter(|s| s.get("name").and_then(|v| v.as_str()) == Some("Quiz1"))
        .collect();
    assert_eq!(quiz.len(), 1, "subject duplicated: {:?}", listed);
    assert_eq!(quiz[0].get("total_marks").and_then(|v| v.as_i64()), Some(20));

    let rows = combined_rows(&mut stdin, &mut reader, "6");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("empId").and_then(|v| v.as_str()), Some("E1"));
    assert_eq!(rows[0].get("Quiz1").and_then(|v| v.as_f64()), Some(9.0));
}

#[test]
fn rename_rewrites_every_score_record_and_preserves_values() {
    let workspace = temp_dir("ldtrack-subjects-rename");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    for (i, emp) in ["E1", "E2", "E3"].iter().enumerate() {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("i{}", i),
            "interns.create",
            with_scope(json!({
                "empId": emp,
                "name": format!("Intern {}", emp),
                "email": format!("{}@example.com", emp.to_lowercase())
            })),
        );
    }
    request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "scores.update",
        with_scope(json!({ "empId": "E1", "subject": "Math", "score": 35, "totalMarks": 40 })),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "s2",
        "scores.update",
        with_scope(json!({ "empId": "E2", "subject": "Math", "score": 12 })),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "s3",
        "scores.update",
        with_scope(json!({ "empId": "E2", "subject": "Chem", "score": 7, "totalMarks": 100 })),
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "subjects.update",
        with_scope(json!({ "oldName": "Math", "newName": "Mathematics" })),
    );

    let listed = subjects(&mut stdin, &mut reader, "l1");
    assert!(
        listed
            .iter()
            .all(|s| s.get("name").and_then(|v| v.as_str()) != Some("Math")),
        "old name still present: {:?}",
        listed
    );
    let renamed: Vec<_> = listed
        .iter()
        .filter(|s| s.get("name").and_then(|v| v.as_str()) == Some("Mathematics"))
        .collect();
    assert_eq!(renamed.len(), 1);
    // Rename without resize keeps the stored total.
    assert_eq!(
        renamed[0].get("total_marks").and_then(|v| v.as_i64()),
        Some(40)
    );

    let rows = combined_rows(&mut stdin, &mut reader, "c1");
    let by_emp = |emp: &str| {
        rows.iter()
            .find(|r| r.get("empId").and_then(|v| v.as_str()) == Some(emp))
            .cloned()
            .expect("row")
    };
    let e1 = by_emp("E1");
    assert!(e1.get("Math").is_none());
    assert_eq!(e1.get("Mathematics").and_then(|v| v.as_f64()), Some(35.0));
    let e2 = by_emp("E2");
    assert_eq!(e2.get("Mathematics").and_then(|v| v.as_f64()), Some(12.0));
    assert_eq!(e2.get("Chem").and_then(|v| v.as_f64()), Some(7.0));
    // Intern without a score record still appears, bio only.
    let e3 = by_emp("E3");
    assert!(e3.get("Mathematics").is_none());
    assert!(e3.get("Chem").is_none());

    // Renaming a name that does not exist succeeds silently.
    request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "subjects.update",
        with_scope(json!({ "oldName": "History", "newName": "Hist" })),
    );
    assert_eq!(subjects(&mut stdin, &mut reader, "l2").len(), 2);
}

#[test]
fn delete_subject_is_idempotent_and_unsets_scores() {
    let workspace = temp_dir("ldtrack-subjects-delete");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    for emp in ["E1", "E2"] {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("i-{}", emp),
            "interns.create",
            with_scope(json!({
                "empId": emp,
                "name": emp,
                "email": format!("{}@example.com", emp.to_lowercase())
            })),
        );
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("s-{}", emp),
            "scores.update",
            with_scope(json!({ "empId": emp, "subject": "Math", "score": 10, "totalMarks": 40 })),
        );
    }
    request_ok(
        &mut stdin,
        &mut reader,
        "s-extra",
        "scores.update",
        with_scope(json!({ "empId": "E1", "subject": "Chem", "score": 5, "totalMarks": 50 })),
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "d1",
        "subjects.delete",
        with_scope(json!({ "subject": "Math" })),
    );
    // Second delete of the same name is a no-op, not an error.
    request_ok(
        &mut stdin,
        &mut reader,
        "d2",
        "subjects.delete",
        with_scope(json!({ "subject": "Math" })),
    );

    let listed = subjects(&mut stdin, &mut reader, "l1");
    assert_eq!(listed.len(), 1);
    assert_eq!(
        listed[0].get("name").and_then(|v| v.as_str()),
        Some("Chem")
    );

    let rows = combined_rows(&mut stdin, &mut reader, "c1");
    for row in &rows {
        assert!(row.get("Math").is_none(), "Math survived: {}", row);
    }
    let e1 = rows
        .iter()
        .find(|r| r.get("empId").and_then(|v| v.as_str()) == Some("E1"))
        .expect("E1 row");
    assert_eq!(e1.get("Chem").and_then(|v| v.as_f64()), Some(5.0));
}

#[test]
fn resize_without_rename_updates_total_only() {
    let workspace = temp_dir("ldtrack-subjects-resize");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "interns.create",
        with_scope(json!({ "empId": "E1", "name": "Asha", "email": "asha@example.com" })),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "scores.update",
        with_scope(json!({ "empId": "E1", "subject": "Lab", "score": 18, "totalMarks": 20 })),
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.update",
        with_scope(json!({ "oldName": "Lab", "totalMarks": 25 })),
    );

    let listed = subjects(&mut stdin, &mut reader, "5");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].get("name").and_then(|v| v.as_str()), Some("Lab"));
    assert_eq!(
        listed[0].get("total_marks").and_then(|v| v.as_i64()),
        Some(25)
    );
    // Scores untouched by a resize.
    let rows = combined_rows(&mut stdin, &mut reader, "6");
    assert_eq!(rows[0].get("Lab").and_then(|v| v.as_f64()), Some(18.0));
}
