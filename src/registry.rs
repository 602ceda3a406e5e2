//! Per-batch subject registry and score-key reconciliation.
//!
//! The registry row holds a JSON array that historically mixed bare name
//! strings with {name, total_marks} objects. Every read path normalizes to
//! the object form exactly once, here; nothing downstream branches on the
//! representation. Registry writes that rename or delete a subject also
//! rewrite the matching key in every score record of the batch. Those
//! rewrites are sequential per-row updates, not a transaction: a failure
//! midway leaves the remaining rows on the old key.

use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::{Map, Value};

pub const DEFAULT_TOTAL_MARKS: i64 = 100;

/// Canonical registry entry after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subject {
    pub name: String,
    pub total_marks: i64,
}

impl Subject {
    pub fn to_value(&self) -> Value {
        serde_json::json!({ "name": self.name, "total_marks": self.total_marks })
    }
}

/// Name of a stored entry in either representation.
pub fn entry_name(entry: &Value) -> Option<&str> {
    match entry {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("name").and_then(|v| v.as_str()),
        _ => None,
    }
}

/// Normalize one stored entry; entries of neither form are dropped.
pub fn normalize_entry(entry: &Value) -> Option<Subject> {
    match entry {
        Value::String(s) => Some(Subject {
            name: s.clone(),
            total_marks: DEFAULT_TOTAL_MARKS,
        }),
        Value::Object(map) => {
            let name = map.get("name").and_then(|v| v.as_str())?.to_string();
            let total_marks = map
                .get("total_marks")
                .and_then(|v| v.as_i64())
                .unwrap_or(DEFAULT_TOTAL_MARKS);
            Some(Subject { name, total_marks })
        }
        _ => None,
    }
}

/// Normalize a raw entry list, preserving order.
pub fn normalize_list(raw: &[Value]) -> Vec<Subject> {
    raw.iter().filter_map(normalize_entry).collect()
}

fn load_raw(conn: &Connection, manager_id: &str, batch_id: &str) -> anyhow::Result<Vec<Value>> {
    let text: Option<String> = conn
        .query_row(
            "SELECT entries FROM subject_registry WHERE manager_id = ? AND batch_id = ?",
            (manager_id, batch_id),
            |r| r.get(0),
        )
        .optional()?;
    let Some(text) = text else {
        return Ok(Vec::new());
    };
    let value: Value = serde_json::from_str(&text).context("registry entries are invalid JSON")?;
    Ok(value.as_array().cloned().unwrap_or_default())
}

fn save_raw(
    conn: &Connection,
    manager_id: &str,
    batch_id: &str,
    entries: &[Value],
) -> anyhow::Result<()> {
    let text = serde_json::to_string(entries)?;
    conn.execute(
        "INSERT INTO subject_registry(manager_id, batch_id, entries)
         VALUES(?, ?, ?)
         ON CONFLICT(manager_id, batch_id) DO UPDATE SET entries = excluded.entries",
        (manager_id, batch_id, &text),
    )?;
    Ok(())
}

fn save_subjects(
    conn: &Connection,
    manager_id: &str,
    batch_id: &str,
    subjects: &[Subject],
) -> anyhow::Result<()> {
    let entries: Vec<Value> = subjects.iter().map(Subject::to_value).collect();
    save_raw(conn, manager_id, batch_id, &entries)
}

/// Ordered, normalized subject list for a batch; empty if no registry row.
pub fn list(conn: &Connection, manager_id: &str, batch_id: &str) -> anyhow::Result<Vec<Subject>> {
    Ok(normalize_list(&load_raw(conn, manager_id, batch_id)?))
}

/// Ensure the registry holds exactly one entry named `name` with the given
/// total. An existing entry of either representation is replaced in place;
/// a missing one is appended. The whole list is written back normalized, so
/// the registry can never hold the same name twice in differing forms.
pub fn ensure_subject(
    conn: &Connection,
    manager_id: &str,
    batch_id: &str,
    name: &str,
    total_marks: i64,
) -> anyhow::Result<()> {
    let raw = load_raw(conn, manager_id, batch_id)?;
    let mut subjects = Vec::with_capacity(raw.len() + 1);
    let mut found = false;
    for entry in &raw {
        let Some(mut subject) = normalize_entry(entry) else {
            continue;
        };
        if subject.name == name {
            if found {
                // Collapse duplicates left behind by older writers.
                continue;
            }
            found = true;
            subject.total_marks = total_marks;
        }
        subjects.push(subject);
    }
    if !found {
        subjects.push(Subject {
            name: name.to_string(),
            total_marks,
        });
    }
    save_subjects(conn, manager_id, batch_id, &subjects)
}

/// Rename and/or resize the entry matching `old_name`. A missing entry is a
/// silent no-op. On an actual rename, every score record in the batch has
/// its `old_name` key moved to `new_name` (best effort, row by row).
pub fn rename_or_resize(
    conn: &Connection,
    manager_id: &str,
    batch_id: &str,
    old_name: &str,
    new_name: Option<&str>,
    total_marks: Option<i64>,
) -> anyhow::Result<()> {
    let raw = load_raw(conn, manager_id, batch_id)?;
    let mut subjects = Vec::with_capacity(raw.len());
    let mut found = false;
    for entry in &raw {
        let Some(subject) = normalize_entry(entry) else {
            continue;
        };
        if subject.name == old_name {
            found = true;
            subjects.push(Subject {
                name: new_name.unwrap_or(old_name).to_string(),
                total_marks: total_marks.unwrap_or(subject.total_marks),
            });
        } else {
            subjects.push(subject);
        }
    }
    if !found {
        return Ok(());
    }
    save_subjects(conn, manager_id, batch_id, &subjects)?;

    if let Some(new_name) = new_name {
        if new_name != old_name {
            rename_score_key(conn, manager_id, batch_id, old_name, new_name)?;
        }
    }
    Ok(())
}

/// Remove any entry named `subject` (either representation) and unset the
/// matching score key across the batch. Idempotent.
pub fn delete(
    conn: &Connection,
    manager_id: &str,
    batch_id: &str,
    subject: &str,
) -> anyhow::Result<()> {
    let mut raw = load_raw(conn, manager_id, batch_id)?;
    let before = raw.len();
    raw.retain(|entry| entry_name(entry) != Some(subject));
    if raw.len() != before {
        save_raw(conn, manager_id, batch_id, &raw)?;
    }
    unset_score_key(conn, manager_id, batch_id, subject)
}

/// Write `score` under `subject` in the intern's score record, creating the
/// record if absent. A supplied `total_marks` also syncs the registry.
pub fn upsert_score(
    conn: &Connection,
    manager_id: &str,
    batch_id: &str,
    emp_id: &str,
    subject: &str,
    score: f64,
    total_marks: Option<i64>,
) -> anyhow::Result<()> {
    set_score_fields(
        conn,
        manager_id,
        batch_id,
        emp_id,
        &[(subject.to_string(), score)],
    )?;
    if let Some(total) = total_marks {
        ensure_subject(conn, manager_id, batch_id, subject, total)?;
    }
    Ok(())
}

/// Per-intern score map, `{}` when the intern has no record.
pub fn load_scores(
    conn: &Connection,
    manager_id: &str,
    batch_id: &str,
    emp_id: &str,
) -> anyhow::Result<Map<String, Value>> {
    let text: Option<String> = conn
        .query_row(
            "SELECT scores FROM score_records
             WHERE emp_id = ? AND manager_id = ? AND batch_id = ?",
            (emp_id, manager_id, batch_id),
            |r| r.get(0),
        )
        .optional()?;
    let Some(text) = text else {
        return Ok(Map::new());
    };
    let value: Value = serde_json::from_str(&text).context("score record is invalid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

/// Set several subject keys on one intern's score record in a single write.
pub fn set_score_fields(
    conn: &Connection,
    manager_id: &str,
    batch_id: &str,
    emp_id: &str,
    fields: &[(String, f64)],
) -> anyhow::Result<()> {
    if fields.is_empty() {
        return Ok(());
    }
    let mut scores = load_scores(conn, manager_id, batch_id, emp_id)?;
    for (subject, score) in fields {
        scores.insert(subject.clone(), serde_json::json!(score));
    }
    let text = serde_json::to_string(&Value::Object(scores))?;
    conn.execute(
        "INSERT INTO score_records(emp_id, manager_id, batch_id, scores)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(emp_id, manager_id, batch_id) DO UPDATE SET scores = excluded.scores",
        (emp_id, manager_id, batch_id, &text),
    )?;
    Ok(())
}

fn for_each_score_record<F>(
    conn: &Connection,
    manager_id: &str,
    batch_id: &str,
    mut rewrite: F,
) -> anyhow::Result<()>
where
    F: FnMut(&mut Map<String, Value>) -> bool,
{
    let mut stmt = conn.prepare(
        "SELECT emp_id, scores FROM score_records WHERE manager_id = ? AND batch_id = ?",
    )?;
    let rows = stmt
        .query_map((manager_id, batch_id), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for (emp_id, text) in rows {
        let value: Value =
            serde_json::from_str(&text).context("score record is invalid JSON")?;
        let Value::Object(mut map) = value else {
            continue;
        };
        if !rewrite(&mut map) {
            continue;
        }
        let updated = serde_json::to_string(&Value::Object(map))?;
        conn.execute(
            "UPDATE score_records SET scores = ?
             WHERE emp_id = ? AND manager_id = ? AND batch_id = ?",
            (&updated, &emp_id, manager_id, batch_id),
        )?;
    }
    Ok(())
}

fn rename_score_key(
    conn: &Connection,
    manager_id: &str,
    batch_id: &str,
    old_name: &str,
    new_name: &str,
) -> anyhow::Result<()> {
    for_each_score_record(conn, manager_id, batch_id, |map| {
        match map.remove(old_name) {
            Some(value) => {
                map.insert(new_name.to_string(), value);
                true
            }
            None => false,
        }
    })
}

fn unset_score_key(
    conn: &Connection,
    manager_id: &str,
    batch_id: &str,
    subject: &str,
) -> anyhow::Result<()> {
    for_each_score_record(conn, manager_id, batch_id, |map| {
        map.remove(subject).is_some()
    })
}

/// Subject name and optional explicit total inferred from a sheet header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeader {
    pub name: String,
    pub total_marks: Option<i64>,
}

/// Strip any parenthesized suffix from a column header; a
/// `"<name> (Total: <n>)"` suffix yields an explicit total.
pub fn parse_subject_header(column: &str) -> ParsedHeader {
    let name = column
        .split('(')
        .next()
        .unwrap_or(column)
        .trim()
        .to_string();
    let mut total_marks = None;
    if column.contains('(') && column.contains("Total") {
        total_marks = column
            .rsplit(':')
            .next()
            .map(|tail| tail.replace(')', ""))
            .and_then(|tail| tail.trim().parse::<i64>().ok());
    }
    ParsedHeader { name, total_marks }
}

const IDENTITY_COLUMNS: [&str; 3] = ["Name", "Email", "EmpID"];

fn is_identity_column(column: &str) -> bool {
    let trimmed = column.trim();
    IDENTITY_COLUMNS.contains(&trimmed) || trimmed == "manager_id" || trimmed == "batch_id"
}

/// Stringify a sheet cell the way identity fields arrive from a workbook:
/// numeric employee ids come back as floats and must not keep a ".0" tail.
pub(crate) fn cell_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    return format!("{}", f as i64);
                }
            }
            n.to_string()
        }
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ImportSummary {
    pub interns_upserted: usize,
    pub subjects_added: usize,
    pub scores_written: usize,
}

/// Merge a tabular import into the roster, registry and score records.
///
/// Subject candidates come from the non-identity headers; a candidate that
/// already exists in the registry keeps its stored total_marks, so a plain
/// re-import never disturbs earlier explicit totals. Rows upsert intern bio
/// fields keyed by EmpID, then write every present numeric subject cell.
/// Blank and non-numeric cells are skipped, never coerced to zero.
pub fn import_from_table(
    conn: &Connection,
    manager_id: &str,
    batch_id: &str,
    columns: &[String],
    rows: &[Map<String, Value>],
) -> anyhow::Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    let had_registry_row = {
        let row: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM subject_registry WHERE manager_id = ? AND batch_id = ?",
                (manager_id, batch_id),
                |r| r.get(0),
            )
            .optional()?;
        row.is_some()
    };

    // Existing entries, deduplicated by first occurrence.
    let mut subjects: Vec<Subject> = Vec::new();
    for subject in list(conn, manager_id, batch_id)? {
        if !subjects.iter().any(|s| s.name == subject.name) {
            subjects.push(subject);
        }
    }

    for column in columns {
        if is_identity_column(column) {
            continue;
        }
        let parsed = parse_subject_header(column);
        if parsed.name.is_empty() || subjects.iter().any(|s| s.name == parsed.name) {
            continue;
        }
        subjects.push(Subject {
            name: parsed.name,
            total_marks: parsed.total_marks.unwrap_or(DEFAULT_TOTAL_MARKS),
        });
        summary.subjects_added += 1;
    }

    if summary.subjects_added > 0 || !had_registry_row {
        save_subjects(conn, manager_id, batch_id, &subjects)?;
    }

    for row in rows {
        let emp_id = row.get("EmpID").map(cell_to_string).unwrap_or_default();
        if emp_id.is_empty() {
            continue;
        }
        let name = row.get("Name").map(cell_to_string).unwrap_or_default();
        let email = row.get("Email").map(cell_to_string).unwrap_or_default();

        conn.execute(
            "INSERT INTO interns(emp_id, manager_id, batch_id, name, email)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(emp_id, manager_id, batch_id) DO UPDATE SET
               name = excluded.name,
               email = excluded.email",
            (&emp_id, manager_id, batch_id, &name, &email),
        )?;
        summary.interns_upserted += 1;

        let mut fields: Vec<(String, f64)> = Vec::new();
        for column in columns {
            let clean = parse_subject_header(column).name;
            if !subjects.iter().any(|s| s.name == clean) {
                continue;
            }
            let Some(value) = row.get(column).and_then(|v| v.as_f64()) else {
                continue;
            };
            fields.push((clean, value));
        }
        summary.scores_written += fields.len();
        set_score_fields(conn, manager_id, batch_id, &emp_id, &fields)?;
    }

    Ok(summary)
}
