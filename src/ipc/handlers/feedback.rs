use crate::ipc::error::{err, ok, OpError};
use crate::ipc::helpers::{require_scope, require_str};
use crate::ipc::types::{AppState, Request};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use super::interns::list_interns;

fn load_columns(
    conn: &Connection,
    manager_id: &str,
    batch_id: &str,
) -> Result<Vec<String>, OpError> {
    let text: Option<String> = conn
        .query_row(
            "SELECT columns FROM feedback_columns WHERE manager_id = ? AND batch_id = ?",
            (manager_id, batch_id),
            |r| r.get(0),
        )
        .optional()?;
    let Some(text) = text else {
        return Ok(Vec::new());
    };
    let value: Value = serde_json::from_str(&text)?;
    Ok(value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default())
}

fn save_columns(
    conn: &Connection,
    manager_id: &str,
    batch_id: &str,
    columns: &[String],
) -> Result<(), OpError> {
    let text = serde_json::to_string(columns)?;
    conn.execute(
        "INSERT INTO feedback_columns(manager_id, batch_id, columns)
         VALUES(?, ?, ?)
         ON CONFLICT(manager_id, batch_id) DO UPDATE SET columns = excluded.columns",
        (manager_id, batch_id, &text),
    )?;
    Ok(())
}

/// Upsert a single cell; the per-(intern, column) key makes the last write
/// for a column win.
pub fn upsert_cell(
    conn: &Connection,
    manager_id: &str,
    batch_id: &str,
    emp_id: &str,
    column: &str,
    text: &str,
) -> Result<(), OpError> {
    let date = Local::now().to_rfc3339();
    conn.execute(
        "INSERT INTO feedback_entries(emp_id, manager_id, batch_id, column_name, text, date)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(emp_id, manager_id, batch_id, column_name) DO UPDATE SET
           text = excluded.text,
           date = excluded.date",
        (emp_id, manager_id, batch_id, column, text, &date),
    )?;
    Ok(())
}

/// All feedback rows for a batch as (empId, column, text, date).
pub fn batch_entries(
    conn: &Connection,
    manager_id: &str,
    batch_id: &str,
) -> Result<Vec<(String, String, String, String)>, OpError> {
    let mut stmt = conn.prepare(
        "SELECT emp_id, column_name, text, date FROM feedback_entries
         WHERE manager_id = ? AND batch_id = ? ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map((manager_id, batch_id), |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn columns_list(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;
    Ok(json!({ "columns": load_columns(conn, &manager_id, &batch_id)? }))
}

fn columns_add(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;
    let name = require_str(params, "name")?;

    // Set semantics: adding an existing column is a no-op.
    let mut columns = load_columns(conn, &manager_id, &batch_id)?;
    if !columns.contains(&name) {
        columns.push(name);
        save_columns(conn, &manager_id, &batch_id, &columns)?;
    }
    Ok(json!({ "message": "Column added" }))
}

fn columns_delete(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;
    let name = require_str(params, "name")?;

    let mut columns = load_columns(conn, &manager_id, &batch_id)?;
    columns.retain(|c| c != &name);
    save_columns(conn, &manager_id, &batch_id, &columns)?;

    // Irreversible: every cell under the column goes with it.
    conn.execute(
        "DELETE FROM feedback_entries
         WHERE manager_id = ? AND batch_id = ? AND column_name = ?",
        (&manager_id, &batch_id, &name),
    )?;
    Ok(json!({ "message": "Column deleted" }))
}

fn grid(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;

    let mut feedback_map: HashMap<String, Map<String, Value>> = HashMap::new();
    for (emp_id, column, text, _date) in batch_entries(conn, &manager_id, &batch_id)? {
        feedback_map
            .entry(emp_id)
            .or_default()
            .insert(column, json!(text));
    }

    let mut rows = Vec::new();
    for (emp_id, name, email) in list_interns(conn, &manager_id, &batch_id)? {
        let feedbacks = feedback_map.remove(&emp_id).unwrap_or_default();
        rows.push(json!({
            "empId": emp_id,
            "name": name,
            "email": email,
            "feedbacks": feedbacks,
        }));
    }
    Ok(json!({ "rows": rows }))
}

fn update_cell(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;
    let emp_id = require_str(params, "empId")?;
    let column = require_str(params, "column")?;
    let text = require_str(params, "text")?;

    upsert_cell(conn, &manager_id, &batch_id, &emp_id, &column, &text)?;
    Ok(json!({ "message": "Feedback updated" }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op = match req.method.as_str() {
        "feedback.columns.list" => columns_list,
        "feedback.columns.add" => columns_add,
        "feedback.columns.delete" => columns_delete,
        "feedback.grid" => grid,
        "feedback.updateCell" => update_cell,
        _ => return None,
    };
    let Some(conn) = state.db.as_ref() else {
        return Some(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    Some(match op(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
