use crate::ipc::error::{err, ok, OpError};
use crate::ipc::helpers::{require_scope, require_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

pub fn intern_json(emp_id: &str, name: &str, email: &str) -> Value {
    json!({ "empId": emp_id, "name": name, "email": email })
}

/// Roster rows for a batch in store order.
pub fn list_interns(
    conn: &Connection,
    manager_id: &str,
    batch_id: &str,
) -> Result<Vec<(String, String, String)>, OpError> {
    let mut stmt = conn.prepare(
        "SELECT emp_id, name, email FROM interns
         WHERE manager_id = ? AND batch_id = ? ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map((manager_id, batch_id), |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn create(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;
    let emp_id = require_str(params, "empId")?;
    let name = require_str(params, "name")?;
    let email = require_str(params, "email")?;

    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM interns WHERE emp_id = ? AND manager_id = ? AND batch_id = ?",
            (&emp_id, &manager_id, &batch_id),
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Err(OpError::Conflict(
            "intern with this empId already exists in this batch".into(),
        ));
    }

    conn.execute(
        "INSERT INTO interns(emp_id, manager_id, batch_id, name, email) VALUES(?, ?, ?, ?, ?)",
        (&emp_id, &manager_id, &batch_id, &name, &email),
    )?;
    Ok(json!({ "message": "Intern added" }))
}

fn list(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;
    let interns: Vec<Value> = list_interns(conn, &manager_id, &batch_id)?
        .iter()
        .map(|(emp_id, name, email)| intern_json(emp_id, name, email))
        .collect();
    Ok(json!({ "interns": interns }))
}

fn update(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;
    let emp_id = require_str(params, "empId")?;
    let name = require_str(params, "name")?;
    let email = require_str(params, "email")?;

    // Bio fields only; the key never changes.
    conn.execute(
        "UPDATE interns SET name = ?, email = ?
         WHERE emp_id = ? AND manager_id = ? AND batch_id = ?",
        (&name, &email, &emp_id, &manager_id, &batch_id),
    )?;
    Ok(json!({ "message": "Intern bio updated" }))
}

fn delete(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;
    let emp_id = require_str(params, "empId")?;

    conn.execute(
        "DELETE FROM interns WHERE emp_id = ? AND manager_id = ? AND batch_id = ?",
        (&emp_id, &manager_id, &batch_id),
    )?;
    conn.execute(
        "DELETE FROM score_records WHERE emp_id = ? AND manager_id = ? AND batch_id = ?",
        (&emp_id, &manager_id, &batch_id),
    )?;
    conn.execute(
        "DELETE FROM feedback_entries WHERE emp_id = ? AND manager_id = ? AND batch_id = ?",
        (&emp_id, &manager_id, &batch_id),
    )?;
    Ok(json!({ "message": "Intern deleted" }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op = match req.method.as_str() {
        "interns.create" => create,
        "interns.list" => list,
        "interns.update" => update,
        "interns.delete" => delete,
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
