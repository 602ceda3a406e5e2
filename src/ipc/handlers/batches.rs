use crate::ipc::error::{err, ok, OpError};
use crate::ipc::helpers::require_str;
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

fn create(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let manager_id = require_str(params, "managerId")?;
    let name = require_str(params, "name")?;

    let batch_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO batches(batch_id, manager_id, name) VALUES(?, ?, ?)",
        (&batch_id, &manager_id, &name),
    )?;

    Ok(json!({
        "message": "Batch created",
        "batchId": batch_id,
        "name": name
    }))
}

fn list(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let manager_id = require_str(params, "managerId")?;

    let mut stmt =
        conn.prepare("SELECT batch_id, name FROM batches WHERE manager_id = ? ORDER BY rowid")?;
    let batches = stmt
        .query_map([&manager_id], |row| {
            Ok(json!({
                "batchId": row.get::<_, String>(0)?,
                "managerId": manager_id,
                "name": row.get::<_, String>(1)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(json!({ "batches": batches }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op = match req.method.as_str() {
        "batches.create" => create,
        "batches.list" => list,
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
