use crate::ipc::error::{err, ok, OpError};
use crate::ipc::helpers::{opt_i64, opt_str, require_scope, require_str};
use crate::ipc::types::{AppState, Request};
use crate::registry;
use rusqlite::Connection;
use serde_json::{json, Value};

fn list(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;
    let subjects = registry::list(conn, &manager_id, &batch_id)?;
    Ok(json!({ "subjects": subjects }))
}

fn update(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;
    let old_name = require_str(params, "oldName")?;
    let new_name = opt_str(params, "newName");
    let total_marks = opt_i64(params, "totalMarks");

    registry::rename_or_resize(
        conn,
        &manager_id,
        &batch_id,
        &old_name,
        new_name.as_deref(),
        total_marks,
    )?;
    Ok(json!({ "message": "Subject updated" }))
}

fn delete(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;
    let subject = require_str(params, "subject")?;

    registry::delete(conn, &manager_id, &batch_id, &subject)?;
    Ok(json!({ "message": format!("Subject {} deleted", subject) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op = match req.method.as_str() {
        "subjects.list" => list,
        "subjects.update" => update,
        "subjects.delete" => delete,
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
