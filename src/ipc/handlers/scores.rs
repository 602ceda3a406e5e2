use crate::ipc::error::{err, ok, OpError};
use crate::ipc::helpers::{opt_i64, require_f64, require_scope, require_str};
use crate::ipc::types::{AppState, Request};
use crate::registry;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

use super::interns::list_interns;

/// One flat record per intern: bio fields merged with that intern's score
/// map. Interns without a score record still appear, bio only.
pub fn combined_rows(
    conn: &Connection,
    manager_id: &str,
    batch_id: &str,
) -> Result<Vec<Value>, OpError> {
    let mut rows = Vec::new();
    for (emp_id, name, email) in list_interns(conn, manager_id, batch_id)? {
        let mut record = Map::new();
        record.insert("empId".into(), json!(emp_id));
        record.insert("name".into(), json!(name));
        record.insert("email".into(), json!(email));
        for (subject, score) in registry::load_scores(conn, manager_id, batch_id, &emp_id)? {
            record.insert(subject, score);
        }
        rows.push(Value::Object(record));
    }
    Ok(rows)
}

fn combined(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;
    Ok(json!({ "rows": combined_rows(conn, &manager_id, &batch_id)? }))
}

fn update(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;
    let emp_id = require_str(params, "empId")?;
    let subject = require_str(params, "subject")?;
    let score = require_f64(params, "score")?;
    let total_marks = opt_i64(params, "totalMarks");

    registry::upsert_score(
        conn, &manager_id, &batch_id, &emp_id, &subject, score, total_marks,
    )?;
    Ok(json!({ "message": "Score updated" }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op = match req.method.as_str() {
        "scores.combined" => combined,
        "scores.update" => update,
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
