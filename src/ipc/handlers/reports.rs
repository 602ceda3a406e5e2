use crate::ipc::error::{err, ok, OpError};
use crate::ipc::helpers::{require_scope, require_str};
use crate::ipc::types::{AppState, Request};
use crate::registry;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

use super::feedback::batch_entries;
use super::interns::intern_json;

/// Single-intern join across roster, scores, feedback and the registry.
fn get(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;
    let emp_id = require_str(params, "empId")?;

    let intern: Option<(String, String)> = conn
        .query_row(
            "SELECT name, email FROM interns
             WHERE emp_id = ? AND manager_id = ? AND batch_id = ?",
            (&emp_id, &manager_id, &batch_id),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((name, email)) = intern else {
        return Err(OpError::NotFound("intern not found".into()));
    };

    let scores = registry::load_scores(conn, &manager_id, &batch_id, &emp_id)?;
    let feedbacks: Vec<Value> = batch_entries(conn, &manager_id, &batch_id)?
        .into_iter()
        .filter(|(e, _, _, _)| e == &emp_id)
        .map(|(_, column, text, date)| json!({ "column": column, "text": text, "date": date }))
        .collect();
    let subjects = registry::list(conn, &manager_id, &batch_id)?;

    Ok(json!({
        "intern": intern_json(&emp_id, &name, &email),
        "scores": scores,
        "feedbacks": feedbacks,
        "subjects": subjects,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    if req.method != "reports.get" {
        return None;
    }
    let Some(conn) = state.db.as_ref() else {
        return Some(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    Some(match get(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
