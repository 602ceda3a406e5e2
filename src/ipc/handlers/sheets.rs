use crate::ipc::error::{err, ok, OpError};
use crate::ipc::helpers::{require_scope, require_str};
use crate::ipc::types::{AppState, Request};
use crate::registry;
use crate::sheet;
use chrono::Local;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

use super::feedback::upsert_cell;
use super::interns::list_interns;

const REQUIRED_BIO_COLUMNS: [&str; 3] = ["Name", "Email", "EmpID"];

fn import_interns(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;
    let path = require_str(params, "path")?;

    let table = sheet::read_table(Path::new(&path)).map_err(OpError::Internal)?;
    for required in REQUIRED_BIO_COLUMNS {
        if !table.columns.iter().any(|c| c.trim() == required) {
            return Err(OpError::BadParams(format!(
                "sheet must at least contain columns: {:?}",
                REQUIRED_BIO_COLUMNS
            )));
        }
    }

    let summary = registry::import_from_table(
        conn,
        &manager_id,
        &batch_id,
        &table.columns,
        &table.rows,
    )?;
    tracing::info!(
        interns = summary.interns_upserted,
        subjects = summary.subjects_added,
        scores = summary.scores_written,
        "roster sheet imported"
    );
    Ok(json!({
        "message": "Interns uploaded",
        "internsUpserted": summary.interns_upserted,
        "subjectsAdded": summary.subjects_added,
        "scoresWritten": summary.scores_written,
    }))
}

fn import_feedback(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;
    let path = require_str(params, "path")?;

    let table = sheet::read_table(Path::new(&path)).map_err(OpError::Internal)?;
    for required in ["EmpID", "Feedback"] {
        if !table.columns.iter().any(|c| c.trim() == required) {
            return Err(OpError::BadParams(
                "sheet must have EmpID and Feedback columns".into(),
            ));
        }
    }

    let mut imported = 0usize;
    for row in &table.rows {
        let emp_id = row
            .get("EmpID")
            .map(registry::cell_to_string)
            .unwrap_or_default();
        let text = row
            .get("Feedback")
            .map(registry::cell_to_string)
            .unwrap_or_default();
        if emp_id.is_empty() || text.is_empty() {
            continue;
        }
        upsert_cell(conn, &manager_id, &batch_id, &emp_id, "General", &text)?;
        imported += 1;
    }
    Ok(json!({ "message": "Feedback uploaded", "entriesImported": imported }))
}

fn export_scores(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;
    let out_dir = require_str(params, "outDir")?;

    let subjects = registry::list(conn, &manager_id, &batch_id)?;
    let mut columns: Vec<String> = vec!["Name".into(), "EmpID".into(), "Email".into()];
    for subject in &subjects {
        columns.push(format!("{} (Total: {})", subject.name, subject.total_marks));
    }

    let mut rows: Vec<Map<String, Value>> = Vec::new();
    for (emp_id, name, email) in list_interns(conn, &manager_id, &batch_id)? {
        let scores = registry::load_scores(conn, &manager_id, &batch_id, &emp_id)?;
        let mut row = Map::new();
        row.insert("Name".into(), json!(name));
        row.insert("EmpID".into(), json!(emp_id));
        row.insert("Email".into(), json!(email));
        for (subject, header) in subjects.iter().zip(columns.iter().skip(3)) {
            let score = scores.get(&subject.name).cloned().unwrap_or(json!(0));
            row.insert(header.clone(), score);
        }
        rows.push(row);
    }

    let batch_name: String = conn
        .query_row(
            "SELECT name FROM batches WHERE batch_id = ?",
            [&batch_id],
            |r| r.get(0),
        )
        .optional()?
        .unwrap_or_else(|| "Batch".to_string());
    let filename = format!(
        "Scores_{}_{}.xlsx",
        batch_name.replace(' ', "_"),
        Local::now().format("%Y%m%d")
    );
    let out_path = PathBuf::from(&out_dir).join(&filename);

    sheet::write_xlsx(&out_path, "Performance Grid", &columns, &rows)
        .map_err(OpError::Internal)?;
    tracing::info!(path = %out_path.to_string_lossy(), rows = rows.len(), "scores exported");

    Ok(json!({
        "message": "Scores exported",
        "path": out_path.to_string_lossy(),
        "filename": filename,
        "rowsExported": rows.len(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op = match req.method.as_str() {
        "sheets.importInterns" => import_interns,
        "sheets.importFeedback" => import_feedback,
        "sheets.exportScores" => export_scores,
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
