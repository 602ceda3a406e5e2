use crate::chat;
use crate::ipc::error::{err, ok, OpError};
use crate::ipc::helpers::{require_scope, require_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use super::feedback::batch_entries;
use super::interns::list_interns;

/// Profile block the assistant sees: one entry per intern with its score map
/// and `column: text` feedback lines.
pub fn build_context(
    batch_name: &str,
    interns: &[(String, String, String)],
    score_map: &HashMap<String, Map<String, Value>>,
    feedback_map: &HashMap<String, Vec<String>>,
) -> String {
    let mut context = format!("Active Batch: {}\n\nIntern Profiles:\n", batch_name);
    for (emp_id, name, _email) in interns {
        let scores = score_map
            .get(emp_id)
            .map(|m| serde_json::to_string(m).unwrap_or_else(|_| "{}".into()))
            .unwrap_or_else(|| "{}".into());
        let feedback = feedback_map
            .get(emp_id)
            .map(|lines| lines.join("; "))
            .unwrap_or_default();
        context.push_str(&format!(
            "- {} ({}):\n Scores: {}\n Feedback: {}\n\n",
            name, emp_id, scores, feedback
        ));
    }
    context
}

fn query(state: &AppState, conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let (manager_id, batch_id) = require_scope(params)?;
    let query = require_str(params, "query")?;

    let interns = list_interns(conn, &manager_id, &batch_id)?;
    let mut score_map: HashMap<String, Map<String, Value>> = HashMap::new();
    for (emp_id, _, _) in &interns {
        let scores = crate::registry::load_scores(conn, &manager_id, &batch_id, emp_id)?;
        if !scores.is_empty() {
            score_map.insert(emp_id.clone(), scores);
        }
    }
    let mut feedback_map: HashMap<String, Vec<String>> = HashMap::new();
    for (emp_id, column, text, _date) in batch_entries(conn, &manager_id, &batch_id)? {
        feedback_map
            .entry(emp_id)
            .or_default()
            .push(format!("{}: {}", column, text));
    }
    let batch_name: String = conn
        .query_row(
            "SELECT name FROM batches WHERE batch_id = ?",
            [&batch_id],
            |r| r.get(0),
        )
        .optional()?
        .unwrap_or_else(|| "Unknown Batch".to_string());

    let context = build_context(&batch_name, &interns, &score_map, &feedback_map);
    let user_prompt = format!("Context:\n{}\n\nQuery: {}", context, query);

    let answer = chat::complete(&state.chat, chat::SYSTEM_PROMPT, &user_prompt)
        .map_err(|e| OpError::Upstream(e.to_string()))?;
    Ok(json!({ "response": answer }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    if req.method != "chat.query" {
        return None;
    }
    let Some(conn) = state.db.as_ref() else {
        return Some(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    Some(match query(state, conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => {
            tracing::warn!(code = e.code(), "chat query failed");
            e.response(&req.id)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_lists_every_intern_with_scores_and_feedback() {
        let interns = vec![
            ("E1".to_string(), "Asha".to_string(), "a@example.com".to_string()),
            ("E2".to_string(), "Ravi".to_string(), "r@example.com".to_string()),
        ];
        let mut score_map = HashMap::new();
        let mut scores = Map::new();
        scores.insert("Physics".into(), json!(40.0));
        score_map.insert("E1".to_string(), scores);
        let mut feedback_map = HashMap::new();
        feedback_map.insert(
            "E1".to_string(),
            vec!["General: solid start".to_string(), "Week 2: improving".to_string()],
        );

        let context = build_context("Batch A", &interns, &score_map, &feedback_map);

        assert!(context.starts_with("Active Batch: Batch A\n"));
        assert!(context.contains("- Asha (E1):"));
        assert!(context.contains("\"Physics\":40.0"));
        assert!(context.contains("General: solid start; Week 2: improving"));
        // Interns without records still show with empty slots.
        assert!(context.contains("- Ravi (E2):\n Scores: {}\n Feedback: \n"));
    }
}
