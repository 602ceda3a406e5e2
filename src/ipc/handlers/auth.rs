use crate::auth;
use crate::ipc::error::{err, ok, OpError};
use crate::ipc::helpers::require_str;
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

fn register(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let username = require_str(params, "username")?;
    let password = require_str(params, "password")?;

    // Usernames are unique case-insensitively; the column collation makes
    // the same comparison the login lookup uses.
    let exists: Option<String> = conn
        .query_row(
            "SELECT manager_id FROM managers WHERE username = ?",
            [&username],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Err(OpError::Conflict("username already exists".into()));
    }

    let manager_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO managers(manager_id, username, password_hash) VALUES(?, ?, ?)",
        (&manager_id, &username, &auth::hash_password(&password)),
    )?;

    Ok(json!({
        "message": "Manager registered",
        "managerId": manager_id,
        "username": username
    }))
}

fn login(conn: &Connection, params: &Value) -> Result<Value, OpError> {
    let username = require_str(params, "username")?.trim().to_string();
    let password = require_str(params, "password")?;

    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT manager_id, username, password_hash FROM managers WHERE username = ?",
            [&username],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((manager_id, stored_username, password_hash)) = row else {
        return Err(OpError::InvalidCredentials);
    };
    if !auth::verify_password(&password_hash, &password) {
        return Err(OpError::InvalidCredentials);
    }

    Ok(json!({
        "message": "Login successful",
        "managerId": manager_id,
        "username": stored_username
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op = match req.method.as_str() {
        "auth.register" => register,
        "auth.login" => login,
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
