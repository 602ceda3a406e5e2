use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("ldtrack.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// In-memory store for unit tests; same schema as a real workspace.
#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS managers(
            manager_id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS batches(
            batch_id TEXT PRIMARY KEY,
            manager_id TEXT NOT NULL,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_batches_manager ON batches(manager_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS interns(
            emp_id TEXT NOT NULL,
            manager_id TEXT NOT NULL,
            batch_id TEXT NOT NULL,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            PRIMARY KEY(emp_id, manager_id, batch_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_interns_scope ON interns(manager_id, batch_id)",
        [],
    )?;

    // One row per intern; `scores` is a JSON object mapping subject name to
    // numeric score. Keys are rewritten in lockstep with registry renames
    // and deletes (see registry.rs).
    conn.execute(
        "CREATE TABLE IF NOT EXISTS score_records(
            emp_id TEXT NOT NULL,
            manager_id TEXT NOT NULL,
            batch_id TEXT NOT NULL,
            scores TEXT NOT NULL DEFAULT '{}',
            PRIMARY KEY(emp_id, manager_id, batch_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_score_records_scope ON score_records(manager_id, batch_id)",
        [],
    )?;

    // One row per batch; `entries` is a JSON array whose elements are either
    // bare name strings (legacy) or {name, total_marks} objects.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_registry(
            manager_id TEXT NOT NULL,
            batch_id TEXT NOT NULL,
            entries TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY(manager_id, batch_id)
        )",
        [],
    )?;
    ensure_registry_entries_migrated(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS feedback_entries(
            emp_id TEXT NOT NULL,
            manager_id TEXT NOT NULL,
            batch_id TEXT NOT NULL,
            column_name TEXT NOT NULL,
            text TEXT NOT NULL,
            date TEXT NOT NULL,
            PRIMARY KEY(emp_id, manager_id, batch_id, column_name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_feedback_entries_scope ON feedback_entries(manager_id, batch_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS feedback_columns(
            manager_id TEXT NOT NULL,
            batch_id TEXT NOT NULL,
            columns TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY(manager_id, batch_id)
        )",
        [],
    )?;

    Ok(())
}

// Older workspaces kept the registry array in a `subjects` column. Fold it
// into `entries` so read paths only ever look at one column.
fn ensure_registry_entries_migrated(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "subject_registry", "subjects")? {
        return Ok(());
    }
    conn.execute(
        "UPDATE subject_registry
         SET entries = subjects
         WHERE subjects IS NOT NULL AND subjects != '' AND entries = '[]'",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
