use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    opt_date, opt_enum, opt_str, patch_text, req_amount, req_date, req_str, require_db,
};
use crate::ipc::types::{AppState, Request};

/// Income and expenses are independent ledgers with an identical record
/// shape, so one implementation serves both tables.
const VERIFICATION: &[&str] = &["pending", "verified", "rejected"];

fn list(conn: &Connection, table: &str) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT id, amount, category, date, status, notes, created_at, updated_at
             FROM {}
             ORDER BY date DESC, id",
            table
        ))
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "amount": r.get::<_, i64>(1)?,
                "category": r.get::<_, String>(2)?,
                "date": r.get::<_, String>(3)?,
                "status": r.get::<_, String>(4)?,
                "notes": r.get::<_, Option<String>>(5)?,
                "createdAt": r.get::<_, Option<String>>(6)?,
                "updatedAt": r.get::<_, Option<String>>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "entries": rows }))
}

fn create(
    conn: &Connection,
    table: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let amount = req_amount(params, "amount")?;
    let category = req_str(params, "category")?;
    let date = req_date(params, "date")?;
    let status = match opt_enum(params, "status", VERIFICATION)? {
        Some(s) => s,
        None => "pending".to_string(),
    };
    let notes = opt_str(params, "notes");

    let entry_id = Uuid::new_v4().to_string();
    conn.execute(
        &format!(
            "INSERT INTO {}(id, amount, category, date, status, notes, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?,
                    strftime('%Y-%m-%dT%H:%M:%SZ','now'),
                    strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
            table
        ),
        (&entry_id, amount, &category, &date, &status, notes.as_deref()),
    )
    .map_err(|e| HandlerErr::insert(table, e))?;

    Ok(json!({ "entryId": entry_id }))
}

fn update(
    conn: &Connection,
    table: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let entry_id = req_str(params, "entryId")?;
    let patch = params.get("patch").cloned().unwrap_or(json!({}));

    let existing = conn
        .query_row(
            &format!(
                "SELECT amount, category, date, status, notes FROM {} WHERE id = ?",
                table
            ),
            [&entry_id],
            |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, Option<String>>(4)?,
                ))
            },
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some((old_amount, old_category, old_date, old_status, old_notes)) = existing else {
        return Err(HandlerErr::not_found("ledger entry not found"));
    };

    let amount = match patch.get("amount") {
        None => old_amount,
        Some(_) => req_amount(&patch, "amount")?,
    };
    let category = opt_str(&patch, "category").unwrap_or(old_category);
    let date = match opt_date(&patch, "date")? {
        Some(d) => d,
        None => old_date,
    };
    let status = match opt_enum(&patch, "status", VERIFICATION)? {
        Some(s) => s,
        None => old_status,
    };
    let notes = patch_text(&patch, "notes", old_notes);

    conn.execute(
        &format!(
            "UPDATE {}
             SET amount = ?, category = ?, date = ?, status = ?, notes = ?,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
             WHERE id = ?",
            table
        ),
        (amount, &category, &date, &status, notes.as_deref(), &entry_id),
    )
    .map_err(|e| HandlerErr::update(table, e))?;

    Ok(json!({ "ok": true }))
}

fn delete(
    conn: &Connection,
    table: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let entry_id = req_str(params, "entryId")?;
    let affected = conn
        .execute(&format!("DELETE FROM {} WHERE id = ?", table), [&entry_id])
        .map_err(|e| HandlerErr::delete(table, e))?;
    if affected == 0 {
        return Err(HandlerErr::not_found("ledger entry not found"));
    }
    Ok(json!({ "ok": true }))
}

fn table_for(method: &str) -> Option<&'static str> {
    if method.starts_with("income.") {
        Some("incomes")
    } else if method.starts_with("expenses.") {
        Some("expenses")
    } else {
        None
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let table = table_for(&req.method)?;
    let op = req.method.split('.').nth(1).unwrap_or("");
    let out = match op {
        "list" => require_db(state).and_then(|conn| list(conn, table)),
        "create" => require_db(state).and_then(|conn| create(conn, table, &req.params)),
        "update" => require_db(state).and_then(|conn| update(conn, table, &req.params)),
        "delete" => require_db(state).and_then(|conn| delete(conn, table, &req.params)),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}
