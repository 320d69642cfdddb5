use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{Role, Session};
use crate::finance;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    opt_date, opt_enum, opt_str, patch_text, req_amount, req_date, req_str, require_db,
    require_session,
};
use crate::ipc::types::{AppState, Request};

const STATUSES: &[&str] = &["upcoming", "overdue", "paid"];

fn list(conn: &Connection, session: &Session) -> Result<serde_json::Value, HandlerErr> {
    // Parents see only schedules for students registered under their email.
    let (sql, binds): (&str, Vec<&dyn rusqlite::ToSql>) =
        if session.role == Some(Role::Parent) {
            (
                "SELECT id, student_name, class_name, type, amount, due_date, status,
                        description, created_at, updated_at
                 FROM payment_schedules
                 WHERE student_name IN (SELECT name FROM students WHERE parent_email = ?)
                 ORDER BY due_date, student_name",
                vec![&session.email as &dyn rusqlite::ToSql],
            )
        } else {
            (
                "SELECT id, student_name, class_name, type, amount, due_date, status,
                        description, created_at, updated_at
                 FROM payment_schedules
                 ORDER BY due_date, student_name",
                vec![],
            )
        };

    let today = finance::today();
    let mut stmt = conn.prepare(sql).map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(binds), |r| {
            let stored_status: String = r.get(6)?;
            let due_date: String = r.get(5)?;
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentName": r.get::<_, String>(1)?,
                "class": r.get::<_, String>(2)?,
                "type": r.get::<_, String>(3)?,
                "amount": r.get::<_, i64>(4)?,
                "dueDate": due_date.clone(),
                // Derived at read time; the stored value is never rewritten.
                "status": finance::derived_schedule_status(&stored_status, &due_date, today),
                "description": r.get::<_, Option<String>>(7)?,
                "createdAt": r.get::<_, Option<String>>(8)?,
                "updatedAt": r.get::<_, Option<String>>(9)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "schedules": rows }))
}

fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_name = req_str(params, "studentName")?;
    let class_name = req_str(params, "class")?;
    let schedule_type = req_str(params, "type")?;
    let amount = req_amount(params, "amount")?;
    let due_date = req_date(params, "dueDate")?;
    let status = opt_enum(params, "status", STATUSES)?.unwrap_or_else(|| "upcoming".to_string());
    let description = opt_str(params, "description");

    let schedule_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO payment_schedules(id, student_name, class_name, type, amount, due_date,
                                       status, description, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?,
                strftime('%Y-%m-%dT%H:%M:%SZ','now'),
                strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &schedule_id,
            &student_name,
            &class_name,
            &schedule_type,
            amount,
            &due_date,
            &status,
            description.as_deref(),
        ),
    )
    .map_err(|e| HandlerErr::insert("payment_schedules", e))?;

    Ok(json!({ "scheduleId": schedule_id }))
}

fn update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let schedule_id = req_str(params, "scheduleId")?;
    let patch = params.get("patch").cloned().unwrap_or(json!({}));

    let existing = conn
        .query_row(
            "SELECT student_name, class_name, type, amount, due_date, status, description
             FROM payment_schedules WHERE id = ?",
            [&schedule_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, Option<String>>(6)?,
                ))
            },
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some((old_student, old_class, old_type, old_amount, old_due, old_status, old_desc)) =
        existing
    else {
        return Err(HandlerErr::not_found("payment schedule not found"));
    };

    let student_name = opt_str(&patch, "studentName").unwrap_or(old_student);
    let class_name = opt_str(&patch, "class").unwrap_or(old_class);
    let schedule_type = opt_str(&patch, "type").unwrap_or(old_type);
    let amount = match patch.get("amount") {
        None => old_amount,
        Some(_) => req_amount(&patch, "amount")?,
    };
    let due_date = match opt_date(&patch, "dueDate")? {
        Some(d) => d,
        None => old_due,
    };
    let status = opt_enum(&patch, "status", STATUSES)?.unwrap_or(old_status);
    let description = patch_text(&patch, "description", old_desc);

    conn.execute(
        "UPDATE payment_schedules
         SET student_name = ?, class_name = ?, type = ?, amount = ?, due_date = ?,
             status = ?, description = ?,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        (
            &student_name,
            &class_name,
            &schedule_type,
            amount,
            &due_date,
            &status,
            description.as_deref(),
            &schedule_id,
        ),
    )
    .map_err(|e| HandlerErr::update("payment_schedules", e))?;

    Ok(json!({ "ok": true }))
}

fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let schedule_id = req_str(params, "scheduleId")?;
    let affected = conn
        .execute("DELETE FROM payment_schedules WHERE id = ?", [&schedule_id])
        .map_err(|e| HandlerErr::delete("payment_schedules", e))?;
    if affected == 0 {
        return Err(HandlerErr::not_found("payment schedule not found"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let st: &AppState = state;
    let out = match req.method.as_str() {
        "schedule.list" => require_db(st).and_then(|conn| {
            let session = require_session(st)?;
            list(conn, session)
        }),
        "schedule.create" => require_db(st).and_then(|conn| create(conn, &req.params)),
        "schedule.update" => require_db(st).and_then(|conn| update(conn, &req.params)),
        "schedule.delete" => require_db(st).and_then(|conn| delete(conn, &req.params)),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}
