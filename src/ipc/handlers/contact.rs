use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{Role, Session};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{opt_enum, opt_str, req_str, require_db, require_session};
use crate::ipc::types::{AppState, Request};

const PRIORITIES: &[&str] = &["low", "normal", "high", "urgent"];

fn create(
    conn: &Connection,
    session: &Session,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let subject = req_str(params, "subject")?;
    let category = req_str(params, "category")?;
    let priority = opt_enum(params, "priority", PRIORITIES)?.unwrap_or_else(|| "normal".to_string());
    let message = req_str(params, "message")?;
    let student_name = opt_str(params, "studentName");

    let message_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO contact_messages(id, author_id, subject, category, priority, message,
                                      student_name, status, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, 'sent', strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &message_id,
            &session.principal,
            &subject,
            &category,
            &priority,
            &message,
            student_name.as_deref(),
        ),
    )
    .map_err(|e| HandlerErr::insert("contact_messages", e))?;

    Ok(json!({ "messageId": message_id }))
}

fn list(conn: &Connection, session: &Session) -> Result<serde_json::Value, HandlerErr> {
    // Parents see their own messages; admin-side roles see the whole inbox.
    let (sql, binds): (&str, Vec<&dyn rusqlite::ToSql>) =
        if session.role == Some(Role::Parent) {
            (
                "SELECT id, author_id, subject, category, priority, message, student_name,
                        status, reply, replied_at, created_at
                 FROM contact_messages
                 WHERE author_id = ?
                 ORDER BY created_at DESC, id",
                vec![&session.principal as &dyn rusqlite::ToSql],
            )
        } else {
            (
                "SELECT id, author_id, subject, category, priority, message, student_name,
                        status, reply, replied_at, created_at
                 FROM contact_messages
                 ORDER BY created_at DESC, id",
                vec![],
            )
        };
    let mut stmt = conn.prepare(sql).map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(binds), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "authorId": r.get::<_, String>(1)?,
                "subject": r.get::<_, String>(2)?,
                "category": r.get::<_, String>(3)?,
                "priority": r.get::<_, String>(4)?,
                "message": r.get::<_, String>(5)?,
                "studentName": r.get::<_, Option<String>>(6)?,
                "status": r.get::<_, String>(7)?,
                "reply": r.get::<_, Option<String>>(8)?,
                "repliedAt": r.get::<_, Option<String>>(9)?,
                "createdAt": r.get::<_, Option<String>>(10)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "messages": rows }))
}

fn reply(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let message_id = req_str(params, "messageId")?;
    let reply_text = req_str(params, "reply")?;

    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM contact_messages WHERE id = ?",
            [&message_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    if exists.is_none() {
        return Err(HandlerErr::not_found("contact message not found"));
    }

    conn.execute(
        "UPDATE contact_messages
         SET status = 'replied', reply = ?, replied_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        (&reply_text, &message_id),
    )
    .map_err(|e| HandlerErr::update("contact_messages", e))?;

    Ok(json!({ "ok": true }))
}

fn mark_read(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let message_id = req_str(params, "messageId")?;
    // Only the initial state advances to read; a replied message stays replied.
    let affected = conn
        .execute(
            "UPDATE contact_messages SET status = 'read' WHERE id = ? AND status = 'sent'",
            [&message_id],
        )
        .map_err(|e| HandlerErr::update("contact_messages", e))?;
    Ok(json!({ "ok": true, "changed": affected > 0 }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let st: &AppState = state;
    let out = match req.method.as_str() {
        "contact.create" => require_db(st).and_then(|conn| {
            let session = require_session(st)?;
            create(conn, session, &req.params)
        }),
        "contact.list" => require_db(st).and_then(|conn| {
            let session = require_session(st)?;
            list(conn, session)
        }),
        "contact.reply" => require_db(st).and_then(|conn| reply(conn, &req.params)),
        "contact.markRead" => require_db(st).and_then(|conn| mark_read(conn, &req.params)),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}
