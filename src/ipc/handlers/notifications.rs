use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{req_str, require_db};
use crate::ipc::types::{AppState, Request};

fn list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, title, message, created_at
             FROM notifications
             ORDER BY created_at DESC, id",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "title": r.get::<_, String>(1)?,
                "message": r.get::<_, String>(2)?,
                "createdAt": r.get::<_, Option<String>>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "notifications": rows }))
}

fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let title = req_str(params, "title")?;
    let message = req_str(params, "message")?;

    let notification_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO notifications(id, title, message, created_at)
         VALUES(?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (&notification_id, &title, &message),
    )
    .map_err(|e| HandlerErr::insert("notifications", e))?;

    Ok(json!({ "notificationId": notification_id }))
}

fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let notification_id = req_str(params, "notificationId")?;
    let affected = conn
        .execute(
            "DELETE FROM notifications WHERE id = ?",
            [&notification_id],
        )
        .map_err(|e| HandlerErr::delete("notifications", e))?;
    if affected == 0 {
        return Err(HandlerErr::not_found("notification not found"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "notifications.list" => require_db(state).and_then(|conn| list(conn)),
        "notifications.create" => require_db(state).and_then(|conn| create(conn, &req.params)),
        "notifications.delete" => require_db(state).and_then(|conn| delete(conn, &req.params)),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}
