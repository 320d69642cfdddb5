use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{self, Role, Session};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{opt_str, req_enum, req_str, require_db, require_session};
use crate::ipc::types::{AppState, Request};

const ROLES: &[&str] = &["admin", "bendahara", "guru", "parent"];

fn list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, email, name, role, created_at, updated_at
             FROM users
             ORDER BY name",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([], |r| {
            let role: String = r.get(3)?;
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "email": r.get::<_, String>(1)?,
                "name": r.get::<_, String>(2)?,
                "role": role.clone(),
                "label": Role::from_str(&role).map(|ro| auth::policy(ro).label),
                "createdAt": r.get::<_, Option<String>>(4)?,
                "updatedAt": r.get::<_, Option<String>>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "users": rows }))
}

fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let email = req_str(params, "email")?;
    if !email.contains('@') {
        return Err(HandlerErr::validation("email", "email must be a valid address"));
    }
    let name = req_str(params, "name")?;
    let role = req_enum(params, "role", ROLES)?;
    let password = req_str(params, "password")?;
    if password.len() < 6 {
        return Err(HandlerErr::validation(
            "password",
            "password must be at least 6 characters",
        ));
    }

    let taken: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE email = ?", [&email], |r| r.get(0))
        .optional()
        .map_err(HandlerErr::query)?;
    if taken.is_some() {
        return Err(HandlerErr::validation("email", "email is already registered"));
    }

    let user_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(id, email, name, role, password_hash, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?,
                strftime('%Y-%m-%dT%H:%M:%SZ','now'),
                strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &user_id,
            &email,
            &name,
            &role,
            auth::hash_password(&email, &password),
        ),
    )
    .map_err(|e| HandlerErr::insert("users", e))?;

    Ok(json!({ "userId": user_id, "role": role }))
}

fn update(
    conn: &Connection,
    session: &Session,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let user_id = req_str(params, "userId")?;
    let patch = params.get("patch").cloned().unwrap_or(json!({}));

    let existing = conn
        .query_row(
            "SELECT email, name, role FROM users WHERE id = ?",
            [&user_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            },
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some((old_email, old_name, old_role)) = existing else {
        return Err(HandlerErr::not_found("user not found"));
    };

    let name = opt_str(&patch, "name").unwrap_or(old_name);
    let email = match opt_str(&patch, "email") {
        Some(e) if !e.contains('@') => {
            return Err(HandlerErr::validation("email", "email must be a valid address"))
        }
        Some(e) => e,
        None => old_email.clone(),
    };
    let role = match opt_str(&patch, "role") {
        None => old_role.clone(),
        Some(r) => {
            if !ROLES.contains(&r.as_str()) {
                return Err(HandlerErr::validation(
                    "role",
                    format!("role must be one of {}", ROLES.join(", ")),
                ));
            }
            // A role is never changeable by the account itself.
            if user_id == session.principal && r != old_role {
                return Err(HandlerErr::validation("role", "cannot change your own role"));
            }
            r
        }
    };
    let password = match opt_str(&patch, "password") {
        Some(p) if p.len() < 6 => {
            return Err(HandlerErr::validation(
                "password",
                "password must be at least 6 characters",
            ));
        }
        p => p,
    };
    // Hashes are salted by email, so a new email invalidates the stored hash;
    // an email change without a fresh password would lock the account out.
    if password.is_none() && email != old_email {
        return Err(HandlerErr::validation(
            "email",
            "changing the email requires setting a new password",
        ));
    }

    // Every check has passed; the row is written exactly once.
    match password {
        Some(p) => conn.execute(
            "UPDATE users
             SET email = ?, name = ?, role = ?, password_hash = ?,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
             WHERE id = ?",
            (
                &email,
                &name,
                &role,
                auth::hash_password(&email, &p),
                &user_id,
            ),
        ),
        None => conn.execute(
            "UPDATE users
             SET email = ?, name = ?, role = ?,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
             WHERE id = ?",
            (&email, &name, &role, &user_id),
        ),
    }
    .map_err(|e| HandlerErr::update("users", e))?;

    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "users.list" => require_db(state).and_then(|conn| list(conn)),
        "users.create" => require_db(state).and_then(|conn| create(conn, &req.params)),
        "users.update" => {
            let st: &AppState = state;
            require_db(st).and_then(|conn| {
                let session = require_session(st)?;
                update(conn, session, &req.params)
            })
        }
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}
