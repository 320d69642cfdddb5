use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{self, Role, RouteDecision, Session, SessionState};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{req_str, require_db, require_session};
use crate::ipc::types::{AppState, Request};

fn register(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let email = req_str(params, "email")?;
    if !email.contains('@') {
        return Err(HandlerErr::validation("email", "email must be a valid address"));
    }
    let password = req_str(params, "password")?;
    if password.len() < 6 {
        return Err(HandlerErr::validation(
            "password",
            "password must be at least 6 characters",
        ));
    }
    let name = req_str(params, "name")?;

    let conn = require_db(state)?;
    let taken: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE email = ?", [&email], |r| r.get(0))
        .optional()
        .map_err(HandlerErr::query)?;
    if taken.is_some() {
        return Err(HandlerErr::validation("email", "email is already registered"));
    }

    // Self-registration creates parent accounts. The very first account in a
    // fresh workspace bootstraps as admin so someone can run the portal.
    let user_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
        .map_err(HandlerErr::query)?;
    let role = if user_count == 0 { Role::Admin } else { Role::Parent };

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
            role.as_str(),
            auth::hash_password(&email, &password),
        ),
    )
    .map_err(|e| HandlerErr::insert("users", e))?;

    Ok(json!({ "userId": user_id, "role": role.as_str() }))
}

fn login(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let email = req_str(params, "email")?;
    let password = req_str(params, "password")?;

    let row = {
        let conn = require_db(state)?;
        conn.query_row(
            "SELECT id, name, role, password_hash FROM users WHERE email = ?",
            [&email],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            },
        )
        .optional()
        .map_err(HandlerErr::query)?
    };

    // One generic message for both a missing account and a wrong password.
    let Some((user_id, name, role_str, password_hash)) = row else {
        return Err(HandlerErr::new("auth_failed", "email or password incorrect"));
    };
    if !auth::verify_password(&email, &password, &password_hash) {
        return Err(HandlerErr::new("auth_failed", "email or password incorrect"));
    }

    let role = Role::from_str(&role_str);
    if role.is_none() {
        // Resolution failure maps to a null role, never a crash; the guard
        // will route this session to /login.
        eprintln!("role resolution failed for {}: unknown role {:?}", email, role_str);
    }

    state.session = Some(Session {
        principal: user_id.clone(),
        email: email.clone(),
        name: name.clone(),
        role,
    });

    Ok(json!({
        "principal": user_id,
        "email": email,
        "name": name,
        "role": role.map(|r| r.as_str()),
        "label": role.map(|r| auth::policy(r).label),
    }))
}

fn logout(state: &mut AppState) -> serde_json::Value {
    state.session = None;
    json!({ "ok": true })
}

fn whoami(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let Some(session) = state.session.as_ref() else {
        return Ok(json!({ "authenticated": false }));
    };
    Ok(json!({
        "authenticated": true,
        "principal": session.principal,
        "email": session.email,
        "name": session.name,
        "role": session.role.map(|r| r.as_str()),
        "label": session.role.map(|r| auth::policy(r).label),
    }))
}

fn change_password(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let old_password = req_str(params, "oldPassword")?;
    let new_password = req_str(params, "newPassword")?;
    if new_password.len() < 6 {
        return Err(HandlerErr::validation(
            "newPassword",
            "password must be at least 6 characters",
        ));
    }

    let (principal, email) = {
        let session = require_session(state)?;
        (session.principal.clone(), session.email.clone())
    };
    let conn = require_db(state)?;
    let stored: Option<String> = conn
        .query_row(
            "SELECT password_hash FROM users WHERE id = ?",
            [&principal],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some(stored) = stored else {
        return Err(HandlerErr::new("auth_failed", "account no longer exists"));
    };
    if !auth::verify_password(&email, &old_password, &stored) {
        return Err(HandlerErr::new("auth_failed", "email or password incorrect"));
    }

    conn.execute(
        "UPDATE users
         SET password_hash = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        (auth::hash_password(&email, &new_password), &principal),
    )
    .map_err(|e| HandlerErr::update("users", e))?;

    Ok(json!({ "ok": true }))
}

fn guard_route(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let path = req_str(params, "path")?;
    let session_state = match state.session.as_ref() {
        None => SessionState::Anonymous,
        Some(s) => SessionState::SignedIn(s.role),
    };
    // Resolution is synchronous in the daemon, so Wait never surfaces here.
    Ok(match auth::route_decision(session_state, &path) {
        RouteDecision::Wait => json!({ "decision": "wait" }),
        RouteDecision::Allow => json!({ "decision": "allow" }),
        RouteDecision::Redirect(target) => {
            json!({ "decision": "redirect", "target": target })
        }
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "auth.register" => register(state, &req.params),
        "auth.login" => login(state, &req.params),
        "auth.logout" => Ok(logout(state)),
        "auth.whoami" => whoami(state),
        "auth.changePassword" => change_password(state, &req.params),
        "guard.route" => guard_route(state, &req.params),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}
