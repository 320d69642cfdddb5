use super::error::err;
use super::handlers;
use super::types::{AppState, Request};
use crate::auth;

/// Methods reachable without a signed-in session. Everything else passes the
/// role gate before any handler sees it.
const PUBLIC_METHODS: &[&str] = &[
    "health",
    "workspace.select",
    "guard.route",
    "auth.register",
    "auth.login",
    "auth.logout",
    "auth.whoami",
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if !PUBLIC_METHODS.contains(&req.method.as_str()) {
        // A session whose role failed to resolve counts as unauthenticated.
        let role = state.session.as_ref().and_then(|s| s.role);
        match role {
            None => return err(&req.id, "unauthenticated", "sign in first", None),
            Some(role) => {
                if !auth::role_allows_method(role, &req.method) {
                    return err(
                        &req.id,
                        "forbidden",
                        format!("role {} may not call {}", role.as_str(), req.method),
                        None,
                    );
                }
            }
        }
    }

    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::auth::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::users::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::classes::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::ledger::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::schedule::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::proofs::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::notifications::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::contact::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::reports::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::backup_bundle::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
