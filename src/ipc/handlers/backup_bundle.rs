use serde_json::json;
use std::path::PathBuf;

use crate::backup;
use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::req_str;
use crate::ipc::types::{AppState, Request};

fn workspace_for(state: &AppState, params: &serde_json::Value) -> Result<PathBuf, HandlerErr> {
    if let Some(p) = params.get("workspacePath").and_then(|v| v.as_str()) {
        return Ok(PathBuf::from(p));
    }
    state
        .workspace
        .clone()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn export_bundle(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let workspace = workspace_for(state, params)?;
    let out_path = PathBuf::from(req_str(params, "outPath")?);
    match backup::export_workspace_bundle(&workspace, &out_path) {
        Ok(summary) => Ok(json!({
            "outPath": out_path.to_string_lossy(),
            "bundleFormat": summary.bundle_format,
            "entryCount": summary.entry_count,
            "uploadCount": summary.upload_count,
        })),
        Err(e) => Err(HandlerErr::new("backup_failed", format!("{e:#}"))),
    }
}

fn import_bundle(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let workspace = workspace_for(state, params)?;
    let in_path = PathBuf::from(req_str(params, "inPath")?);

    // Release the open handle before the database file is replaced.
    state.db = None;
    let summary = backup::import_workspace_bundle(&in_path, &workspace)
        .map_err(|e| HandlerErr::new("restore_failed", format!("{e:#}")))?;

    match db::open_db(&workspace) {
        Ok(conn) => {
            state.workspace = Some(workspace);
            state.db = Some(conn);
            // Accounts in the restored database may differ; force re-login.
            state.session = None;
            Ok(json!({
                "bundleFormat": summary.bundle_format_detected,
                "uploadCount": summary.upload_count,
            }))
        }
        Err(e) => Err(HandlerErr::new("db_open_failed", format!("{e:?}"))),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => export_bundle(state, &req.params),
        "backup.importWorkspaceBundle" => import_bundle(state, &req.params),
        _ => return None,
    };
    Some(match out {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}
