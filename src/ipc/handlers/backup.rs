use crate::backup;
use crate::ipc::helpers::{respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, Store};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn path_param(req: &Request, key: &str) -> Result<PathBuf, HandlerErr> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(PathBuf::from(v.trim())),
        _ => Err(HandlerErr::bad_params(format!("missing {}", key))),
    }
}

fn workspace_param(state: &AppState, req: &Request) -> Result<PathBuf, HandlerErr> {
    req.params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn handle_export_bundle(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let out = path_param(req, "outPath")?;
    let workspace_path = workspace_param(state, req)?;

    // Flush the in-memory document so the bundle holds the latest edits.
    if state.workspace.as_deref() == Some(workspace_path.as_path()) {
        if let Some(store) = state.store.as_ref() {
            store
                .save()
                .map_err(|e| HandlerErr::new("store_failed", format!("{e:#}")))?;
        }
    }

    let export = backup::export_workspace_bundle(&workspace_path, &out).map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}"))
            .with_details(json!({ "path": out.to_string_lossy() }))
    })?;
    info!(path = %out.display(), sha256 = %export.sha256, "workspace bundle exported");

    Ok(json!({
        "ok": true,
        "path": out.to_string_lossy(),
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "sha256": export.sha256,
    }))
}

fn handle_import_bundle(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let src = path_param(req, "inPath")?;
    let workspace_path = workspace_param(state, req)?;
    if !src.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": src.to_string_lossy() })));
    }

    let import = backup::import_workspace_bundle(&src, &workspace_path, |bytes| {
        store::parse_workspace_bytes(bytes).map(|_| ())
    })
    .map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}"))
            .with_details(json!({ "path": src.to_string_lossy() }))
    })?;

    let store = Store::open(&workspace_path)
        .map_err(|e| HandlerErr::new("store_failed", format!("{e:#}")))?;
    info!(
        path = %workspace_path.display(),
        format = %import.bundle_format_detected,
        students = store.data.students.len(),
        "workspace bundle imported"
    );
    state.workspace = Some(workspace_path.clone());
    state.store = Some(store);

    Ok(json!({
        "ok": true,
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(respond(req, handle_export_bundle(state, req))),
        "backup.importWorkspaceBundle" => Some(respond(req, handle_import_bundle(state, req))),
        _ => None,
    }
}
