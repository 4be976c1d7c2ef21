use crate::config::{self, SchoolConfig};
use crate::ipc::helpers::{persist, respond, store_mut, store_ref, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use tracing::info;

const KNOWN_FIELDS: [&str; 7] = [
    "subjects",
    "subjectGroups",
    "fallbackGroup",
    "appreciations",
    "lowestAppreciation",
    "defaultRounding",
    "subjectWeights",
];

fn config_json(cfg: &SchoolConfig) -> Result<Value, HandlerErr> {
    serde_json::to_value(cfg).map_err(|e| HandlerErr::new("store_failed", e.to_string()))
}

fn handle_setup_get(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let store = store_ref(state)?;
    let cfg = store.school_config();
    Ok(json!({ "school": config_json(&cfg)? }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    if let Some(unknown) = patch.keys().find(|k| !KNOWN_FIELDS.contains(&k.as_str())) {
        return Err(HandlerErr::bad_params(format!("unknown school field: {}", unknown)));
    }

    let store = store_mut(state)?;
    let mut current = config_json(&store.school_config())?;
    let Some(obj) = current.as_object_mut() else {
        return Err(HandlerErr::new(
            "store_failed",
            "internal setup object must be a JSON object",
        ));
    };
    for (k, v) in patch {
        obj.insert(k.clone(), v.clone());
    }

    let cfg: SchoolConfig = serde_json::from_value(current)
        .map_err(|e| HandlerErr::bad_params(format!("invalid school config: {}", e)))?;
    let cfg = cfg.validated().map_err(|e| HandlerErr::bad_params(e))?;
    let stored = config_json(&cfg)?;
    store.settings_set_json(config::SETTINGS_KEY, stored.clone());
    persist(store)?;
    info!(fields = ?patch.keys().collect::<Vec<_>>(), "school config updated");
    Ok(json!({ "school": stored }))
}

fn handle_setup_reset(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let store = store_mut(state)?;
    store.settings_remove(config::SETTINGS_KEY);
    persist(store)?;
    Ok(json!({ "school": config_json(&SchoolConfig::default())? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(respond(req, handle_setup_get(state, req))),
        "setup.update" => Some(respond(req, handle_setup_update(state, req))),
        "setup.reset" => Some(respond(req, handle_setup_reset(state, req))),
        _ => None,
    }
}
