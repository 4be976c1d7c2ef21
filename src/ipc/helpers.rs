use crate::calc::RoundingMode;
use crate::ipc::types::{AppState, Request};
use crate::store::Store;
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    /// `{id, ok: false, error: {code, message, details?}}`
    pub fn response(self, id: &str) -> serde_json::Value {
        let mut error = json!({ "code": self.code, "message": self.message });
        if let Some(d) = self.details {
            error["details"] = d;
        }
        json!({ "id": id, "ok": false, "error": error })
    }
}

pub fn respond(req: &Request, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => json!({ "id": req.id, "ok": true, "result": v }),
        Err(e) => e.response(&req.id),
    }
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn store_ref(state: &AppState) -> Result<&Store, HandlerErr> {
    state
        .store
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn store_mut(state: &mut AppState) -> Result<&mut Store, HandlerErr> {
    state
        .store
        .as_mut()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn persist(store: &mut Store) -> Result<(), HandlerErr> {
    store
        .commit()
        .map_err(|e| HandlerErr::new("store_failed", format!("{e:#}")))
}

pub fn require_class(store: &Store, class_id: &str) -> Result<String, HandlerErr> {
    store
        .class(class_id)
        .map(|c| c.name.clone())
        .ok_or_else(|| {
            HandlerErr::new("not_found", "class not found").with_details(json!({ "classId": class_id }))
        })
}

/// `params.rounding`, falling back to the workspace default when absent.
pub fn parse_rounding(req: &Request, default: RoundingMode) -> Result<RoundingMode, HandlerErr> {
    match req.params.get("rounding") {
        None => Ok(default),
        Some(v) if v.is_null() => Ok(default),
        Some(v) => v
            .as_str()
            .and_then(RoundingMode::parse)
            .ok_or_else(|| {
                HandlerErr::bad_params("rounding must be one of: none, quarter, half, integer")
                    .with_details(json!({ "rounding": v }))
            }),
    }
}

pub fn finite_f64(v: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    v.as_f64()
        .filter(|n| n.is_finite())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key)))
}

pub fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
