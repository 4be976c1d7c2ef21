use crate::bulletin;
use crate::ipc::helpers::{parse_rounding, require_class, required_str, respond, store_ref, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use tracing::info;

fn to_json<T: serde::Serialize>(v: &T) -> Result<serde_json::Value, HandlerErr> {
    serde_json::to_value(v).map_err(|e| HandlerErr::new("store_failed", e.to_string()))
}

fn handle_bulletin(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(req, "classId")?;
    let student_id = required_str(req, "studentId")?;
    let store = store_ref(state)?;
    let class_name = require_class(store, &class_id)?;
    let config = store.school_config();
    let mode = parse_rounding(req, config.default_rounding)?;

    let students = store.class_students(&class_id);
    if !students.iter().any(|s| s.id == student_id) {
        return Err(HandlerErr::new("not_found", "student not found in class")
            .with_details(json!({ "studentId": student_id, "classId": class_id })));
    }

    // Ranks on a single card need the whole class.
    let report = bulletin::build_class_report(&students, &class_name, &config, mode);
    let card = report
        .cards
        .iter()
        .find(|c| c.student_id == student_id)
        .ok_or_else(|| HandlerErr::new("not_found", "student not found in class"))?;
    Ok(json!({
        "bulletin": to_json(card)?,
        "subjectStats": to_json(&report.subject_stats)?,
    }))
}

fn handle_class_bulletins(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(req, "classId")?;
    let store = store_ref(state)?;
    let class_name = require_class(store, &class_id)?;
    let config = store.school_config();
    let mode = parse_rounding(req, config.default_rounding)?;

    let students = store.class_students(&class_id);
    let report = bulletin::build_class_report(&students, &class_name, &config, mode);
    info!(
        class_id = %class_id,
        cards = report.cards.len(),
        rounding = mode.as_str(),
        "class bulletins built"
    );
    to_json(&report)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.bulletin" => Some(respond(req, handle_bulletin(state, req))),
        "reports.classBulletins" => Some(respond(req, handle_class_bulletins(state, req))),
        _ => None,
    }
}
