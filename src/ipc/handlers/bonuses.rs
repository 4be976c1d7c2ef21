use crate::ipc::helpers::{
    finite_f64, now_stamp, persist, require_class, required_str, respond, store_mut, store_ref,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::SubjectBonus;
use serde_json::json;
use tracing::info;

const SAVE_ALL_MAX_ENTRIES: usize = 5000;

struct BonusEdit {
    student_id: String,
    subject: String,
    bonus: SubjectBonus,
}

fn handle_bonuses_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    let store = store_ref(state)?;
    let student = store.student(&student_id).ok_or_else(|| {
        HandlerErr::new("not_found", "student not found")
            .with_details(json!({ "studentId": student_id }))
    })?;
    Ok(json!({ "bonuses": student.bonuses }))
}

fn parse_edit(i: usize, raw: &serde_json::Value) -> Result<BonusEdit, HandlerErr> {
    let at = |msg: &str| HandlerErr::bad_params(msg.to_string()).with_details(json!({ "index": i }));
    let Some(obj) = raw.as_object() else {
        return Err(at("entries must be objects"));
    };
    let student_id = obj
        .get("studentId")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| at("entry.studentId is required"))?;
    let subject = obj
        .get("subject")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| at("entry.subject is required"))?;
    let average_bonus = match obj.get("averageBonus") {
        None => 0.0,
        Some(v) if v.is_null() => 0.0,
        Some(v) => finite_f64(v, "averageBonus").map_err(|e| e.with_details(json!({ "index": i })))?,
    };
    let point_bonus = match obj.get("pointBonus") {
        None => 0.0,
        Some(v) if v.is_null() => 0.0,
        Some(v) => finite_f64(v, "pointBonus").map_err(|e| e.with_details(json!({ "index": i })))?,
    };
    Ok(BonusEdit {
        student_id: student_id.to_string(),
        subject: subject.to_string(),
        bonus: SubjectBonus {
            average_bonus,
            point_bonus,
        },
    })
}

/// Bulk "save all" of the bonus grid. Every entry is checked before any is
/// applied; a zero bonus clears the subject's entry.
fn handle_bonuses_save_all(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(req, "classId")?;
    let Some(raw_entries) = req.params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("entries must be an array"));
    };
    if raw_entries.len() > SAVE_ALL_MAX_ENTRIES {
        return Err(HandlerErr::bad_params(format!(
            "entries length must be <= {}",
            SAVE_ALL_MAX_ENTRIES
        )));
    }
    let edits = raw_entries
        .iter()
        .enumerate()
        .map(|(i, raw)| parse_edit(i, raw))
        .collect::<Result<Vec<_>, _>>()?;

    let store = store_mut(state)?;
    require_class(store, &class_id)?;
    for (i, edit) in edits.iter().enumerate() {
        let in_class = store
            .student(&edit.student_id)
            .map(|s| s.class_id == class_id)
            .unwrap_or(false);
        if !in_class {
            return Err(HandlerErr::new("not_found", "student not found in class")
                .with_details(json!({ "index": i, "studentId": edit.student_id })));
        }
    }

    let mut saved = 0_usize;
    let mut cleared = 0_usize;
    let stamp = now_stamp();
    for edit in edits {
        let Some(student) = store.student_mut(&edit.student_id) else {
            continue;
        };
        if edit.bonus.is_zero() {
            if student.bonuses.remove(&edit.subject).is_some() {
                cleared += 1;
            }
        } else {
            student.bonuses.insert(edit.subject, edit.bonus);
            saved += 1;
        }
        student.updated_at = Some(stamp.clone());
    }
    persist(store)?;
    info!(class_id = %class_id, saved, cleared, "bonuses saved");
    Ok(json!({ "ok": true, "saved": saved, "cleared": cleared }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "bonuses.get" => Some(respond(req, handle_bonuses_get(state, req))),
        "bonuses.saveAll" => Some(respond(req, handle_bonuses_save_all(state, req))),
        _ => None,
    }
}
