use crate::calc;
use crate::ipc::helpers::{
    now_stamp, persist, require_class, required_str, respond, store_mut, store_ref, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Student;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

const NAME_MAX_LEN: usize = 60;

fn parse_name_value(v: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let s = v
        .as_str()
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string", key)))?
        .trim();
    if s.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    if s.chars().count() > NAME_MAX_LEN {
        return Err(HandlerErr::bad_params(format!(
            "{} length must be <= {}",
            key, NAME_MAX_LEN
        )));
    }
    Ok(s.to_string())
}

fn not_found(student_id: &str) -> HandlerErr {
    HandlerErr::new("not_found", "student not found").with_details(json!({ "studentId": student_id }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(req, "classId")?;
    let store = store_ref(state)?;
    require_class(store, &class_id)?;
    let config = store.school_config();

    // Averages are derived from the grade list on every call, never cached.
    let students: Vec<serde_json::Value> = store
        .class_students(&class_id)
        .iter()
        .map(|s| {
            let lines = calc::subject_lines(s, &config.subjects, &config.subject_weights);
            let graded = lines.iter().filter(|l| l.weight.is_some()).count();
            let average = (graded > 0).then(|| calc::overall_from_lines(&lines));
            json!({
                "id": s.id,
                "lastName": s.last_name,
                "firstName": s.first_name,
                "displayName": s.display_name(),
                "sortOrder": s.sort_order,
                "gradeCount": s.grades.len(),
                "gradedSubjects": graded,
                "average": average,
                "updatedAt": s.updated_at,
            })
        })
        .collect();
    Ok(json!({ "students": students }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(req, "classId")?;
    let last_name = parse_name_value(
        req.params.get("lastName").unwrap_or(&serde_json::Value::Null),
        "lastName",
    )?;
    let first_name = parse_name_value(
        req.params.get("firstName").unwrap_or(&serde_json::Value::Null),
        "firstName",
    )?;

    let store = store_mut(state)?;
    require_class(store, &class_id)?;
    let student_id = Uuid::new_v4().to_string();
    let sort_order = store.next_sort_order(&class_id);
    store.data.students.push(Student {
        id: student_id.clone(),
        class_id: class_id.clone(),
        last_name,
        first_name,
        sort_order,
        grades: Vec::new(),
        bonuses: BTreeMap::new(),
        updated_at: Some(now_stamp()),
    });
    persist(store)?;
    info!(student_id = %student_id, class_id = %class_id, "student created");
    Ok(json!({ "studentId": student_id, "sortOrder": sort_order }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let mut last_name = None;
    let mut first_name = None;
    let mut sort_order = None;
    for (k, v) in patch {
        match k.as_str() {
            "lastName" => last_name = Some(parse_name_value(v, k)?),
            "firstName" => first_name = Some(parse_name_value(v, k)?),
            "sortOrder" => {
                let n = v
                    .as_i64()
                    .filter(|n| *n >= 0)
                    .ok_or_else(|| HandlerErr::bad_params("sortOrder must be a non-negative integer"))?;
                sort_order = Some(n);
            }
            _ => {
                return Err(HandlerErr::bad_params(format!("unknown student field: {}", k)));
            }
        }
    }

    let store = store_mut(state)?;
    {
        let student = store
            .student_mut(&student_id)
            .ok_or_else(|| not_found(&student_id))?;
        if let Some(v) = last_name {
            student.last_name = v;
        }
        if let Some(v) = first_name {
            student.first_name = v;
        }
        if let Some(v) = sort_order {
            student.sort_order = v;
        }
        student.updated_at = Some(now_stamp());
    }
    persist(store)?;
    Ok(json!({ "ok": true }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    let store = store_mut(state)?;
    if store.student(&student_id).is_none() {
        return Err(not_found(&student_id));
    }
    store.data.students.retain(|s| s.id != student_id);
    persist(store)?;
    info!(student_id = %student_id, "student deleted");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(respond(req, handle_students_list(state, req))),
        "students.create" => Some(respond(req, handle_students_create(state, req))),
        "students.update" => Some(respond(req, handle_students_update(state, req))),
        "students.delete" => Some(respond(req, handle_students_delete(state, req))),
        _ => None,
    }
}
