use crate::ipc::helpers::{persist, require_class, required_str, respond, store_mut, store_ref, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::ClassRecord;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

const CLASS_NAME_MAX_LEN: usize = 80;

fn parse_name(req: &Request) -> Result<String, HandlerErr> {
    let name = required_str(req, "name")?;
    if name.chars().count() > CLASS_NAME_MAX_LEN {
        return Err(HandlerErr::bad_params(format!(
            "name length must be <= {}",
            CLASS_NAME_MAX_LEN
        )));
    }
    Ok(name)
}

fn handle_classes_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_ref(state)?;
    let classes: Vec<serde_json::Value> = store
        .data
        .classes
        .iter()
        .map(|c| {
            let student_count = store
                .data
                .students
                .iter()
                .filter(|s| s.class_id == c.id)
                .count();
            json!({ "id": c.id, "name": c.name, "studentCount": student_count })
        })
        .collect();
    Ok(json!({ "classes": classes }))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let name = parse_name(req)?;
    let store = store_mut(state)?;
    let class_id = Uuid::new_v4().to_string();
    store.data.classes.push(ClassRecord {
        id: class_id.clone(),
        name: name.clone(),
    });
    persist(store)?;
    info!(class_id = %class_id, name = %name, "class created");
    Ok(json!({ "classId": class_id }))
}

fn handle_classes_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(req, "classId")?;
    let name = parse_name(req)?;
    let store = store_mut(state)?;
    require_class(store, &class_id)?;
    if let Some(class) = store.class_mut(&class_id) {
        class.name = name;
    }
    persist(store)?;
    Ok(json!({ "ok": true }))
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(req, "classId")?;
    let store = store_mut(state)?;
    require_class(store, &class_id)?;
    let before = store.data.students.len();
    store.data.students.retain(|s| s.class_id != class_id);
    let removed_students = before - store.data.students.len();
    store.data.classes.retain(|c| c.id != class_id);
    persist(store)?;
    info!(class_id = %class_id, removed_students, "class deleted");
    Ok(json!({ "ok": true, "removedStudents": removed_students }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(respond(req, handle_classes_list(state, req))),
        "classes.create" => Some(respond(req, handle_classes_create(state, req))),
        "classes.update" => Some(respond(req, handle_classes_update(state, req))),
        "classes.delete" => Some(respond(req, handle_classes_delete(state, req))),
        _ => None,
    }
}
