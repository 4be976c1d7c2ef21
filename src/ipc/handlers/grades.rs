use crate::calc;
use crate::ipc::helpers::{
    finite_f64, now_stamp, persist, required_str, respond, store_mut, store_ref, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Grade;
use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

const GRADE_MIN: f64 = 0.0;
const GRADE_MAX: f64 = 20.0;
const COEFFICIENT_MAX: u64 = 100;
const SUBJECT_MAX_LEN: usize = 60;
const TYPE_MAX_LEN: usize = 40;

/// Grade fields as supplied by the entry form. Range checks live here so the
/// averaging code can stay free of validation.
#[derive(Default)]
struct GradeInput {
    subject: Option<String>,
    value: Option<f64>,
    coefficient: Option<u32>,
    kind: Option<String>,
    date: Option<Option<NaiveDate>>,
}

fn parse_grade_fields(obj: &Map<String, Value>, allow_unknown: bool) -> Result<GradeInput, HandlerErr> {
    let mut input = GradeInput::default();
    for (k, v) in obj {
        match k.as_str() {
            "subject" => {
                let s = v
                    .as_str()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| HandlerErr::bad_params("subject must be a non-empty string"))?;
                if s.chars().count() > SUBJECT_MAX_LEN {
                    return Err(HandlerErr::bad_params(format!(
                        "subject length must be <= {}",
                        SUBJECT_MAX_LEN
                    )));
                }
                input.subject = Some(s.to_string());
            }
            "value" => {
                let n = finite_f64(v, "value")?;
                if !(GRADE_MIN..=GRADE_MAX).contains(&n) {
                    return Err(HandlerErr::bad_params(format!(
                        "value must be in {}..={}",
                        GRADE_MIN, GRADE_MAX
                    ))
                    .with_details(json!({ "value": n })));
                }
                input.value = Some(n);
            }
            "coefficient" => {
                let n = v
                    .as_u64()
                    .filter(|n| (1..=COEFFICIENT_MAX).contains(n))
                    .ok_or_else(|| {
                        HandlerErr::bad_params(format!(
                            "coefficient must be an integer in 1..={}",
                            COEFFICIENT_MAX
                        ))
                        .with_details(json!({ "coefficient": v }))
                    })?;
                input.coefficient = Some(n as u32);
            }
            "type" => {
                let s = v
                    .as_str()
                    .ok_or_else(|| HandlerErr::bad_params("type must be string"))?
                    .trim();
                if s.chars().count() > TYPE_MAX_LEN {
                    return Err(HandlerErr::bad_params(format!(
                        "type length must be <= {}",
                        TYPE_MAX_LEN
                    )));
                }
                input.kind = Some(s.to_string());
            }
            "date" => {
                if v.is_null() {
                    input.date = Some(None);
                    continue;
                }
                let s = v
                    .as_str()
                    .ok_or_else(|| HandlerErr::bad_params("date must be YYYY-MM-DD or null"))?;
                let d = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
                    HandlerErr::bad_params("date must be YYYY-MM-DD or null")
                        .with_details(json!({ "date": s }))
                })?;
                input.date = Some(Some(d));
            }
            _ if allow_unknown => {}
            _ => return Err(HandlerErr::bad_params(format!("unknown grade field: {}", k))),
        }
    }
    Ok(input)
}

fn student_not_found(student_id: &str) -> HandlerErr {
    HandlerErr::new("not_found", "student not found").with_details(json!({ "studentId": student_id }))
}

fn grade_not_found(grade_id: &str) -> HandlerErr {
    HandlerErr::new("not_found", "grade not found").with_details(json!({ "gradeId": grade_id }))
}

fn handle_grades_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    let subject = req
        .params
        .get("subject")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let store = store_ref(state)?;
    let student = store
        .student(&student_id)
        .ok_or_else(|| student_not_found(&student_id))?;
    let grades: Vec<&Grade> = student
        .grades
        .iter()
        .filter(|g| subject.map(|s| g.subject == s).unwrap_or(true))
        .collect();
    Ok(json!({ "grades": grades }))
}

fn handle_grades_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    let Some(obj) = req.params.as_object() else {
        return Err(HandlerErr::bad_params("params must be an object"));
    };
    let input = parse_grade_fields(obj, true)?;
    let (Some(subject), Some(value), Some(coefficient)) =
        (input.subject, input.value, input.coefficient)
    else {
        return Err(HandlerErr::bad_params(
            "subject, value and coefficient are required",
        ));
    };

    let store = store_mut(state)?;
    let grade_id = Uuid::new_v4().to_string();
    let subject_average = {
        let student = store
            .student_mut(&student_id)
            .ok_or_else(|| student_not_found(&student_id))?;
        student.grades.push(Grade {
            id: grade_id.clone(),
            subject: subject.clone(),
            value,
            coefficient,
            kind: input.kind.unwrap_or_default(),
            date: input.date.flatten(),
        });
        student.updated_at = Some(now_stamp());
        calc::subject_average(&student.grades, &subject)
    };
    persist(store)?;
    debug!(student_id = %student_id, subject = %subject, value, coefficient, "grade created");
    Ok(json!({ "gradeId": grade_id, "subjectAverage": subject_average }))
}

fn handle_grades_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    let grade_id = required_str(req, "gradeId")?;
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    let input = parse_grade_fields(patch, false)?;

    let store = store_mut(state)?;
    let subject_average = {
        let student = store
            .student_mut(&student_id)
            .ok_or_else(|| student_not_found(&student_id))?;
        let grade = student
            .grades
            .iter_mut()
            .find(|g| g.id == grade_id)
            .ok_or_else(|| grade_not_found(&grade_id))?;
        if let Some(v) = input.subject {
            grade.subject = v;
        }
        if let Some(v) = input.value {
            grade.value = v;
        }
        if let Some(v) = input.coefficient {
            grade.coefficient = v;
        }
        if let Some(v) = input.kind {
            grade.kind = v;
        }
        if let Some(v) = input.date {
            grade.date = v;
        }
        let subject = grade.subject.clone();
        student.updated_at = Some(now_stamp());
        calc::subject_average(&student.grades, &subject)
    };
    persist(store)?;
    Ok(json!({ "ok": true, "subjectAverage": subject_average }))
}

fn handle_grades_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    let grade_id = required_str(req, "gradeId")?;
    let store = store_mut(state)?;
    {
        let student = store
            .student_mut(&student_id)
            .ok_or_else(|| student_not_found(&student_id))?;
        let before = student.grades.len();
        student.grades.retain(|g| g.id != grade_id);
        if student.grades.len() == before {
            return Err(grade_not_found(&grade_id));
        }
        student.updated_at = Some(now_stamp());
    }
    persist(store)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "grades.list" => Some(respond(req, handle_grades_list(state, req))),
        "grades.create" => Some(respond(req, handle_grades_create(state, req))),
        "grades.update" => Some(respond(req, handle_grades_update(state, req))),
        "grades.delete" => Some(respond(req, handle_grades_delete(state, req))),
        _ => None,
    }
}
