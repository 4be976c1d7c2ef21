use crate::calc;
use crate::ipc::helpers::{parse_rounding, require_class, required_str, respond, store_ref, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::Student;
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;

fn names_by_id(students: &[Student]) -> HashMap<&str, String> {
    students
        .iter()
        .map(|s| (s.id.as_str(), s.display_name()))
        .collect()
}

fn handle_subject_average(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    let subject = required_str(req, "subject")?;
    let store = store_ref(state)?;
    let mode = parse_rounding(req, store.school_config().default_rounding)?;
    let student = store.student(&student_id).ok_or_else(|| {
        HandlerErr::new("not_found", "student not found")
            .with_details(json!({ "studentId": student_id }))
    })?;

    let totals = calc::subject_totals(&student.grades, &subject);
    let bonus = student.bonus_for(&subject);
    let average = calc::adjusted_average(totals.average, totals.coefficient, &bonus, mode);
    Ok(json!({
        "subject": subject,
        "rounding": mode,
        "rawAverage": totals.average,
        "totalCoefficient": totals.coefficient,
        "gradeCount": totals.count,
        "bonus": bonus,
        "average": average,
    }))
}

fn handle_subject_ranking(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(req, "classId")?;
    let subject = required_str(req, "subject")?;
    let store = store_ref(state)?;
    require_class(store, &class_id)?;
    let config = store.school_config();
    let mode = parse_rounding(req, config.default_rounding)?;

    let students = store.class_students(&class_id);
    let names = names_by_id(&students);
    let ranking = calc::rank_students_in_subject(&students, &subject, mode);
    debug!(class_id = %class_id, subject = %subject, rows = ranking.len(), "subject ranking");

    let rows: Vec<serde_json::Value> = ranking
        .iter()
        .map(|r| {
            json!({
                "studentId": r.student_id,
                "displayName": names.get(r.student_id.as_str()),
                "average": r.average,
                "hasGrades": r.has_grades,
                "rank": r.rank,
                "rankLabel": calc::ordinal_fr(r.rank),
                "appreciation": config.appreciation(r.average),
            })
        })
        .collect();
    Ok(json!({ "subject": subject, "rounding": mode, "rows": rows }))
}

fn handle_overall_ranking(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(req, "classId")?;
    let store = store_ref(state)?;
    require_class(store, &class_id)?;
    let config = store.school_config();

    let students = store.class_students(&class_id);
    let names = names_by_id(&students);
    let ranking = calc::rank_students_overall(&students, &config.subjects, &config.subject_weights);

    let rows: Vec<serde_json::Value> = ranking
        .global_rankings
        .iter()
        .map(|r| {
            json!({
                "studentId": r.student_id,
                "displayName": names.get(r.student_id.as_str()),
                "average": r.average,
                "gradedSubjects": r.graded_subjects,
                "rank": r.rank,
                "rankLabel": calc::ordinal_fr(r.rank),
                "appreciation": config.appreciation(r.average),
            })
        })
        .collect();
    Ok(json!({ "globalRankings": rows, "classStats": ranking.class_stats }))
}

fn handle_class_stats(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(req, "classId")?;
    let store = store_ref(state)?;
    require_class(store, &class_id)?;
    let config = store.school_config();
    let mode = parse_rounding(req, config.default_rounding)?;

    let students = store.class_students(&class_id);
    let ranking = calc::rank_students_overall(&students, &config.subjects, &config.subject_weights);
    let per_subject = calc::subject_class_stats(&students, &config.subjects, mode);
    Ok(json!({
        "rounding": mode,
        "overall": ranking.class_stats,
        "perSubject": per_subject,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calc.subjectAverage" => Some(respond(req, handle_subject_average(state, req))),
        "calc.subjectRanking" => Some(respond(req, handle_subject_ranking(state, req))),
        "calc.overallRanking" => Some(respond(req, handle_overall_ranking(state, req))),
        "calc.classStats" => Some(respond(req, handle_class_stats(state, req))),
        _ => None,
    }
}
