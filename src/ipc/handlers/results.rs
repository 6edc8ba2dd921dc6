use crate::calc::{compute_cumulative, compute_level_gpa, parse_score};
use crate::db;
use crate::events::{ChangeKind, Collection};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{grade_scale, optional_semester, require_db, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::ScoreMap;
use serde_json::json;
use tracing::{debug, info};

fn results_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    let semester = optional_semester(&req.params, "semester")?;
    let scale = grade_scale(conn)?;
    let catalog = db::load_catalog(conn).map_err(HandlerErr::db_query)?;
    let student = db::load_student(conn, &student_id)
        .map_err(HandlerErr::db_query)?
        .ok_or_else(|| HandlerErr::not_found("student"))?;

    let levels: Vec<serde_json::Value> = student
        .results
        .iter()
        .map(|(level, scores)| {
            let courses = catalog
                .iter()
                .filter(|c| c.level == *level)
                .filter(|c| semester.map_or(true, |s| c.semester == s));
            let summary = compute_level_gpa(&scale, scores, courses);
            json!({
                "level": level,
                "scores": scores,
                "summary": summary,
            })
        })
        .collect();
    let cumulative = compute_cumulative(&scale, &student.results, &catalog);

    Ok(json!({
        "studentId": student.id,
        "level": student.level,
        "levels": levels,
        "carryOverCourses": student.carry_over_courses,
        "cumulative": cumulative,
    }))
}

/// Record scores for the student's current level and refresh the stored GPA,
/// carry-over flag and cumulative totals.
fn results_save(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let p = &req.params;
    let student_id = required_str(p, "studentId")?;
    let semester = optional_semester(p, "semester")?;
    let Some(raw_scores) = p.get("scores").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("scores must be an object of courseCode -> score"));
    };

    let scale = grade_scale(conn)?;
    let catalog = db::load_catalog(conn).map_err(HandlerErr::db_query)?;
    let mut student = db::load_student(conn, &student_id)
        .map_err(HandlerErr::db_query)?
        .ok_or_else(|| HandlerErr::not_found("student"))?;

    let mut accepted = ScoreMap::new();
    let mut ignored = Vec::new();
    for (code, v) in raw_scores {
        let code = code.trim();
        match parse_score(v) {
            Some(score) if !code.is_empty() => {
                accepted.insert(code.to_string(), score);
            }
            _ => ignored.push(code.to_string()),
        }
    }
    let unknown: Vec<&String> = accepted
        .keys()
        .filter(|code| !catalog.iter().any(|c| c.level == student.level && &c.code == *code))
        .collect();
    if !ignored.is_empty() || !unknown.is_empty() {
        debug!(student_id = %student.id, ?ignored, ?unknown, "results saved with skipped entries");
    }

    let level = student.level;
    let current = student.results.entry(level).or_default();
    current.extend(accepted.iter().map(|(k, v)| (k.clone(), *v)));
    let courses = catalog
        .iter()
        .filter(|c| c.level == level)
        .filter(|c| semester.map_or(true, |s| c.semester == s));
    let summary = compute_level_gpa(&scale, current, courses);

    let cumulative = compute_cumulative(&scale, &student.results, &catalog);
    student.gpa = summary.gpa;
    student.carry_over = !summary.failed_courses.is_empty() || !student.carry_over_courses.is_empty();
    student.total_tnu = cumulative.total_tnu;
    student.total_tcp = cumulative.total_tcp;
    student.cgpa = cumulative.cgpa;

    db::save_level_scores(conn, &student, &accepted)
        .map_err(|e| HandlerErr::db_write("student_results", e))?;

    info!(
        student_id = %student.id,
        level = %level,
        saved = accepted.len(),
        gpa = summary.gpa,
        "results saved"
    );
    let response = json!({
        "studentId": student.id,
        "level": level,
        "saved": accepted.keys().collect::<Vec<_>>(),
        "ignored": ignored,
        "unknownCourses": unknown,
        "summary": summary,
        "cumulative": cumulative,
        "carryOver": student.carry_over,
    });
    state
        .events
        .push(Collection::Results, student.id.clone(), ChangeKind::Updated);
    Ok(response)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "results.get" => results_get(state, req),
        "results.save" => results_save(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
