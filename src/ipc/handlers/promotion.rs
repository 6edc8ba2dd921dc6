use crate::db;
use crate::events::{ChangeKind, Collection};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{grade_scale, optional_semester, require_db, required_str, view_filter};
use crate::ipc::types::{AppState, Request};
use crate::model::Student;
use crate::promotion::{failed_courses_for_current_level, promote, promote_all, OutcomeStatus};
use serde_json::json;
use tracing::{info, warn};

fn students_promote(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    let semester = optional_semester(&req.params, "semester")?;
    let scale = grade_scale(conn)?;
    let catalog = db::load_catalog(conn).map_err(HandlerErr::db_query)?;
    let student = db::load_student(conn, &student_id)
        .map_err(HandlerErr::db_query)?
        .ok_or_else(|| HandlerErr::not_found("student"))?;

    let failed = failed_courses_for_current_level(&scale, &student, &catalog, semester);
    let updated = promote(&scale, &student, &failed, &catalog).map_err(|e| {
        HandlerErr::new(e.code(), e.to_string()).with_details(json!({ "level": student.level }))
    })?;
    db::write_promotion(conn, &updated).map_err(|e| HandlerErr::db_write("students", e))?;

    info!(
        student_id = %updated.id,
        from = %student.level,
        to = %updated.level,
        "student promoted"
    );
    state
        .events
        .push(Collection::Students, updated.id.clone(), ChangeKind::Promoted);
    Ok(json!({
        "student": updated,
        "fromLevel": student.level,
        "failedCourses": failed,
    }))
}

/// Promote the filtered cohort. Each student is written on its own
/// connection; the reply lists every student's outcome.
fn students_promote_all(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let Some(workspace) = state.workspace.clone() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let filter = view_filter(&req.params)?;
    let scale = grade_scale(conn)?;
    let catalog = db::load_catalog(conn).map_err(HandlerErr::db_query)?;
    let cohort: Vec<Student> = db::load_students(conn)
        .map_err(HandlerErr::db_query)?
        .into_iter()
        .filter(|s| filter.matches_student(s))
        .collect();

    let report = promote_all(&scale, &cohort, &catalog, filter.semester, |student| {
        let writer = db::connect(&workspace)?;
        db::write_promotion(&writer, student)
    });

    if report.failed > 0 {
        warn!(
            failed = report.failed,
            promoted = report.promoted,
            "cohort promotion finished with write failures"
        );
    } else {
        info!(
            promoted = report.promoted,
            rejected = report.rejected,
            "cohort promoted"
        );
    }
    for outcome in report
        .outcomes
        .iter()
        .filter(|o| o.status == OutcomeStatus::Promoted)
    {
        state
            .events
            .push(Collection::Students, outcome.student_id.clone(), ChangeKind::Promoted);
    }
    Ok(json!({ "filter": filter, "report": report }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.promote" => students_promote(state, req),
        "students.promoteAll" => students_promote_all(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
