use crate::db;
use crate::events::{ChangeKind, Collection};
use crate::filter::normalize_session_year;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{optional_level, optional_str, require_db, required_str, view_filter};
use crate::ipc::types::{AppState, Request};
use crate::model::{Level, Student};
use rusqlite::Connection;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

fn session_year_param(raw: &str) -> Result<String, HandlerErr> {
    normalize_session_year(raw).ok_or_else(|| {
        HandlerErr::bad_params("sessionYear must look like 2023-2024")
            .with_details(json!({ "sessionYear": raw }))
    })
}

fn ensure_matric_free(conn: &Connection, matric: &str, except_id: Option<&str>) -> Result<(), HandlerErr> {
    let taken = db::matric_number_taken(conn, matric, except_id).map_err(HandlerErr::db_query)?;
    if taken {
        return Err(HandlerErr::new("conflict", "matric number already registered")
            .with_details(json!({ "matricNumber": matric })));
    }
    Ok(())
}

fn students_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let filter = view_filter(&req.params)?;
    let students: Vec<Student> = db::load_students(conn)
        .map_err(HandlerErr::db_query)?
        .into_iter()
        .filter(|s| filter.matches_student(s))
        .collect();
    Ok(json!({ "students": students }))
}

fn students_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    let student = db::load_student(conn, &student_id)
        .map_err(HandlerErr::db_query)?
        .ok_or_else(|| HandlerErr::not_found("student"))?;
    Ok(json!({ "student": student }))
}

fn students_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let p = &req.params;
    let name = required_str(p, "name")?;
    let matric_number = required_str(p, "matricNumber")?;
    let department = required_str(p, "department")?;
    let session_year = session_year_param(&required_str(p, "sessionYear")?)?;
    let level = optional_level(p, "level")?.unwrap_or(Level::L100);

    ensure_matric_free(conn, &matric_number, None)?;
    let student = Student::enrolled(
        Uuid::new_v4().to_string(),
        name,
        matric_number,
        department,
        level,
        session_year,
    );
    db::insert_student(conn, &student).map_err(|e| HandlerErr::db_write("students", e))?;

    info!(student_id = %student.id, level = %student.level, "student created");
    state
        .events
        .push(Collection::Students, student.id.clone(), ChangeKind::Created);
    Ok(json!({ "studentId": student.id, "student": student }))
}

/// Profile fields only. Level changes go through promotion and scores
/// through `results.save`.
fn students_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let p = &req.params;
    for locked in ["level", "results", "carryOverCourses", "cgpa", "gpa"] {
        if p.get(locked).is_some() {
            return Err(HandlerErr::bad_params(format!(
                "{locked} cannot be edited through students.update"
            )));
        }
    }
    let student_id = required_str(p, "studentId")?;
    let mut student = db::load_student(conn, &student_id)
        .map_err(HandlerErr::db_query)?
        .ok_or_else(|| HandlerErr::not_found("student"))?;

    if let Some(v) = optional_str(p, "name")? {
        student.name = v;
    }
    if let Some(v) = optional_str(p, "matricNumber")? {
        ensure_matric_free(conn, &v, Some(&student.id))?;
        student.matric_number = v;
    }
    if let Some(v) = optional_str(p, "department")? {
        student.department = v;
    }
    if let Some(v) = optional_str(p, "sessionYear")? {
        student.session_year = session_year_param(&v)?;
    }

    db::update_student_profile(conn, &student).map_err(|e| HandlerErr::db_write("students", e))?;
    state
        .events
        .push(Collection::Students, student.id.clone(), ChangeKind::Updated);
    Ok(json!({ "student": student }))
}

fn students_level_counts(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let counts = db::level_counts(conn).map_err(HandlerErr::db_query)?;
    let levels: Vec<serde_json::Value> = counts
        .into_iter()
        .map(|(level, count)| json!({ "level": level, "count": count }))
        .collect();
    Ok(json!({ "levels": levels }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => students_list(state, req),
        "students.get" => students_get(state, req),
        "students.create" => students_create(state, req),
        "students.update" => students_update(state, req),
        "students.levelCounts" => students_level_counts(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
