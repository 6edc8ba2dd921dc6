use crate::db;
use crate::events::{ChangeKind, Collection};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    optional_bool, optional_level, optional_semester, optional_str, require_db, required_level,
    required_semester, required_str, view_filter,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Lecturer;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

/// Fill the course title from the catalog when the lecturer's course code is
/// offered at their level and semester. Unknown codes keep the given title.
fn resolve_course_title(conn: &Connection, lecturer: &mut Lecturer) -> Result<(), HandlerErr> {
    let catalog = db::load_catalog(conn).map_err(HandlerErr::db_query)?;
    let found = catalog
        .iter()
        .find(|c| {
            c.code == lecturer.course_code
                && c.level == lecturer.level
                && c.semester == lecturer.semester
        })
        .or_else(|| catalog.iter().find(|c| c.code == lecturer.course_code));
    if let Some(course) = found {
        lecturer.course_title = course.title.clone();
    }
    Ok(())
}

fn lecturers_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let filter = view_filter(&req.params)?;
    let lecturers: Vec<Lecturer> = db::load_lecturers(conn)
        .map_err(HandlerErr::db_query)?
        .into_iter()
        .filter(|l| filter.matches_lecturer(l))
        .collect();
    Ok(json!({ "lecturers": lecturers }))
}

fn lecturers_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let p = &req.params;
    let mut lecturer = Lecturer {
        id: Uuid::new_v4().to_string(),
        name: required_str(p, "name")?,
        course_code: required_str(p, "courseCode")?,
        course_title: optional_str(p, "courseTitle")?.unwrap_or_default(),
        level: required_level(p, "level")?,
        semester: required_semester(p, "semester")?,
        results_submitted: optional_bool(p, "resultsSubmitted")?.unwrap_or(false),
    };
    resolve_course_title(conn, &mut lecturer)?;
    db::upsert_lecturer(conn, &lecturer).map_err(|e| HandlerErr::db_write("lecturers", e))?;
    state
        .events
        .push(Collection::Lecturers, lecturer.id.clone(), ChangeKind::Created);
    Ok(json!({ "lecturerId": lecturer.id, "lecturer": lecturer }))
}

fn lecturers_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let p = &req.params;
    let lecturer_id = required_str(p, "lecturerId")?;
    let mut lecturer = db::get_lecturer(conn, &lecturer_id)
        .map_err(HandlerErr::db_query)?
        .ok_or_else(|| HandlerErr::not_found("lecturer"))?;

    if let Some(v) = optional_str(p, "name")? {
        lecturer.name = v;
    }
    if let Some(v) = optional_str(p, "courseCode")? {
        lecturer.course_code = v;
    }
    if let Some(v) = optional_str(p, "courseTitle")? {
        lecturer.course_title = v;
    }
    if let Some(v) = optional_level(p, "level")? {
        lecturer.level = v;
    }
    if let Some(v) = optional_semester(p, "semester")? {
        lecturer.semester = v;
    }
    if let Some(v) = optional_bool(p, "resultsSubmitted")? {
        lecturer.results_submitted = v;
    }
    resolve_course_title(conn, &mut lecturer)?;

    db::upsert_lecturer(conn, &lecturer).map_err(|e| HandlerErr::db_write("lecturers", e))?;
    state
        .events
        .push(Collection::Lecturers, lecturer.id.clone(), ChangeKind::Updated);
    Ok(json!({ "lecturer": lecturer }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "lecturers.list" => lecturers_list(state, req),
        "lecturers.create" => lecturers_create(state, req),
        "lecturers.update" => lecturers_update(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
