use crate::db;
use crate::events::{ChangeKind, Collection};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    optional_level, optional_semester, optional_str, optional_units, require_db, required_level,
    required_semester, required_str, view_filter,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Course;
use rusqlite::Connection;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

fn courses_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let filter = view_filter(&req.params)?;
    let catalog = db::load_catalog(conn).map_err(HandlerErr::db_query)?;
    let courses: Vec<&Course> = filter.courses(&catalog).collect();
    Ok(json!({ "courses": courses }))
}

fn courses_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let course_id = required_str(&req.params, "courseId")?;
    let course = db::get_course(conn, &course_id)
        .map_err(HandlerErr::db_query)?
        .ok_or_else(|| HandlerErr::not_found("course"))?;
    Ok(json!({ "course": course }))
}

/// Code match is a case-insensitive substring, as is the title match.
fn courses_search(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let filter = view_filter(&req.params)?;
    let code = optional_str(&req.params, "code")?.map(|s| s.to_ascii_lowercase());
    let title = optional_str(&req.params, "title")?.map(|s| s.to_lowercase());

    let catalog = db::load_catalog(conn).map_err(HandlerErr::db_query)?;
    let courses: Vec<&Course> = filter
        .courses(&catalog)
        .filter(|c| {
            code.as_deref()
                .map_or(true, |q| c.code.to_ascii_lowercase().contains(q))
        })
        .filter(|c| {
            title
                .as_deref()
                .map_or(true, |q| c.title.to_lowercase().contains(q))
        })
        .collect();
    Ok(json!({ "courses": courses }))
}

fn ensure_code_free(conn: &Connection, course: &Course) -> Result<(), HandlerErr> {
    let taken = db::course_code_taken(
        conn,
        course.level,
        course.semester,
        &course.code,
        Some(&course.id),
    )
    .map_err(HandlerErr::db_query)?;
    if taken {
        return Err(HandlerErr::new(
            "conflict",
            "course code already exists for this level and semester",
        )
        .with_details(json!({
            "code": course.code,
            "level": course.level,
            "semester": course.semester,
        })));
    }
    Ok(())
}

fn courses_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let p = &req.params;
    let course = Course {
        id: Uuid::new_v4().to_string(),
        code: required_str(p, "code")?,
        title: required_str(p, "title")?,
        level: required_level(p, "level")?,
        units: optional_units(p, "units")?
            .ok_or_else(|| HandlerErr::bad_params("missing units"))?,
        department: required_str(p, "department")?,
        semester: required_semester(p, "semester")?,
    };
    ensure_code_free(conn, &course)?;
    db::insert_course(conn, &course).map_err(|e| HandlerErr::db_write("courses", e))?;

    info!(code = %course.code, level = %course.level, "course created");
    state
        .events
        .push(Collection::Courses, course.id.clone(), ChangeKind::Created);
    Ok(json!({ "courseId": course.id, "course": course }))
}

/// Partial update. Stored GPA figures are not touched here; they are
/// recomputed from the live catalog on the next result save or promotion.
fn courses_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let p = &req.params;
    let course_id = required_str(p, "courseId")?;
    let mut course = db::get_course(conn, &course_id)
        .map_err(HandlerErr::db_query)?
        .ok_or_else(|| HandlerErr::not_found("course"))?;

    if let Some(v) = optional_str(p, "code")? {
        course.code = v;
    }
    if let Some(v) = optional_str(p, "title")? {
        course.title = v;
    }
    if let Some(v) = optional_level(p, "level")? {
        course.level = v;
    }
    if let Some(v) = optional_units(p, "units")? {
        course.units = v;
    }
    if let Some(v) = optional_str(p, "department")? {
        course.department = v;
    }
    if let Some(v) = optional_semester(p, "semester")? {
        course.semester = v;
    }

    ensure_code_free(conn, &course)?;
    db::update_course(conn, &course).map_err(|e| HandlerErr::db_write("courses", e))?;
    state
        .events
        .push(Collection::Courses, course.id.clone(), ChangeKind::Updated);
    Ok(json!({ "course": course }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "courses.list" => courses_list(state, req),
        "courses.get" => courses_get(state, req),
        "courses.search" => courses_search(state, req),
        "courses.create" => courses_create(state, req),
        "courses.update" => courses_update(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
