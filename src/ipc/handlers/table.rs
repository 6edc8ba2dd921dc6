use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{grade_scale, require_db, required_str, view_filter};
use crate::ipc::types::{AppState, Request};
use crate::model::{Course, Lecturer, Student};
use crate::table::{fixed_columns, project, results_table, TableKind};
use serde_json::json;

fn table_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let raw_kind = required_str(&req.params, "collection")?;
    let Some(kind) = TableKind::parse(&raw_kind) else {
        return Err(HandlerErr::bad_params(
            "collection must be one of: courses, students, lecturers, results",
        )
        .with_details(json!({ "collection": raw_kind })));
    };
    let filter = view_filter(&req.params)?;

    let model = match kind {
        TableKind::Courses => {
            let catalog = db::load_catalog(conn).map_err(HandlerErr::db_query)?;
            let rows: Vec<&Course> = filter.courses(&catalog).collect();
            project(fixed_columns(kind).unwrap_or_default(), &rows)
        }
        TableKind::Students => {
            let students: Vec<Student> = db::load_students(conn)
                .map_err(HandlerErr::db_query)?
                .into_iter()
                .filter(|s| filter.matches_student(s))
                .collect();
            project(fixed_columns(kind).unwrap_or_default(), &students)
        }
        TableKind::Lecturers => {
            let lecturers: Vec<Lecturer> = db::load_lecturers(conn)
                .map_err(HandlerErr::db_query)?
                .into_iter()
                .filter(|l| filter.matches_lecturer(l))
                .collect();
            project(fixed_columns(kind).unwrap_or_default(), &lecturers)
        }
        TableKind::Results => {
            let scale = grade_scale(conn)?;
            let catalog = db::load_catalog(conn).map_err(HandlerErr::db_query)?;
            let students = db::load_students(conn).map_err(HandlerErr::db_query)?;
            Ok(results_table(&scale, &filter, &catalog, &students))
        }
    }
    .map_err(|e| HandlerErr::new("table_failed", e.to_string()))?;

    Ok(json!({
        "collection": raw_kind.to_ascii_lowercase(),
        "filter": filter,
        "columns": model.columns,
        "rows": model.rows,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "table.get" => Some(respond(&req.id, table_get(state, req))),
        _ => None,
    }
}
