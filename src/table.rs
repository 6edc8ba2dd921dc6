//! Column-descriptor driven tables for the dashboard screens.
//!
//! Every screen is the same table shape: a list of `{key, header}` columns and
//! rows keyed by column key. Rows always carry the record `id` as well.

use crate::calc::{compute_level_gpa, round_2_decimals, GradeScale};
use crate::filter::ViewFilter;
use crate::model::{Course, Student};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub key: String,
    pub header: String,
}

impl Column {
    fn new(key: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            header: header.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableModel {
    pub columns: Vec<Column>,
    pub rows: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Courses,
    Students,
    Lecturers,
    Results,
}

impl TableKind {
    pub fn parse(raw: &str) -> Option<TableKind> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "courses" => Some(TableKind::Courses),
            "students" => Some(TableKind::Students),
            "lecturers" => Some(TableKind::Lecturers),
            "results" => Some(TableKind::Results),
            _ => None,
        }
    }
}

const COURSE_COLUMNS: &[(&str, &str)] = &[
    ("code", "Course Code"),
    ("title", "Course Title"),
    ("level", "Level"),
    ("department", "Department"),
    ("units", "Credit Units"),
    ("semester", "Semester"),
];

const STUDENT_COLUMNS: &[(&str, &str)] = &[
    ("name", "Student Name"),
    ("matricNumber", "Matric Number"),
    ("department", "Department"),
    ("level", "Level"),
    ("sessionYear", "Session"),
    ("gpa", "GPA"),
    ("cgpa", "CGPA"),
    ("carryOver", "Carry Over"),
];

const LECTURER_COLUMNS: &[(&str, &str)] = &[
    ("name", "Lecturer Name"),
    ("courseCode", "Course Code"),
    ("courseTitle", "Course Title"),
    ("level", "Level"),
    ("semester", "Semester"),
    ("resultsSubmitted", "Results Submitted"),
];

/// Leading columns of the results sheet; one column per course follows.
const RESULT_LEAD_COLUMNS: &[(&str, &str)] = &[
    ("name", "Student Name"),
    ("matricNumber", "Matric Number"),
    ("department", "Department"),
    ("level", "Level"),
];

const RESULT_TAIL_COLUMNS: &[(&str, &str)] = &[
    ("tnu", "TNU"),
    ("tcp", "TCP"),
    ("gpa", "GPA"),
    ("failedCourses", "Carry Over"),
];

fn columns(defs: &[(&str, &str)]) -> Vec<Column> {
    defs.iter().map(|(k, h)| Column::new(*k, *h)).collect()
}

/// Fixed columns for a record collection. The results sheet is built by
/// [`results_table`] because its columns depend on the catalog.
pub fn fixed_columns(kind: TableKind) -> Option<Vec<Column>> {
    match kind {
        TableKind::Courses => Some(columns(COURSE_COLUMNS)),
        TableKind::Students => Some(columns(STUDENT_COLUMNS)),
        TableKind::Lecturers => Some(columns(LECTURER_COLUMNS)),
        TableKind::Results => None,
    }
}

/// Shape serialized records into rows holding `id` plus each column key.
pub fn project<T: Serialize>(columns: Vec<Column>, records: &[T]) -> serde_json::Result<TableModel> {
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let value = serde_json::to_value(record)?;
        let mut row = Map::new();
        row.insert("id".to_string(), value.get("id").cloned().unwrap_or(Value::Null));
        for col in &columns {
            row.insert(col.key.clone(), value.get(&col.key).cloned().unwrap_or(Value::Null));
        }
        rows.push(row);
    }
    Ok(TableModel { columns, rows })
}

pub fn course_column_key(course: &Course) -> String {
    format!("course:{}", course.id)
}

/// Results sheet: one row per student in the filter, one score column per
/// catalog course in the filter, then TNU/TCP/GPA/Carry Over for those
/// courses. Scores are looked up under the course's own level.
pub fn results_table(
    scale: &GradeScale,
    filter: &ViewFilter,
    catalog: &[Course],
    students: &[Student],
) -> TableModel {
    let courses: Vec<&Course> = filter.courses(catalog).collect();

    let mut cols = columns(RESULT_LEAD_COLUMNS);
    cols.extend(
        courses
            .iter()
            .map(|c| Column::new(course_column_key(c), c.code.clone())),
    );
    cols.extend(columns(RESULT_TAIL_COLUMNS));

    let rows = students
        .iter()
        .filter(|s| filter.matches_student(s))
        .map(|s| {
            let mut row = Map::new();
            row.insert("id".to_string(), Value::from(s.id.clone()));
            row.insert("name".to_string(), Value::from(s.name.clone()));
            row.insert("matricNumber".to_string(), Value::from(s.matric_number.clone()));
            row.insert("department".to_string(), Value::from(s.department.clone()));
            row.insert("level".to_string(), Value::from(s.level.as_u16()));

            let mut graded = crate::model::ScoreMap::new();
            for c in &courses {
                let score = s.results.get(&c.level).and_then(|m| m.get(&c.code)).copied();
                if let Some(v) = score {
                    graded.insert(c.code.clone(), v);
                }
                row.insert(
                    course_column_key(c),
                    score.map(Value::from).unwrap_or(Value::Null),
                );
            }

            let summary = compute_level_gpa(scale, &graded, courses.iter().copied());
            row.insert("tnu".to_string(), Value::from(summary.total_units));
            row.insert("tcp".to_string(), Value::from(summary.total_points));
            row.insert("gpa".to_string(), Value::from(round_2_decimals(summary.gpa)));
            row.insert("failedCourses".to_string(), Value::from(summary.failed_courses));
            row
        })
        .collect();

    TableModel { columns: cols, rows }
}
