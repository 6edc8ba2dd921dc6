use crate::calc::CalcError;
use crate::model::{Course, Lecturer, Level, Semester, Student};
use serde::Serialize;

/// Cohort selection passed explicitly with each query. `None` means "All".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewFilter {
    pub level: Option<Level>,
    pub semester: Option<Semester>,
    pub session_year: Option<String>,
}

impl ViewFilter {
    pub fn matches_course(&self, course: &Course) -> bool {
        self.level.map_or(true, |l| course.level == l)
            && self.semester.map_or(true, |s| course.semester == s)
    }

    /// Students carry no semester; only level and session apply.
    pub fn matches_student(&self, student: &Student) -> bool {
        self.level.map_or(true, |l| student.level == l)
            && self
                .session_year
                .as_deref()
                .map_or(true, |y| student.session_year == y)
    }

    pub fn matches_lecturer(&self, lecturer: &Lecturer) -> bool {
        self.level.map_or(true, |l| lecturer.level == l)
            && self.semester.map_or(true, |s| lecturer.semester == s)
    }

    pub fn courses<'a>(&'a self, catalog: &'a [Course]) -> impl Iterator<Item = &'a Course> + 'a {
        catalog.iter().filter(move |c| self.matches_course(c))
    }
}

/// Normalizes "2023/2024" and "2023-2024" to "2023-2024". The second year
/// must follow the first.
pub fn normalize_session_year(raw: &str) -> Option<String> {
    let t = raw.trim();
    let (a, b) = t.split_once('-').or_else(|| t.split_once('/'))?;
    let (a, b) = (a.trim(), b.trim());
    if a.len() != 4 || b.len() != 4 {
        return None;
    }
    let start: u32 = a.parse().ok()?;
    let end: u32 = b.parse().ok()?;
    if end != start + 1 {
        return None;
    }
    Some(format!("{start}-{end}"))
}

fn is_all(v: &serde_json::Value) -> bool {
    v.is_null()
        || v.as_str()
            .map(|s| s.trim().is_empty() || s.trim().eq_ignore_ascii_case("ALL"))
            .unwrap_or(false)
}

pub fn parse_view_filter(raw: Option<&serde_json::Value>) -> Result<ViewFilter, CalcError> {
    let Some(raw) = raw else {
        return Ok(ViewFilter::default());
    };
    if raw.is_null() {
        return Ok(ViewFilter::default());
    }
    let Some(obj) = raw.as_object() else {
        return Err(CalcError::new("bad_params", "filter must be an object"));
    };

    let level = match obj.get("level") {
        None => None,
        Some(v) if is_all(v) => None,
        Some(v) => match Level::from_json(v) {
            Some(l) => Some(l),
            None => {
                return Err(CalcError::new(
                    "bad_params",
                    "filter.level must be 100, 200, 300, 400 or 'All'",
                )
                .with_details(serde_json::json!({ "level": v })));
            }
        },
    };

    let semester = match obj.get("semester") {
        None => None,
        Some(v) if is_all(v) => None,
        Some(v) => match Semester::from_json(v) {
            Some(s) => Some(s),
            None => {
                return Err(CalcError::new(
                    "bad_params",
                    "filter.semester must be First, Second or 'All'",
                )
                .with_details(serde_json::json!({ "semester": v })));
            }
        },
    };

    let session_year = match obj.get("sessionYear") {
        None => None,
        Some(v) if is_all(v) => None,
        Some(v) => match v.as_str().and_then(normalize_session_year) {
            Some(s) => Some(s),
            None => {
                return Err(CalcError::new(
                    "bad_params",
                    "filter.sessionYear must look like 2023-2024",
                )
                .with_details(serde_json::json!({ "sessionYear": v })));
            }
        },
    };

    Ok(ViewFilter {
        level,
        semester,
        session_year,
    })
}
