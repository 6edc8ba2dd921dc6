use crate::calc::{compute_cumulative, compute_level_gpa, GradeScale};
use crate::model::{Course, Level, ScoreMap, Semester, Student};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PromotionError {
    #[error("student {student_id} is already at the final level ({level})")]
    FinalLevel { student_id: String, level: Level },
}

impl PromotionError {
    pub fn code(&self) -> &'static str {
        match self {
            PromotionError::FinalLevel { .. } => "final_level",
        }
    }
}

/// Courses failed at the student's current level, graded against that
/// level's catalog (optionally a single semester of it).
pub fn failed_courses_for_current_level(
    scale: &GradeScale,
    student: &Student,
    catalog: &[Course],
    semester: Option<Semester>,
) -> Vec<String> {
    let empty = ScoreMap::new();
    let scores = student.current_scores().unwrap_or(&empty);
    let courses = catalog
        .iter()
        .filter(|c| c.level == student.level)
        .filter(|c| semester.map_or(true, |s| c.semester == s));
    compute_level_gpa(scale, scores, courses).failed_courses
}

/// Move a student up one level. Prior levels are left untouched, newly failed
/// courses join the carry-over set and cumulative totals are recomputed.
pub fn promote(
    scale: &GradeScale,
    student: &Student,
    failed_this_level: &[String],
    catalog: &[Course],
) -> Result<Student, PromotionError> {
    let Some(next) = student.level.next() else {
        return Err(PromotionError::FinalLevel {
            student_id: student.id.clone(),
            level: student.level,
        });
    };

    let mut out = student.clone();
    out.level = next;
    out.carry_over_courses
        .extend(failed_this_level.iter().cloned());
    out.carry_over = !out.carry_over_courses.is_empty();
    out.results.entry(next).or_default();

    let totals = compute_cumulative(scale, &out.results, catalog);
    out.total_tnu = totals.total_tnu;
    out.total_tcp = totals.total_tcp;
    out.cgpa = totals.cgpa;

    debug!(
        student_id = %out.id,
        from = %student.level,
        to = %next,
        carry_over = out.carry_over_courses.len(),
        "student promoted"
    );
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Promoted,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionOutcome {
    pub student_id: String,
    pub status: OutcomeStatus,
    pub from_level: Level,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub promoted: usize,
    pub rejected: usize,
    pub failed: usize,
    pub outcomes: Vec<PromotionOutcome>,
}

impl BatchReport {
    fn from_outcomes(outcomes: Vec<PromotionOutcome>) -> Self {
        let count = |st: OutcomeStatus| outcomes.iter().filter(|o| o.status == st).count();
        Self {
            promoted: count(OutcomeStatus::Promoted),
            rejected: count(OutcomeStatus::Rejected),
            failed: count(OutcomeStatus::Failed),
            outcomes,
        }
    }
}

/// Promote every student of a cohort. Each student is computed and handed to
/// `persist` independently on the rayon pool; the call returns once all of
/// them have finished. A failed write affects only that student's outcome.
pub fn promote_all<F>(
    scale: &GradeScale,
    students: &[Student],
    catalog: &[Course],
    semester: Option<Semester>,
    persist: F,
) -> BatchReport
where
    F: Fn(&Student) -> anyhow::Result<()> + Sync,
{
    let outcomes: Vec<PromotionOutcome> = students
        .par_iter()
        .map(|student| {
            let failed = failed_courses_for_current_level(scale, student, catalog, semester);
            let base = PromotionOutcome {
                student_id: student.id.clone(),
                status: OutcomeStatus::Promoted,
                from_level: student.level,
                level: None,
                code: None,
                message: None,
            };
            let updated = match promote(scale, student, &failed, catalog) {
                Ok(u) => u,
                Err(e) => {
                    return PromotionOutcome {
                        status: OutcomeStatus::Rejected,
                        code: Some(e.code().to_string()),
                        message: Some(e.to_string()),
                        ..base
                    };
                }
            };
            match persist(&updated) {
                Ok(()) => PromotionOutcome {
                    level: Some(updated.level),
                    ..base
                },
                Err(e) => {
                    warn!(student_id = %student.id, error = %e, "promotion write failed");
                    PromotionOutcome {
                        status: OutcomeStatus::Failed,
                        code: Some("db_update_failed".to_string()),
                        message: Some(format!("{e:#}")),
                        ..base
                    }
                }
            }
        })
        .collect();

    BatchReport::from_outcomes(outcomes)
}
