use crate::model::{Course, Level, ResultsByLevel, ScoreMap};
use serde::{Deserialize, Serialize};

pub const MAX_GRADE_POINT: u32 = 5;

/// Two-decimal rounding used for displayed GPA figures.
pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Clamp a recorded score into [0, 100].
pub fn clamp_score(x: f64) -> f64 {
    x.clamp(0.0, 100.0)
}

/// Lenient score parse: numbers and numeric strings are clamped,
/// anything else (blank, text, NaN) is treated as "not scored".
pub fn parse_score(v: &serde_json::Value) -> Option<f64> {
    let raw = match v {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                return None;
            }
            t.parse::<f64>().ok()?
        }
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(clamp_score(raw))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub min_score: f64,
    pub points: u32,
}

/// Score breakpoints, highest first. A score below every band earns 0 points
/// and counts as a failed course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeScale {
    pub bands: Vec<GradeBand>,
}

impl Default for GradeScale {
    fn default() -> Self {
        let band = |min_score, points| GradeBand { min_score, points };
        Self {
            bands: vec![
                band(70.0, 5),
                band(60.0, 4),
                band(50.0, 3),
                band(45.0, 2),
                band(40.0, 1),
            ],
        }
    }
}

impl GradeScale {
    pub fn points_for(&self, score: f64) -> u32 {
        self.bands
            .iter()
            .find(|b| score >= b.min_score)
            .map(|b| b.points)
            .unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), CalcError> {
        if self.bands.is_empty() {
            return Err(CalcError::new("bad_params", "grade scale needs at least one band"));
        }
        for (i, b) in self.bands.iter().enumerate() {
            if !b.min_score.is_finite() || !(0.0..=100.0).contains(&b.min_score) {
                return Err(CalcError::new("bad_params", "band minScore must be within 0..=100")
                    .with_details(serde_json::json!({ "band": i })));
            }
            if b.points > MAX_GRADE_POINT {
                return Err(CalcError::new("bad_params", "band points must be within 0..=5")
                    .with_details(serde_json::json!({ "band": i })));
            }
            if let Some(prev) = i.checked_sub(1).map(|p| &self.bands[p]) {
                if b.min_score >= prev.min_score || b.points > prev.points {
                    return Err(CalcError::new(
                        "bad_params",
                        "bands must be ordered by descending minScore and points",
                    )
                    .with_details(serde_json::json!({ "band": i })));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelGpa {
    pub total_units: u64,
    pub total_points: u64,
    pub gpa: f64,
    pub failed_courses: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CumulativeTotals {
    #[serde(rename = "totalTNU")]
    pub total_tnu: u64,
    #[serde(rename = "totalTCP")]
    pub total_tcp: u64,
    pub cgpa: f64,
}

/// GPA for one level (or one semester of it). `courses` is the catalog slice
/// being graded; courses without a score are not graded yet and are skipped.
pub fn compute_level_gpa<'a, I>(scale: &GradeScale, scores: &ScoreMap, courses: I) -> LevelGpa
where
    I: IntoIterator<Item = &'a Course>,
{
    let mut total_units: u64 = 0;
    let mut total_points: u64 = 0;
    let mut failed_courses = Vec::new();

    for course in courses {
        let Some(score) = scores.get(&course.code).copied() else {
            continue;
        };
        if !score.is_finite() {
            continue;
        }
        let points = scale.points_for(score);
        if points == 0 {
            failed_courses.push(course.code.clone());
        }
        let units = u64::from(course.units);
        total_units += units;
        total_points += u64::from(points) * units;
    }

    let gpa = if total_units > 0 {
        total_points as f64 / total_units as f64
    } else {
        0.0
    };

    LevelGpa {
        total_units,
        total_points,
        gpa,
        failed_courses,
    }
}

/// Resolve a scored code to its catalog entry, preferring the course offered
/// at the level the score was recorded under.
pub fn lookup_course<'a>(catalog: &'a [Course], level: Level, code: &str) -> Option<&'a Course> {
    catalog
        .iter()
        .find(|c| c.level == level && c.code == code)
        .or_else(|| catalog.iter().find(|c| c.code == code))
}

/// TNU/TCP/CGPA over every level of a student's results. Codes that are no
/// longer in the catalog are skipped.
pub fn compute_cumulative(
    scale: &GradeScale,
    results: &ResultsByLevel,
    catalog: &[Course],
) -> CumulativeTotals {
    let mut total_tnu: u64 = 0;
    let mut total_tcp: u64 = 0;

    for (level, scores) in results {
        for (code, score) in scores {
            if !score.is_finite() {
                continue;
            }
            let Some(course) = lookup_course(catalog, *level, code) else {
                continue;
            };
            let units = u64::from(course.units);
            total_tnu += units;
            total_tcp += u64::from(scale.points_for(*score)) * units;
        }
    }

    let cgpa = if total_tnu > 0 {
        total_tcp as f64 / total_tnu as f64
    } else {
        0.0
    };

    CumulativeTotals {
        total_tnu,
        total_tcp,
        cgpa,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Semester;
    use serde_json::json;

    fn course(code: &str, level: Level, units: u32) -> Course {
        Course {
            id: format!("id-{code}"),
            code: code.to_string(),
            title: format!("{code} title"),
            level,
            units,
            department: "Computer Science".to_string(),
            semester: Semester::First,
        }
    }

    fn scores(pairs: &[(&str, f64)]) -> ScoreMap {
        pairs.iter().map(|(c, s)| (c.to_string(), *s)).collect()
    }

    #[test]
    fn grade_points_follow_breakpoints() {
        let scale = GradeScale::default();
        let cases = [
            (100.0, 5),
            (70.0, 5),
            (69.99, 4),
            (60.0, 4),
            (59.5, 3),
            (50.0, 3),
            (49.0, 2),
            (45.0, 2),
            (44.9, 1),
            (40.0, 1),
            (39.9, 0),
            (0.0, 0),
        ];
        for (score, expected) in cases {
            assert_eq!(scale.points_for(score), expected, "score {score}");
        }
    }

    #[test]
    fn level_gpa_worked_example() {
        let catalog = vec![course("CSC101", Level::L100, 3), course("CSC102", Level::L100, 4)];
        let out = compute_level_gpa(
            &GradeScale::default(),
            &scores(&[("CSC101", 75.0), ("CSC102", 55.0)]),
            &catalog,
        );
        assert_eq!(out.total_units, 7);
        assert_eq!(out.total_points, 27);
        assert!((out.gpa - 27.0 / 7.0).abs() < 1e-9);
        assert!(out.failed_courses.is_empty());
        assert_eq!(round_2_decimals(out.gpa), 3.86);
    }

    #[test]
    fn failed_course_keeps_units_with_zero_points() {
        let catalog = vec![course("CSC101", Level::L100, 3), course("CSC102", Level::L100, 4)];
        let out = compute_level_gpa(
            &GradeScale::default(),
            &scores(&[("CSC101", 30.0), ("CSC102", 55.0)]),
            &catalog,
        );
        assert_eq!(out.total_units, 7);
        assert_eq!(out.total_points, 12);
        assert!((out.gpa - 12.0 / 7.0).abs() < 1e-9);
        assert_eq!(out.failed_courses, vec!["CSC101".to_string()]);
    }

    #[test]
    fn unscored_courses_are_skipped_not_zeroed() {
        let catalog = vec![course("CSC101", Level::L100, 3), course("CSC102", Level::L100, 4)];
        let out = compute_level_gpa(&GradeScale::default(), &scores(&[("CSC101", 80.0)]), &catalog);
        assert_eq!(out.total_units, 3);
        assert_eq!(out.gpa, 5.0);

        let empty = compute_level_gpa(&GradeScale::default(), &ScoreMap::new(), &catalog);
        assert_eq!(
            empty,
            LevelGpa {
                total_units: 0,
                total_points: 0,
                gpa: 0.0,
                failed_courses: vec![],
            }
        );
    }

    #[test]
    fn level_gpa_is_repeatable() {
        let catalog = vec![course("CSC101", Level::L100, 3), course("MTH101", Level::L100, 2)];
        let s = scores(&[("CSC101", 41.0), ("MTH101", 12.0)]);
        let a = compute_level_gpa(&GradeScale::default(), &s, &catalog);
        let b = compute_level_gpa(&GradeScale::default(), &s, &catalog);
        assert_eq!(a, b);
    }

    #[test]
    fn cumulative_sums_disjoint_levels() {
        let scale = GradeScale::default();
        let catalog = vec![
            course("CSC101", Level::L100, 3),
            course("CSC102", Level::L100, 4),
            course("CSC201", Level::L200, 2),
            course("CSC202", Level::L200, 3),
        ];
        let l100 = scores(&[("CSC101", 75.0), ("CSC102", 30.0)]);
        let l200 = scores(&[("CSC201", 62.0), ("CSC202", 48.0)]);
        let mut results = ResultsByLevel::new();
        results.insert(Level::L100, l100.clone());
        results.insert(Level::L200, l200.clone());

        let a = compute_level_gpa(&scale, &l100, catalog.iter().filter(|c| c.level == Level::L100));
        let b = compute_level_gpa(&scale, &l200, catalog.iter().filter(|c| c.level == Level::L200));
        let total = compute_cumulative(&scale, &results, &catalog);

        assert_eq!(total.total_tnu, a.total_units + b.total_units);
        assert_eq!(total.total_tcp, a.total_points + b.total_points);
        assert!((total.cgpa - total.total_tcp as f64 / total.total_tnu as f64).abs() < 1e-9);
    }

    #[test]
    fn cumulative_skips_codes_missing_from_catalog() {
        let catalog = vec![course("CSC101", Level::L100, 3)];
        let mut results = ResultsByLevel::new();
        results.insert(Level::L100, scores(&[("CSC101", 70.0), ("OLD999", 90.0)]));
        let total = compute_cumulative(&GradeScale::default(), &results, &catalog);
        assert_eq!(total.total_tnu, 3);
        assert_eq!(total.total_tcp, 15);

        let none = compute_cumulative(&GradeScale::default(), &ResultsByLevel::new(), &catalog);
        assert_eq!(none, CumulativeTotals::default());
    }

    #[test]
    fn huge_unit_counts_do_not_overflow_totals() {
        let catalog = vec![
            course("BIG101", Level::L100, u32::MAX),
            course("BIG102", Level::L100, u32::MAX),
        ];
        let s = scores(&[("BIG101", 80.0), ("BIG102", 80.0)]);
        let out = compute_level_gpa(&GradeScale::default(), &s, &catalog);
        assert_eq!(out.total_units, 2 * u64::from(u32::MAX));
        assert_eq!(out.total_points, 10 * u64::from(u32::MAX));
        assert!((out.gpa - 5.0).abs() < 1e-9);

        let mut results = ResultsByLevel::new();
        results.insert(Level::L100, s);
        let total = compute_cumulative(&GradeScale::default(), &results, &catalog);
        assert_eq!(total.total_tnu, out.total_units);
        assert_eq!(total.total_tcp, out.total_points);
        assert!((total.cgpa - 5.0).abs() < 1e-9);
    }

    #[test]
    fn lookup_prefers_same_level_offering() {
        let catalog = vec![course("GST111", Level::L100, 2), course("GST111", Level::L200, 4)];
        assert_eq!(lookup_course(&catalog, Level::L200, "GST111").map(|c| c.units), Some(4));
        assert_eq!(lookup_course(&catalog, Level::L300, "GST111").map(|c| c.units), Some(2));
        assert!(lookup_course(&catalog, Level::L100, "NOPE").is_none());
    }

    #[test]
    fn parse_score_is_lenient() {
        assert_eq!(parse_score(&json!(75)), Some(75.0));
        assert_eq!(parse_score(&json!("64.5")), Some(64.5));
        assert_eq!(parse_score(&json!(130)), Some(100.0));
        assert_eq!(parse_score(&json!(-4)), Some(0.0));
        assert_eq!(parse_score(&json!("")), None);
        assert_eq!(parse_score(&json!("abc")), None);
        assert_eq!(parse_score(&json!(null)), None);
        assert_eq!(parse_score(&json!("NaN")), None);
    }

    #[test]
    fn custom_scale_is_validated() {
        assert!(GradeScale::default().validate().is_ok());
        let unordered = GradeScale {
            bands: vec![
                GradeBand { min_score: 40.0, points: 1 },
                GradeBand { min_score: 70.0, points: 5 },
            ],
        };
        assert_eq!(unordered.validate().map_err(|e| e.code), Err("bad_params".to_string()));
        let too_many_points = GradeScale {
            bands: vec![GradeBand { min_score: 50.0, points: 7 }],
        };
        assert!(too_many_points.validate().is_err());
        assert!(GradeScale { bands: vec![] }.validate().is_err());
    }
}
