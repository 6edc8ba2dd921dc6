use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Academic year on the fixed 100..400 ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Level {
    L100,
    L200,
    L300,
    L400,
}

impl Level {
    pub fn as_u16(self) -> u16 {
        match self {
            Level::L100 => 100,
            Level::L200 => 200,
            Level::L300 => 300,
            Level::L400 => 400,
        }
    }

    /// Next rung of the ladder, `None` at 400.
    pub fn next(self) -> Option<Level> {
        match self {
            Level::L100 => Some(Level::L200),
            Level::L200 => Some(Level::L300),
            Level::L300 => Some(Level::L400),
            Level::L400 => None,
        }
    }

    /// Accepts `200` as well as `"200"`; the dashboard stores levels as strings.
    pub fn from_json(v: &serde_json::Value) -> Option<Level> {
        if let Some(n) = v.as_u64() {
            return u16::try_from(n).ok().and_then(|n| Level::try_from(n).ok());
        }
        v.as_str()
            .and_then(|s| s.trim().parse::<u16>().ok())
            .and_then(|n| Level::try_from(n).ok())
    }
}

impl TryFrom<u16> for Level {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            100 => Ok(Level::L100),
            200 => Ok(Level::L200),
            300 => Ok(Level::L300),
            400 => Ok(Level::L400),
            other => Err(format!("level must be one of 100, 200, 300, 400 (got {other})")),
        }
    }
}

impl From<Level> for u16 {
    fn from(level: Level) -> Self {
        level.as_u16()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Semester {
    First,
    Second,
}

impl Semester {
    pub fn as_str(self) -> &'static str {
        match self {
            Semester::First => "First",
            Semester::Second => "Second",
        }
    }

    /// Lenient parse of the spellings found in existing records:
    /// "First", "1", "1st", "1st Semester", "second", "2nd Semester", ...
    pub fn parse(raw: &str) -> Option<Semester> {
        let s = raw.trim().to_ascii_lowercase();
        let s = s.strip_suffix("semester").unwrap_or(&s).trim();
        match s {
            "first" | "1" | "1st" => Some(Semester::First),
            "second" | "2" | "2nd" => Some(Semester::Second),
            _ => None,
        }
    }

    pub fn from_json(v: &serde_json::Value) -> Option<Semester> {
        if let Some(n) = v.as_u64() {
            return match n {
                1 => Some(Semester::First),
                2 => Some(Semester::Second),
                _ => None,
            };
        }
        v.as_str().and_then(Semester::parse)
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper bound on credit units for a single course.
pub const MAX_COURSE_UNITS: u32 = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub code: String,
    pub title: String,
    pub level: Level,
    pub units: u32,
    pub department: String,
    pub semester: Semester,
}

/// Course code -> score in [0, 100].
pub type ScoreMap = BTreeMap<String, f64>;

/// Level -> that level's scores. Levels are only ever added.
pub type ResultsByLevel = BTreeMap<Level, ScoreMap>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub matric_number: String,
    pub department: String,
    pub level: Level,
    pub session_year: String,
    pub results: ResultsByLevel,
    /// GPA of the most recently graded level.
    pub gpa: f64,
    pub carry_over: bool,
    pub carry_over_courses: BTreeSet<String>,
    #[serde(rename = "totalTNU")]
    pub total_tnu: u64,
    #[serde(rename = "totalTCP")]
    pub total_tcp: u64,
    pub cgpa: f64,
}

impl Student {
    /// A freshly enrolled student with an empty result map for their level.
    pub fn enrolled(
        id: String,
        name: String,
        matric_number: String,
        department: String,
        level: Level,
        session_year: String,
    ) -> Self {
        let mut results = ResultsByLevel::new();
        results.insert(level, ScoreMap::new());
        Self {
            id,
            name,
            matric_number,
            department,
            level,
            session_year,
            results,
            gpa: 0.0,
            carry_over: false,
            carry_over_courses: BTreeSet::new(),
            total_tnu: 0,
            total_tcp: 0,
            cgpa: 0.0,
        }
    }

    pub fn current_scores(&self) -> Option<&ScoreMap> {
        self.results.get(&self.level)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lecturer {
    pub id: String,
    pub name: String,
    pub course_code: String,
    pub course_title: String,
    pub level: Level,
    pub semester: Semester,
    pub results_submitted: bool,
}
