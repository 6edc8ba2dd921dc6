use crate::model::{Course, Lecturer, Level, ResultsByLevel, ScoreMap, Semester, Student};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

pub const DB_FILE: &str = "records.sqlite3";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl ToSql for Level {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(self.as_u16())))
    }
}

impl FromSql for Level {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let n = value.as_i64()?;
        u16::try_from(n)
            .ok()
            .and_then(|v| Level::try_from(v).ok())
            .ok_or(FromSqlError::OutOfRange(n))
    }
}

impl ToSql for Semester {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Semester {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Semester::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown semester: {s}").into()))
    }
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = connect(workspace)?;
    // Promotion batches write from several connections at once.
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Connection to an already initialized workspace database.
pub fn connect(workspace: &Path) -> anyhow::Result<Connection> {
    let conn = Connection::open(workspace.join(DB_FILE))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            title TEXT NOT NULL,
            level INTEGER NOT NULL,
            units INTEGER NOT NULL,
            department TEXT NOT NULL,
            semester TEXT NOT NULL,
            updated_at TEXT,
            UNIQUE(level, semester, code)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_code ON courses(code)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            matric_number TEXT NOT NULL UNIQUE,
            department TEXT NOT NULL,
            level INTEGER NOT NULL,
            session_year TEXT NOT NULL,
            gpa REAL NOT NULL DEFAULT 0,
            carry_over INTEGER NOT NULL DEFAULT 0,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_level ON students(level, session_year)",
        [],
    )?;
    // Older workspaces predate cumulative totals on the student row.
    ensure_students_cumulative_columns(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_levels(
            student_id TEXT NOT NULL,
            level INTEGER NOT NULL,
            opened_at TEXT,
            PRIMARY KEY(student_id, level),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_results(
            student_id TEXT NOT NULL,
            level INTEGER NOT NULL,
            course_code TEXT NOT NULL,
            score REAL NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(student_id, level, course_code),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_results_student ON student_results(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_carry_over(
            student_id TEXT NOT NULL,
            course_code TEXT NOT NULL,
            added_at_level INTEGER NOT NULL,
            PRIMARY KEY(student_id, course_code),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lecturers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            course_code TEXT NOT NULL,
            course_title TEXT NOT NULL,
            level INTEGER NOT NULL,
            semester TEXT NOT NULL,
            results_submitted INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workspace_settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn ensure_students_cumulative_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "students", "total_tnu")? {
        conn.execute(
            "ALTER TABLE students ADD COLUMN total_tnu INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    if !table_has_column(conn, "students", "total_tcp")? {
        conn.execute(
            "ALTER TABLE students ADD COLUMN total_tcp INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    if !table_has_column(conn, "students", "cgpa")? {
        conn.execute(
            "ALTER TABLE students ADD COLUMN cgpa REAL NOT NULL DEFAULT 0",
            [],
        )?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM workspace_settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO workspace_settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

// --- courses ---

const COURSE_COLUMNS: &str = "id, code, title, level, units, department, semester";

fn course_from_row(row: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: row.get(0)?,
        code: row.get(1)?,
        title: row.get(2)?,
        level: row.get(3)?,
        units: row.get(4)?,
        department: row.get(5)?,
        semester: row.get(6)?,
    })
}

pub fn load_catalog(conn: &Connection) -> anyhow::Result<Vec<Course>> {
    let sql = format!(
        "SELECT {COURSE_COLUMNS} FROM courses ORDER BY level, semester, code"
    );
    let mut stmt = conn.prepare(&sql)?;
    let courses = stmt
        .query_map([], course_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(courses)
}

pub fn get_course(conn: &Connection, course_id: &str) -> anyhow::Result<Option<Course>> {
    let sql = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?");
    Ok(conn.query_row(&sql, [course_id], course_from_row).optional()?)
}

/// Another course already uses `code` in this level+semester.
pub fn course_code_taken(
    conn: &Connection,
    level: Level,
    semester: Semester,
    code: &str,
    except_id: Option<&str>,
) -> anyhow::Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM courses
             WHERE level = ? AND semester = ? AND code = ? AND id != COALESCE(?, '')",
            (level, semester, code, except_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn insert_course(conn: &Connection, c: &Course) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO courses(id, code, title, level, units, department, semester, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (&c.id, &c.code, &c.title, c.level, c.units, &c.department, c.semester),
    )?;
    Ok(())
}

pub fn update_course(conn: &Connection, c: &Course) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE courses
         SET code = ?, title = ?, level = ?, units = ?, department = ?, semester = ?,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        (&c.code, &c.title, c.level, c.units, &c.department, c.semester, &c.id),
    )?;
    Ok(())
}

// --- students ---

const STUDENT_COLUMNS: &str = "id, name, matric_number, department, level, session_year, gpa, carry_over, total_tnu, total_tcp, cgpa";

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    let level: Level = row.get(4)?;
    let mut s = Student::enrolled(
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        level,
        row.get(5)?,
    );
    s.gpa = row.get(6)?;
    s.carry_over = row.get::<_, i64>(7)? != 0;
    s.total_tnu = row.get(8)?;
    s.total_tcp = row.get(9)?;
    s.cgpa = row.get(10)?;
    Ok(s)
}

fn load_student_results(conn: &Connection, student: &mut Student) -> anyhow::Result<()> {
    let mut results = ResultsByLevel::new();
    results.insert(student.level, ScoreMap::new());

    let mut levels = conn.prepare("SELECT level FROM student_levels WHERE student_id = ?")?;
    for level in levels.query_map([&student.id], |r| r.get::<_, Level>(0))? {
        results.entry(level?).or_default();
    }

    let mut scores = conn.prepare(
        "SELECT level, course_code, score FROM student_results WHERE student_id = ?",
    )?;
    let rows = scores.query_map([&student.id], |r| {
        Ok((r.get::<_, Level>(0)?, r.get::<_, String>(1)?, r.get::<_, f64>(2)?))
    })?;
    for row in rows {
        let (level, code, score) = row?;
        results.entry(level).or_default().insert(code, score);
    }
    student.results = results;

    let mut carry = conn.prepare(
        "SELECT course_code FROM student_carry_over WHERE student_id = ? ORDER BY course_code",
    )?;
    student.carry_over_courses = carry
        .query_map([&student.id], |r| r.get::<_, String>(0))?
        .collect::<Result<_, _>>()?;
    Ok(())
}

pub fn load_students(conn: &Connection) -> anyhow::Result<Vec<Student>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students ORDER BY level, name, matric_number");
    let mut stmt = conn.prepare(&sql)?;
    let mut students = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    for s in students.iter_mut() {
        load_student_results(conn, s)?;
    }
    Ok(students)
}

pub fn load_student(conn: &Connection, student_id: &str) -> anyhow::Result<Option<Student>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?");
    let Some(mut s) = conn.query_row(&sql, [student_id], student_from_row).optional()? else {
        return Ok(None);
    };
    load_student_results(conn, &mut s)?;
    Ok(Some(s))
}

pub fn matric_number_taken(
    conn: &Connection,
    matric_number: &str,
    except_id: Option<&str>,
) -> anyhow::Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM students WHERE matric_number = ? AND id != COALESCE(?, '')",
            (matric_number, except_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn insert_student(conn: &Connection, s: &Student) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO students(id, name, matric_number, department, level, session_year,
                              gpa, carry_over, total_tnu, total_tcp, cgpa, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, 0, 0, 0, 0, 0,
                strftime('%Y-%m-%dT%H:%M:%SZ','now'), strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (&s.id, &s.name, &s.matric_number, &s.department, s.level, &s.session_year),
    )?;
    tx.execute(
        "INSERT OR IGNORE INTO student_levels(student_id, level, opened_at)
         VALUES(?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (&s.id, s.level),
    )?;
    tx.commit()?;
    Ok(())
}

pub fn update_student_profile(conn: &Connection, s: &Student) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE students
         SET name = ?, matric_number = ?, department = ?, session_year = ?,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        (&s.name, &s.matric_number, &s.department, &s.session_year, &s.id),
    )?;
    Ok(())
}

fn update_student_figures(conn: &Connection, s: &Student) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE students
         SET level = ?, gpa = ?, carry_over = ?, total_tnu = ?, total_tcp = ?, cgpa = ?,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        (
            s.level,
            s.gpa,
            s.carry_over as i64,
            s.total_tnu,
            s.total_tcp,
            s.cgpa,
            &s.id,
        ),
    )
}

/// Upsert `scores` into the student's current level and store the
/// recomputed figures carried on `s`.
pub fn save_level_scores(conn: &Connection, s: &Student, scores: &ScoreMap) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut upsert = tx.prepare(
            "INSERT INTO student_results(student_id, level, course_code, score, updated_at)
             VALUES(?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))
             ON CONFLICT(student_id, level, course_code) DO UPDATE SET
               score = excluded.score,
               updated_at = excluded.updated_at",
        )?;
        for (code, score) in scores {
            upsert.execute((&s.id, s.level, code, score))?;
        }
    }
    let changed = update_student_figures(&tx, s)?;
    if changed == 0 {
        anyhow::bail!("student not found: {}", s.id);
    }
    tx.commit()?;
    Ok(())
}

/// Persist a promoted student: new level, carry-over set, cumulative totals.
/// Existing level rows and scores are never touched.
pub fn write_promotion(conn: &Connection, s: &Student) -> anyhow::Result<()> {
    // Batch writers run concurrently; take the write lock up front.
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let changed = update_student_figures(&tx, s)?;
    if changed == 0 {
        anyhow::bail!("student not found: {}", s.id);
    }
    for level in s.results.keys() {
        tx.execute(
            "INSERT OR IGNORE INTO student_levels(student_id, level, opened_at)
             VALUES(?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
            (&s.id, *level),
        )?;
    }
    for code in &s.carry_over_courses {
        tx.execute(
            "INSERT OR IGNORE INTO student_carry_over(student_id, course_code, added_at_level)
             VALUES(?, ?, ?)",
            (&s.id, code, s.level),
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn level_counts(conn: &Connection) -> anyhow::Result<Vec<(Level, i64)>> {
    let mut stmt =
        conn.prepare("SELECT level, COUNT(*) FROM students GROUP BY level ORDER BY level")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, Level>(0)?, r.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// --- lecturers ---

const LECTURER_COLUMNS: &str = "id, name, course_code, course_title, level, semester, results_submitted";

fn lecturer_from_row(row: &Row<'_>) -> rusqlite::Result<Lecturer> {
    Ok(Lecturer {
        id: row.get(0)?,
        name: row.get(1)?,
        course_code: row.get(2)?,
        course_title: row.get(3)?,
        level: row.get(4)?,
        semester: row.get(5)?,
        results_submitted: row.get::<_, i64>(6)? != 0,
    })
}

pub fn load_lecturers(conn: &Connection) -> anyhow::Result<Vec<Lecturer>> {
    let sql = format!("SELECT {LECTURER_COLUMNS} FROM lecturers ORDER BY level, semester, name");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], lecturer_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_lecturer(conn: &Connection, lecturer_id: &str) -> anyhow::Result<Option<Lecturer>> {
    let sql = format!("SELECT {LECTURER_COLUMNS} FROM lecturers WHERE id = ?");
    Ok(conn.query_row(&sql, [lecturer_id], lecturer_from_row).optional()?)
}

pub fn upsert_lecturer(conn: &Connection, l: &Lecturer) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO lecturers(id, name, course_code, course_title, level, semester, results_submitted, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           course_code = excluded.course_code,
           course_title = excluded.course_title,
           level = excluded.level,
           semester = excluded.semester,
           results_submitted = excluded.results_submitted,
           updated_at = excluded.updated_at",
        (
            &l.id,
            &l.name,
            &l.course_code,
            &l.course_title,
            l.level,
            l.semester,
            l.results_submitted as i64,
        ),
    )?;
    Ok(())
}
