use crate::calc::{CalcError, GradeScale};
use crate::db;
use rusqlite::Connection;
use tracing::warn;

/// Workspace settings key for the grade scale.
pub const GRADING_KEY: &str = "grading";

/// Environment variable holding the tracing filter directive.
pub const LOG_ENV: &str = "RECORDSD_LOG";

/// Grade scale for the open workspace. A missing or unreadable stored value
/// falls back to the default 5-point scale so grading never blocks.
pub fn load_grade_scale(conn: &Connection) -> anyhow::Result<GradeScale> {
    let Some(saved) = db::settings_get_json(conn, GRADING_KEY)? else {
        return Ok(GradeScale::default());
    };
    match serde_json::from_value::<GradeScale>(saved) {
        Ok(scale) if scale.validate().is_ok() => Ok(scale),
        Ok(_) => {
            warn!("stored grade scale is invalid; using default");
            Ok(GradeScale::default())
        }
        Err(e) => {
            warn!(error = %e, "stored grade scale is malformed; using default");
            Ok(GradeScale::default())
        }
    }
}

pub fn parse_grade_scale(raw: &serde_json::Value) -> Result<GradeScale, CalcError> {
    let scale: GradeScale = serde_json::from_value(raw.clone())
        .map_err(|e| CalcError::new("bad_params", format!("invalid grade scale: {e}")))?;
    scale.validate()?;
    Ok(scale)
}

pub fn save_grade_scale(conn: &Connection, scale: &GradeScale) -> anyhow::Result<()> {
    db::settings_set_json(conn, GRADING_KEY, &serde_json::to_value(scale)?)
}
