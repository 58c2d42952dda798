//! Star of the month: composite board plus its visibility gate.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::calc::composite::{compute_star_board, StarBoard, StarInputs};
use crate::db;
use crate::declaration::{self, DeclarationView};
use crate::error::EngineError;
use crate::model::{Audience, Period, ScoreConfig};
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StarResults {
    pub class_id: String,
    pub declaration: DeclarationView,
    /// False when scores were held back from a student reader.
    pub released: bool,
    #[serde(flatten)]
    pub board: StarBoard,
}

pub fn scores<S: Store + ?Sized>(
    store: &S,
    class_id: &str,
    period: Period,
    scope: Option<&str>,
    audience: Audience,
    now: DateTime<Utc>,
) -> Result<StarResults, EngineError> {
    let declaration = declaration::status(store, class_id, period, now)?;
    let config = store.score_config(scope)?;

    let students = store.students_in_class(class_id)?;
    let attendance = store.attendance_for_class(class_id, period)?;
    let activities = store.activities_for_class(class_id)?;
    let submissions = store.submissions_for_class(class_id)?;
    let prayers = store.prayers_for_class(class_id, period)?;
    let inputs = StarInputs {
        students: &students,
        attendance: &attendance,
        activities: &activities,
        submissions: &submissions,
        prayers: &prayers,
    };
    let mut board = compute_star_board(&inputs, period, config);

    let released = audience == Audience::Mentor || declaration.visible;
    if !released {
        board.rows.clear();
        board.winners.clear();
        board.top_score = 0.0;
    }
    debug!(
        class_id,
        month = period.month,
        year = period.year,
        rows = board.rows.len(),
        winners = board.winners.len(),
        released,
        "star scores computed"
    );

    Ok(StarResults {
        class_id: class_id.to_string(),
        declaration,
        released,
        board,
    })
}

/// Merge a partial `{attendance?, activities?, prayer?}` patch into the stored
/// config for `scope` and persist it.
pub fn update_config(
    conn: &Connection,
    scope: Option<&str>,
    patch: &Value,
) -> Result<ScoreConfig, EngineError> {
    let obj = patch
        .as_object()
        .ok_or_else(|| EngineError::validation("config patch must be an object"))?;
    let mut config = db::load_score_config(conn, scope)?;
    for (key, value) in obj {
        let flag = value.as_bool().ok_or_else(|| {
            EngineError::validation_with(
                "criteria flags must be booleans",
                json!({ "key": key }),
            )
        })?;
        match key.as_str() {
            "attendance" => config.attendance = flag,
            "activities" => config.activities = flag,
            "prayer" => config.prayer = flag,
            _ => {
                return Err(EngineError::validation_with(
                    "unknown criterion",
                    json!({ "key": key }),
                ))
            }
        }
    }
    db::save_score_config(conn, scope, &config)?;
    info!(
        scope = scope.unwrap_or("school"),
        attendance = config.attendance,
        activities = config.activities,
        prayer = config.prayer,
        "star criteria updated"
    );
    Ok(config)
}
