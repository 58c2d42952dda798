use rusqlite::Connection;
use serde_json::Value;

use crate::ipc::helpers::{get_opt_str, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::promotion::{self, PromotionMode, PromotionMove};
use crate::store::SqliteStore;

/// `mode` is `direct` or `exam`; `exam` needs `examId`. A bare `examId`
/// implies `exam`.
fn parse_mode(params: &Value) -> Result<PromotionMode, HandlerErr> {
    let exam_id = get_opt_str(params, "examId");
    let mode = get_opt_str(params, "mode").map(|m| m.to_ascii_lowercase());
    match (mode.as_deref(), exam_id) {
        (Some("direct"), _) => Ok(PromotionMode::Direct),
        (Some("exam") | None, Some(exam_id)) => Ok(PromotionMode::ByExam { exam_id }),
        (Some("exam"), None) => Err(HandlerErr::bad_params(
            "select an exam for exam-based promotion",
        )),
        (None, None) => Err(HandlerErr::bad_params("missing mode")),
        (Some(_), _) => Err(HandlerErr::bad_params("mode must be direct or exam")),
    }
}

fn promotion_plan(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let mode = parse_mode(params)?;
    let source = get_opt_str(params, "sourceClassId").unwrap_or_default();
    let target = get_opt_str(params, "targetClassId").unwrap_or_default();
    let store = SqliteStore::new(conn);
    let plan = promotion::plan_class(&store, &source, &target, &mode)?;
    Ok(serde_json::to_value(plan)?)
}

fn promotion_plan_school(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let mode = parse_mode(params)?;
    let store = SqliteStore::new(conn);
    let plan = promotion::plan_school(&store, &mode)?;
    Ok(serde_json::to_value(plan)?)
}

fn promotion_execute(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let Some(raw) = params.get("moves") else {
        return Err(HandlerErr::bad_params("missing moves"));
    };
    let moves: Vec<PromotionMove> = serde_json::from_value(raw.clone())?;
    let store = SqliteStore::new(conn);
    let summary = promotion::execute(&store, &moves)?;
    Ok(serde_json::to_value(summary)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "promotion.plan" => promotion_plan,
        "promotion.planSchool" => promotion_plan_school,
        "promotion.execute" => promotion_execute,
        _ => return None,
    };
    Some(with_db(state, req, f))
}
