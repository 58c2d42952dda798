use rusqlite::Connection;
use serde_json::{json, Value};

use crate::ipc::helpers::{
    get_opt_str, get_required_str, get_str_list, parse_audience, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::MarkRecord;
use crate::results;
use crate::store::{SqliteStore, Store};

fn results_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    let store = SqliteStore::new(conn);
    let rows = match get_opt_str(params, "subjectId") {
        Some(subject_id) => store.results_for_exam_subject(&exam_id, &subject_id)?,
        None => store.results_for_exam(&exam_id)?,
    };
    Ok(json!({ "results": rows }))
}

fn results_upsert(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let Some(raw) = params.get("records") else {
        return Err(HandlerErr::bad_params("missing records"));
    };
    let records: Vec<MarkRecord> = serde_json::from_value(raw.clone())?;

    let store = SqliteStore::new(conn);
    let outcome = results::upsert_marks(&store, &exam_id, &subject_id, &records)?;
    Ok(json!({
        "inserted": outcome.inserted,
        "updated": outcome.updated,
        "unchanged": outcome.unchanged,
    }))
}

fn results_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let student_ids = get_str_list(params, "studentIds")?;
    if student_ids.is_empty() {
        return Err(HandlerErr::bad_params("missing studentIds"));
    }
    let store = SqliteStore::new(conn);
    let deleted = results::delete_marks(&store, &exam_id, &subject_id, &student_ids)?;
    Ok(json!({ "deleted": deleted }))
}

fn results_leaderboard(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    let class_id = get_required_str(params, "classId")?;
    let audience = parse_audience(params)?;
    let store = SqliteStore::new(conn);
    let board = results::leaderboard(&store, &exam_id, &class_id, audience)?;
    Ok(serde_json::to_value(board)?)
}

fn results_report_card(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    let class_id = get_required_str(params, "classId")?;
    let audience = parse_audience(params)?;
    let store = SqliteStore::new(conn);
    let card = results::report_card(&store, &exam_id, &class_id, audience)?;
    Ok(serde_json::to_value(card)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "results.list" => results_list,
        "results.upsert" => results_upsert,
        "results.delete" => results_delete,
        "results.leaderboard" => results_leaderboard,
        "results.reportCard" => results_report_card,
        _ => return None,
    };
    Some(with_db(state, req, f))
}
