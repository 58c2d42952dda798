use rusqlite::Connection;
use serde_json::{json, Value};

use crate::declaration::{self, Transition};
use crate::ipc::helpers::{
    get_opt_str, get_required_str, parse_audience, parse_now, parse_period, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::stars;
use crate::store::{SqliteStore, Store};

fn config_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let scope = get_opt_str(params, "mentorId");
    let store = SqliteStore::new(conn);
    let config = store.score_config(scope.as_deref())?;
    Ok(json!({ "config": config }))
}

fn config_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let scope = get_opt_str(params, "mentorId");
    let Some(patch) = params.get("patch") else {
        return Err(HandlerErr::bad_params("missing patch"));
    };
    let config = stars::update_config(conn, scope.as_deref(), patch)?;
    Ok(json!({ "config": config }))
}

fn scores(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let now = parse_now(params)?;
    let period = parse_period(params, now)?;
    let audience = parse_audience(params)?;
    let scope = get_opt_str(params, "mentorId");
    let store = SqliteStore::new(conn);
    let res = stars::scores(&store, &class_id, period, scope.as_deref(), audience, now)?;
    Ok(serde_json::to_value(res)?)
}

fn transition(conn: &Connection, params: &Value, t: Transition) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let now = parse_now(params)?;
    let period = parse_period(params, now)?;
    let store = SqliteStore::new(conn);
    let view = declaration::apply(&store, &class_id, period, t, now)?;
    Ok(serde_json::to_value(view)?)
}

fn declare(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    transition(conn, params, Transition::Declare)
}

fn undo(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    transition(conn, params, Transition::Undo)
}

fn status(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let now = parse_now(params)?;
    let period = parse_period(params, now)?;
    let store = SqliteStore::new(conn);
    let view = declaration::status(&store, &class_id, period, now)?;
    Ok(serde_json::to_value(view)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "stars.config.get" => config_get,
        "stars.config.update" => config_update,
        "stars.scores" => scores,
        "stars.declare" => declare,
        "stars.undo" => undo,
        "stars.status" => status,
        _ => return None,
    };
    Some(with_db(state, req, f))
}
