use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

use crate::ipc::helpers::{get_opt_str, get_required_str, get_str_list, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::reconcile;
use crate::store::SqliteStore;

fn io_err(path: &std::path::Path, e: std::io::Error) -> HandlerErr {
    HandlerErr {
        code: "io_failed",
        message: e.to_string(),
        details: Some(json!({ "path": path.to_string_lossy() })),
    }
}

fn export_csv(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    let class_ids = get_str_list(params, "classIds")?;
    let store = SqliteStore::new(conn);
    let sheet = reconcile::export_marks(&store, &exam_id, &class_ids)?;

    let out_path = get_opt_str(params, "outPath").map(PathBuf::from);
    if let Some(path) = &out_path {
        std::fs::write(path, sheet.csv.as_bytes()).map_err(|e| io_err(path, e))?;
        info!(exam_id = %exam_id, path = %path.display(), "marks sheet written");
    }
    Ok(json!({
        "csv": sheet.csv,
        "students": sheet.students,
        "subjects": sheet.subjects,
        "path": out_path.map(|p| p.to_string_lossy().to_string()),
    }))
}

fn import_csv(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    let text = match (params.get("csv").and_then(|v| v.as_str()), get_opt_str(params, "path")) {
        (Some(text), _) => text.to_string(),
        (None, Some(path)) => {
            let path = PathBuf::from(path);
            std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?
        }
        (None, None) => return Err(HandlerErr::bad_params("missing csv or path")),
    };
    let store = SqliteStore::new(conn);
    let report = reconcile::import_marks(&store, &exam_id, &text)?;
    Ok(serde_json::to_value(report)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "marks.exportCsv" => export_csv,
        "marks.importCsv" => import_csv,
        _ => return None,
    };
    Some(with_db(state, req, f))
}
