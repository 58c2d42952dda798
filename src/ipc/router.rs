use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::records::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::results::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::promotion::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::stars::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::marks_csv::try_handle(state, &req) {
        return resp;
    }

    err(
        Some(&req.id),
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
