use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

/// Error envelope. `id` is omitted when the request line could not be parsed.
pub fn err(
    id: Option<&str>,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    let mut resp = json!({
        "ok": false,
        "error": error,
    });
    if let Some(id) = id {
        resp["id"] = json!(id);
    }
    resp
}
