use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
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
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Handler-internal error carried through `Result` until the response is
/// rendered at the dispatch boundary.
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> HandlerErr {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        code: &'static str,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> HandlerErr {
        HandlerErr {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn bad_params(message: impl Into<String>) -> HandlerErr {
        HandlerErr::new("bad_params", message)
    }

    /// Field-level client validation failure; nothing was sent anywhere.
    pub fn validation(field: &str, message: impl Into<String>) -> HandlerErr {
        HandlerErr::with_details("validation_failed", message, json!({ "field": field }))
    }

    pub fn not_found(message: impl Into<String>) -> HandlerErr {
        HandlerErr::new("not_found", message)
    }

    pub fn query(e: rusqlite::Error) -> HandlerErr {
        HandlerErr::new("db_query_failed", e.to_string())
    }

    pub fn insert(table: &str, e: rusqlite::Error) -> HandlerErr {
        HandlerErr::with_details("db_insert_failed", e.to_string(), json!({ "table": table }))
    }

    pub fn update(table: &str, e: rusqlite::Error) -> HandlerErr {
        HandlerErr::with_details("db_update_failed", e.to_string(), json!({ "table": table }))
    }

    pub fn delete(table: &str, e: rusqlite::Error) -> HandlerErr {
        HandlerErr::with_details("db_delete_failed", e.to_string(), json!({ "table": table }))
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}
