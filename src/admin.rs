//! Transport-neutral administrative surface.
//!
//! An HTTP layer turns `GET`/`PUT`/`POST`/`DELETE` calls on the resource into
//! [`AdminRequest`]s and writes the returned status and JSON body back.

use log::warn;
use serde_json::{json, Value};

use crate::error::RedirectError;
use crate::manager::RedirectManager;

/// Key of the list-all response body.
pub const LIST_FIELD: &str = "redirectMappings";

/// One administrative call.
#[derive(Debug, Clone)]
pub enum AdminRequest {
    /// List all rules, or one rule when `key` is set
    Get { key: Option<String> },
    /// Create or replace the rules in `body` (`{key: {url, matchMode}}`)
    Put { body: Value },
    /// Remove one rule
    Delete { key: String },
}

/// Status code and JSON body for the transport to send back.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminResponse {
    pub status: u16,
    pub body: Value,
}

impl AdminResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn from_error(err: &RedirectError) -> Self {
        let status = err.status_code();
        if status >= 500 {
            warn!("Admin request failed: {}", err);
        }
        Self {
            status,
            body: json!({ "error": { "code": status, "msg": err.to_string() } }),
        }
    }
}

/// Executes an administrative request against the manager.
pub fn handle(manager: &RedirectManager, request: AdminRequest) -> AdminResponse {
    let result = match request {
        AdminRequest::Get { key: None } => serde_json::to_value(manager.list())
            .map(|view| json!({ LIST_FIELD: view }))
            .map_err(RedirectError::from),
        AdminRequest::Get { key: Some(key) } => manager.get(&key).and_then(|stored| {
            let record = serde_json::to_value(stored)?;
            let mut body = serde_json::Map::new();
            body.insert(key, record);
            Ok(Value::Object(body))
        }),
        AdminRequest::Put { body } => manager
            .apply_updates(&body)
            .map(|updated| json!({ "updated": updated })),
        AdminRequest::Delete { key } => manager.delete(&key).map(|_| json!({ "deleted": key })),
    };

    match result {
        Ok(body) => AdminResponse::ok(body),
        Err(e) => AdminResponse::from_error(&e),
    }
}
