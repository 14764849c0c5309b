//! Message vocabulary.
//!
//! A request is `{"method": ..., "id": ..., ...params}`, a notification is
//! `{"notification": ..., ...params}` (no id, either direction), a response
//! reuses the request's id and carries either `"result"` or `"error"`.
//! Params are flattened into the top-level object.

use serde_json::{Map, Value};

use crate::error::SessionError;

/// Flattened message parameters.
pub type Params = Map<String, Value>;

/// Convenience: turn a `json!({...})` object into [`Params`].
pub fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Build an outbound request object.
pub fn request(method: &str, id: &str, params: Params) -> Value {
    let mut map = Map::new();
    map.insert("method".to_string(), Value::String(method.to_string()));
    for (key, value) in params {
        // method/id are reserved; params must not shadow them
        if key != "method" && key != "id" {
            map.insert(key, value);
        }
    }
    map.insert("id".to_string(), Value::String(id.to_string()));
    Value::Object(map)
}

/// Build an outbound notification object.
pub fn notification(name: &str, params: Params) -> Value {
    let mut map = Map::new();
    map.insert("notification".to_string(), Value::String(name.to_string()));
    for (key, value) in params {
        if key != "notification" && key != "id" {
            map.insert(key, value);
        }
    }
    Value::Object(map)
}

/// Classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Carries an `id`: a response to one of our calls.
    Response { id: String, body: Params },
    /// No `id`: an unsolicited notification.
    Notification { name: String, body: Params },
}

impl InboundMessage {
    /// Parse and classify one frame. The presence of an `id` field decides:
    /// with id it is a response, without it must name a notification.
    pub fn parse(frame: &[u8]) -> Result<Self, SessionError> {
        let value: Value = serde_json::from_slice(frame)
            .map_err(|e| SessionError::Protocol(format!("invalid JSON frame: {e}")))?;
        let Value::Object(body) = value else {
            return Err(SessionError::Protocol("frame is not a JSON object".into()));
        };

        if let Some(id) = body.get("id") {
            let id = match id {
                Value::String(s) => s.clone(),
                // tolerate numeric ids from older upstream builds
                Value::Number(n) => n.to_string(),
                other => {
                    return Err(SessionError::Protocol(format!(
                        "unusable id field: {other}"
                    )))
                }
            };
            return Ok(Self::Response { id, body });
        }

        match body.get("notification") {
            Some(Value::String(name)) => Ok(Self::Notification {
                name: name.clone(),
                body,
            }),
            _ => Err(SessionError::Protocol(
                "message has neither id nor notification".into(),
            )),
        }
    }
}

/// Extract the call outcome from a response body.
pub fn response_result(mut body: Params) -> Result<Value, SessionError> {
    if let Some(error) = body.remove("error") {
        let code = error
            .get("code")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unspecified upstream error")
            .to_string();
        return Err(SessionError::Upstream { code, message });
    }
    Ok(body.remove("result").unwrap_or(Value::Null))
}
