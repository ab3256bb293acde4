//! Newline-delimited JSON framing with an optional echoed `id`.

use serde_json::Value;

use crate::error::ErrorCode;
use crate::service::{Reply, Request};

/// A decoded request line.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub id: Option<u64>,
    pub request: Request,
}

/// Decode one request line.
///
/// On failure the error carries whatever `id` could be recovered so the
/// client can still correlate the error reply.
pub fn decode_request(line: &str) -> Result<Envelope, (Option<u64>, ErrorCode)> {
    let mut value: Value = serde_json::from_str(line).map_err(|_| (None, ErrorCode::WrongParameter))?;

    let id = match value.as_object_mut().map(|obj| obj.remove("id")) {
        Some(Some(Value::Number(n))) => n.as_u64(),
        Some(Some(Value::Null)) | Some(None) => None,
        Some(Some(_)) => return Err((None, ErrorCode::WrongParameter)),
        None => return Err((None, ErrorCode::WrongParameter)),
    };

    let request = serde_json::from_value(value).map_err(|_| (id, ErrorCode::WrongParameter))?;
    Ok(Envelope { id, request })
}

/// Encode one reply line, newline included.
pub fn encode_reply(id: Option<u64>, reply: &Reply) -> Result<String, serde_json::Error> {
    encode_line(id, serde_json::to_value(reply)?)
}

/// Encode one request line for a client, newline included.
pub fn encode_request(id: Option<u64>, request: &Request) -> Result<String, serde_json::Error> {
    encode_line(id, serde_json::to_value(request)?)
}

fn encode_line(id: Option<u64>, mut value: Value) -> Result<String, serde_json::Error> {
    if let (Some(id), Some(obj)) = (id, value.as_object_mut()) {
        obj.insert("id".to_string(), Value::from(id));
    }
    let mut line = serde_json::to_string(&value)?;
    line.push('\n');
    Ok(line)
}
