//! Content-Length framing for DAP messages.
//!
//! Every message on the wire is `Content-Length: N\r\n\r\n` followed by
//! exactly `N` bytes of UTF-8 JSON.

use serde_json::Value;

use crate::error::DapError;

/// Separator between the header block and the body.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Largest body accepted from an adapter (16 MiB).
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

const CONTENT_LENGTH: &str = "content-length";

/// Frame a JSON payload.
pub fn encode_message(value: &Value) -> Vec<u8> {
    let body = value.to_string();
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut buf = Vec::with_capacity(header.len() + body.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(body.as_bytes());
    buf
}

/// Decode one frame from the front of `data`.
///
/// Returns the payload and the number of bytes consumed. Short buffers are
/// a [`DapError::Transport`]; a complete frame whose body is not JSON is a
/// [`DapError::InvalidResponse`].
pub fn decode_message(data: &[u8]) -> Result<(Value, usize), DapError> {
    let sep_pos = find_terminator(data)
        .ok_or_else(|| DapError::Transport("incomplete header: missing \\r\\n\\r\\n".into()))?;

    let header = std::str::from_utf8(&data[..sep_pos])
        .map_err(|e| DapError::Transport(format!("header is not UTF-8: {e}")))?;
    let content_length = parse_content_length(header)?;
    check_content_length(content_length)?;

    let body_start = sep_pos + HEADER_TERMINATOR.len();
    let total = body_start + content_length;
    if data.len() < total {
        return Err(DapError::Transport(format!(
            "incomplete body: expected {content_length} bytes, have {}",
            data.len() - body_start
        )));
    }

    let value = decode_body(&data[body_start..total])?;
    Ok((value, total))
}

/// Parse a frame body.
pub fn decode_body(body: &[u8]) -> Result<Value, DapError> {
    serde_json::from_slice(body)
        .map_err(|e| DapError::InvalidResponse(format!("JSON parse error: {e}")))
}

/// Extract the body length from a header block.
///
/// Header names are case-insensitive and unrelated headers
/// (e.g. `Content-Type`) are ignored.
pub fn parse_content_length(header: &str) -> Result<usize, DapError> {
    for line in header.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            let value = value.trim();
            return value.parse::<usize>().map_err(|e| {
                DapError::Transport(format!("invalid Content-Length value '{value}': {e}"))
            });
        }
    }
    Err(DapError::Transport("missing Content-Length header".into()))
}

/// Reject bodies larger than [`MAX_MESSAGE_BYTES`].
pub fn check_content_length(len: usize) -> Result<usize, DapError> {
    if len > MAX_MESSAGE_BYTES {
        return Err(DapError::Transport(format!(
            "Content-Length {len} exceeds maximum allowed size {MAX_MESSAGE_BYTES}"
        )));
    }
    Ok(len)
}

fn find_terminator(data: &[u8]) -> Option<usize> {
    data.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}
