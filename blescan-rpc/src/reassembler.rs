use crate::types::JsonRpcResponse;

/// Scans `buffer` for the first complete top-level JSON object, tracking
/// brace depth while ignoring braces inside string literals (and their
/// escape sequences). Returns the parsed response and the number of bytes
/// it consumed from the front of `buffer`, or `None` if no complete object
/// is present yet (the caller should keep accumulating fragments).
///
/// Bytes preceding the first `{` are treated as noise and skipped; this
/// tolerates a stray empty notification arriving before the real payload.
#[must_use]
pub fn try_extract_response(buffer: &[u8]) -> Option<(JsonRpcResponse, usize)> {
    let start = buffer.iter().position(|&b| b == b'{')?;

    let mut depth: u32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in buffer[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return match serde_json::from_slice::<JsonRpcResponse>(&buffer[start..end]) {
                        Ok(response) => Some((response, end)),
                        Err(error) => {
                            tracing::warn!(%error, "buffer held a balanced object that failed to parse as a JSON-RPC response");
                            None
                        }
                    };
                }
            }
            _ => {}
        }
    }

    None
}

/// Parses a standalone complete JSON-RPC response without the incremental
/// reassembly bookkeeping; used once a caller already knows the buffer
/// holds exactly one object (e.g. in a connectionless unit test).
///
/// # Errors
/// Returns the `serde_json` error if `bytes` is not a valid JSON-RPC
/// response object.
pub fn parse_complete(bytes: &[u8]) -> Result<JsonRpcResponse, serde_json::Error> {
    serde_json::from_slice(bytes)
}
