//! Line-oriented JSON protocol: one request per line in, one response per line out.

use crate::{
    engine::Engine,
    error::RequestError,
    model::{SimulationRequest, SimulationResponse},
};

/// Decodes one request line.
pub fn parse_request(line: &str) -> Result<SimulationRequest, RequestError> {
    Ok(serde_json::from_str(line)?)
}

/// Evaluates one input line. Blank lines yield `None`.
pub fn handle_line(engine: &Engine, line: &str) -> Option<SimulationResponse> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(match parse_request(line) {
        Ok(request) => engine.simulate(&request),
        Err(err) => {
            tracing::warn!(error = %err, "Unreadable request line");
            SimulationResponse::error(err.to_string())
        }
    })
}

/// Encodes a response as a single line, without the trailing newline.
pub fn encode_response(response: &SimulationResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|err| {
        tracing::error!(error = %err, "Response encoding failed");
        format!(
            r#"{{"status":"error","metrics":{{}},"timeline":[],"errors":[{}]}}"#,
            serde_json::Value::String(format!("response encoding failed: {err}"))
        )
    })
}
