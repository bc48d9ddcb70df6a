//! Maps a parsed request envelope to a response (§4.9).

use serde_json::json;

use crate::protocols::envelope::{Request, Response};

/// Route `request` to a response. The only built-in action is `PING`
/// (case-insensitive); anything else non-blank echoes back. A blank or
/// missing action is a 400-class error.
///
/// Callers are expected to honor `respondEnabled` themselves (§4.9): a
/// response is still computed here, but the pipeline decides whether to
/// write it back.
pub fn route(request: &Request) -> Response {
    let action = request.action.trim();

    if action.is_empty() {
        return Response::error(request.request_id.clone(), 400, "missing field: action");
    }

    if action.eq_ignore_ascii_case("PING") {
        return Response::success(request.request_id.clone(), Some(json!({"action": "PONG"})));
    }

    let mut echo = json!({"echoAction": action});
    if let Some(data) = &request.data {
        echo["echoData"] = data.clone();
    }
    Response::success(request.request_id.clone(), Some(echo))
}
