use serde_json::{json, Value};

/// Parsed inbound hub frame. Obyte hub frames are two-element JSON arrays:
/// `["request"|"response"|"justsaying", body]`.
#[derive(Debug)]
pub enum HubFrame {
    /// Hub-initiated request (heartbeat, subscribe probes). Carries the tag a
    /// reply must echo.
    Request { command: String, tag: Option<String> },
    /// Reply to one of our tagged requests.
    Response { tag: String, response: Value },
    /// Fire-and-forget notification.
    JustSaying { subject: String, body: Value },
}

/// Parse a raw hub text frame. Returns None for frames we have no use for
/// (malformed, unknown kind, missing fields) — the hub sends plenty of chatter
/// a light client can ignore.
pub fn parse_hub_frame(raw: &str) -> Option<HubFrame> {
    let v: Value = serde_json::from_str(raw).ok()?;
    let arr = v.as_array()?;
    let kind = arr.first()?.as_str()?;
    let body = arr.get(1)?;

    match kind {
        "request" => {
            let command = body.get("command")?.as_str()?.to_string();
            let tag = body.get("tag").and_then(|t| t.as_str()).map(String::from);
            Some(HubFrame::Request { command, tag })
        }
        "response" => {
            let tag = body.get("tag")?.as_str()?.to_string();
            let response = body.get("response").cloned().unwrap_or(Value::Null);
            Some(HubFrame::Response { tag, response })
        }
        "justsaying" => {
            let subject = body.get("subject")?.as_str()?.to_string();
            let body = body.get("body").cloned().unwrap_or(Value::Null);
            Some(HubFrame::JustSaying { subject, body })
        }
        _ => None,
    }
}

/// Build an outbound tagged request frame.
pub fn build_request(command: &str, params: Value, tag: &str) -> String {
    let mut body = json!({ "command": command, "tag": tag });
    if !params.is_null() {
        body["params"] = params;
    }
    json!(["request", body]).to_string()
}

/// Build a response frame echoing the hub's tag (heartbeat replies).
pub fn build_response(tag: &str, response: Value) -> String {
    json!(["response", { "tag": tag, "response": response }]).to_string()
}

/// Build a justsaying frame.
pub fn build_justsaying(subject: &str, body: Value) -> String {
    json!(["justsaying", { "subject": subject, "body": body }]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_response_frame() {
        let raw = r#"["response",{"tag":"t1","response":{"var_a":1}}]"#;
        match parse_hub_frame(raw) {
            Some(HubFrame::Response { tag, response }) => {
                assert_eq!(tag, "t1");
                assert_eq!(response["var_a"], 1);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parses_heartbeat_request() {
        let raw = r#"["request",{"command":"heartbeat","tag":"hb"}]"#;
        match parse_hub_frame(raw) {
            Some(HubFrame::Request { command, tag }) => {
                assert_eq!(command, "heartbeat");
                assert_eq!(tag.as_deref(), Some("hb"));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn malformed_frames_are_dropped() {
        assert!(parse_hub_frame("not json").is_none());
        assert!(parse_hub_frame(r#"{"command":"x"}"#).is_none());
        assert!(parse_hub_frame(r#"["unknown",{}]"#).is_none());
    }

    #[test]
    fn request_frame_carries_params_and_tag() {
        let raw = build_request(
            "light/get_aa_state_vars",
            serde_json::json!({"address": "AA1"}),
            "42",
        );
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v[0], "request");
        assert_eq!(v[1]["command"], "light/get_aa_state_vars");
        assert_eq!(v[1]["params"]["address"], "AA1");
        assert_eq!(v[1]["tag"], "42");
    }
}
