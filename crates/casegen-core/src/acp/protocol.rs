//! ACP message codec
//!
//! Turns single-line frames into JSON-RPC envelopes and back, and lifts the
//! agent's notifications into a closed set of typed messages.

use crate::error::{AcpError, Error, Result};
use crate::types::{
    ConfigOptionsUpdateParams, CurrentModeUpdateParams, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, SessionUpdate, SessionUpdateNotification, JSONRPC_VERSION,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

/// ACP method names
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const SESSION_NEW: &str = "session/new";
    pub const SESSION_LOAD: &str = "session/load";
    pub const SESSION_PROMPT: &str = "session/prompt";
    pub const SESSION_SET_MODEL: &str = "session/set_model";
    pub const SESSION_SET_MODE: &str = "session/set_mode";
    pub const SESSION_SET_CONFIG_OPTION: &str = "session/set_config_option";
    pub const SESSION_CLOSE: &str = "session/close";
    pub const SESSION_CANCEL: &str = "session/cancel";
    pub const SESSION_UPDATE: &str = "session/update";
    pub const CONFIG_OPTIONS_UPDATE: &str = "config_options_update";
    pub const CURRENT_MODE_UPDATE: &str = "current_mode_update";
    pub const SESSION_REQUEST_PERMISSION: &str = "session/request_permission";
}

/// One decoded JSON-RPC message
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

impl Envelope {
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) => None,
        }
    }
}

fn protocol_error(reason: impl Into<String>) -> Error {
    Error::Acp(AcpError::Protocol(reason.into()))
}

/// Serialize an envelope as a single frame.
pub fn encode(envelope: &Envelope) -> Result<String> {
    let line = match envelope {
        Envelope::Request(r) => serde_json::to_string(r)?,
        Envelope::Response(r) => serde_json::to_string(r)?,
        Envelope::Notification(n) => serde_json::to_string(n)?,
    };
    trace!("Encoded frame: {}", line);
    Ok(line)
}

/// Parse one frame into an envelope.
///
/// Classification is by shape: `method` + `id` is a request, `method` alone
/// a notification, `id` with `result` or `error` a response.
pub fn decode(frame: &str) -> Result<Envelope> {
    let value: Value =
        serde_json::from_str(frame).map_err(|e| protocol_error(format!("invalid JSON: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| protocol_error("frame is not a JSON object"))?;

    match object.get("jsonrpc") {
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        None => {}
        Some(other) => {
            return Err(protocol_error(format!(
                "unsupported jsonrpc version: {}",
                other
            )))
        }
    }

    let has_id = object.get("id").is_some_and(|id| !id.is_null());
    let has_method = object.get("method").is_some();
    let has_outcome = object.contains_key("result") || object.contains_key("error");

    let mut value = value;
    if let Some(object) = value.as_object_mut() {
        object
            .entry("jsonrpc")
            .or_insert_with(|| Value::String(JSONRPC_VERSION.to_string()));
    }

    let envelope = if has_method && has_id {
        Envelope::Request(from_value(value, "request")?)
    } else if has_method {
        Envelope::Notification(from_value(value, "notification")?)
    } else if has_outcome && object_has_id_key(&value) {
        Envelope::Response(from_value(value, "response")?)
    } else {
        return Err(protocol_error(format!("unrecognized message shape: {}", frame)));
    };
    Ok(envelope)
}

fn object_has_id_key(value: &Value) -> bool {
    value.get("id").is_some()
}

fn from_value<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| protocol_error(format!("malformed {}: {}", what, e)))
}

/// Serialize request params.
pub fn to_params<T: Serialize>(params: &T) -> Result<Value> {
    Ok(serde_json::to_value(params)?)
}

/// Parse a call result into its typed shape.
pub fn parse_result<T: DeserializeOwned>(method: &str, result: Value) -> Result<T> {
    serde_json::from_value(result)
        .map_err(|e| protocol_error(format!("unexpected {} result: {}", method, e)))
}

/// Like [`parse_result`], but an empty or `null` result yields the default.
pub fn parse_result_or_default<T: DeserializeOwned + Default>(
    method: &str,
    result: Value,
) -> Result<T> {
    if result.is_null() {
        return Ok(T::default());
    }
    parse_result(method, result)
}

/// Notifications the agent can push to the client
#[derive(Debug, Clone, PartialEq)]
pub enum AgentNotification {
    SessionUpdate(SessionUpdateNotification),
    ConfigOptionsUpdate(ConfigOptionsUpdateParams),
    CurrentModeUpdate(CurrentModeUpdateParams),
}

impl AgentNotification {
    /// Methods with a typed notification
    pub const METHODS: [&'static str; 3] = [
        methods::SESSION_UPDATE,
        methods::CONFIG_OPTIONS_UPDATE,
        methods::CURRENT_MODE_UPDATE,
    ];

    /// Parse a notification. Unknown methods yield `Ok(None)`; a known
    /// method with an unparseable payload (including an unknown update
    /// kind) is a protocol error.
    pub fn parse(notification: &JsonRpcNotification) -> Result<Option<Self>> {
        let params = || {
            notification.params.clone().ok_or_else(|| {
                protocol_error(format!("missing params in {}", notification.method))
            })
        };

        let parsed = match notification.method.as_str() {
            methods::SESSION_UPDATE => {
                Self::SessionUpdate(from_value(params()?, methods::SESSION_UPDATE)?)
            }
            methods::CONFIG_OPTIONS_UPDATE => {
                Self::ConfigOptionsUpdate(from_value(params()?, methods::CONFIG_OPTIONS_UPDATE)?)
            }
            methods::CURRENT_MODE_UPDATE => {
                Self::CurrentModeUpdate(from_value(params()?, methods::CURRENT_MODE_UPDATE)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }

    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionUpdate(n) => &n.session_id,
            Self::ConfigOptionsUpdate(p) => &p.session_id,
            Self::CurrentModeUpdate(p) => &p.session_id,
        }
    }

    /// Fold the top-level forms into the `session/update` union.
    pub fn into_session_update(self) -> SessionUpdateNotification {
        match self {
            Self::SessionUpdate(n) => n,
            Self::ConfigOptionsUpdate(p) => SessionUpdateNotification {
                session_id: p.session_id,
                update: SessionUpdate::ConfigOptionsUpdate {
                    config_options: p.config_options,
                },
            },
            Self::CurrentModeUpdate(p) => SessionUpdateNotification {
                session_id: p.session_id,
                update: SessionUpdate::CurrentModeUpdate {
                    current_mode_id: p.current_mode_id,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JsonRpcError, RequestId, SessionModeId};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_encode_is_single_line() {
        let request = JsonRpcRequest::new(
            7u64,
            methods::SESSION_PROMPT,
            Some(json!({"sessionId": "s1", "prompt": [{"type": "text", "text": "a\nb"}]})),
        );
        let line = encode(&Envelope::Request(request)).unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains("\"jsonrpc\":\"2.0\""));
        assert!(line.contains("\"id\":7"));
    }

    #[test]
    fn test_decode_classifies_shapes() {
        let response = decode(r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#).unwrap();
        assert!(matches!(response, Envelope::Response(_)));

        let error = decode(r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32000,"message":"no"}}"#)
            .unwrap();
        match error {
            Envelope::Response(r) => assert_eq!(r.error.unwrap().code, -32000),
            other => panic!("unexpected envelope: {:?}", other),
        }

        let notification =
            decode(r#"{"jsonrpc":"2.0","method":"session/update","params":{}}"#).unwrap();
        assert_eq!(notification.method(), Some("session/update"));
        assert!(matches!(notification, Envelope::Notification(_)));

        let request = decode(
            r#"{"jsonrpc":"2.0","id":"perm-1","method":"session/request_permission","params":{}}"#,
        )
        .unwrap();
        match request {
            Envelope::Request(r) => assert_eq!(r.id, RequestId::Str("perm-1".into())),
            other => panic!("unexpected envelope: {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        for frame in [
            "not json",
            "[1,2,3]",
            r#"{"jsonrpc":"1.0","id":1,"result":{}}"#,
            r#"{"jsonrpc":"2.0","id":1}"#,
            r#"{"jsonrpc":"2.0"}"#,
        ] {
            let err = decode(frame).unwrap_err();
            assert!(
                matches!(err, Error::Acp(AcpError::Protocol(_))),
                "frame {:?} gave {:?}",
                frame,
                err
            );
        }
    }

    #[test]
    fn test_error_response_roundtrip() {
        let response = JsonRpcResponse::failure(
            RequestId::Number(3),
            JsonRpcError::method_not_found("fs/read_text_file"),
        );
        let decoded = decode(&encode(&Envelope::Response(response.clone())).unwrap()).unwrap();
        assert_eq!(decoded, Envelope::Response(response));
    }

    #[test]
    fn test_parse_known_notifications() {
        let update = JsonRpcNotification::new(
            methods::SESSION_UPDATE,
            Some(json!({
                "sessionId": "s1",
                "update": {"sessionUpdate": "plan", "entries": [{"content": "Recon", "status": "in_progress"}]}
            })),
        );
        let parsed = AgentNotification::parse(&update).unwrap().unwrap();
        assert_eq!(parsed.session_id(), "s1");
        assert!(matches!(
            parsed.into_session_update().update,
            SessionUpdate::Plan { .. }
        ));

        let mode = JsonRpcNotification::new(
            methods::CURRENT_MODE_UPDATE,
            Some(json!({"sessionId": "s1", "modeId": "plan"})),
        );
        match AgentNotification::parse(&mode)
            .unwrap()
            .unwrap()
            .into_session_update()
            .update
        {
            SessionUpdate::CurrentModeUpdate { current_mode_id } => {
                assert_eq!(current_mode_id, SessionModeId::new("plan"))
            }
            other => panic!("unexpected update: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_method_and_unknown_kind() {
        let unknown = JsonRpcNotification::new("$/progress", Some(json!({})));
        assert!(AgentNotification::parse(&unknown).unwrap().is_none());

        let bad_kind = JsonRpcNotification::new(
            methods::SESSION_UPDATE,
            Some(json!({"sessionId": "s1", "update": {"sessionUpdate": "telemetry"}})),
        );
        assert!(AgentNotification::parse(&bad_kind).is_err());
    }

    #[test]
    fn test_null_result_parses_to_default() {
        let parsed: crate::types::SelectionResponse =
            parse_result_or_default(methods::SESSION_SET_MODEL, Value::Null).unwrap();
        assert!(parsed.current_model_id.is_none());
    }
}
