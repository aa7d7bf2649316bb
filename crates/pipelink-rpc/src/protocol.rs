//! JSON-RPC 2.0 message types
//!
//! Both directions of traffic share one connection, so an inbound frame
//! may be either a request from the peer or a response to one of our
//! outbound calls; [`Incoming`] tells them apart by shape. An `id` of
//! `null` (or absent) marks a notification that expects no response.

use pipelink_core::error_codes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";

/// Parameter mapping passed to handlers
pub type Params = Map<String, Value>;

/// JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub id: Value,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Params, id: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            method: method.into(),
            params,
            id,
        }
    }

    /// Request with `id: null`, expecting no response
    pub fn notification(method: impl Into<String>, params: Params) -> Self {
        Self::new(method, params, Value::Null)
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_null()
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
}

impl ErrorObject {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// JSON-RPC response; exactly one of `result`/`error` is present
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    pub id: Value,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            result: None,
            error: Some(ErrorObject::new(code, message)),
            id,
        }
    }
}

/// An inbound frame, classified by shape
#[derive(Debug)]
pub enum Incoming {
    Request(Request),
    Response(Response),
}

impl Incoming {
    /// Classifies one frame body.
    ///
    /// A `method` key marks a request; a `result` or `error` key marks a
    /// response. Anything else is rejected with the JSON-RPC code the
    /// connection loop should answer with (`-32700` for unparseable
    /// bodies, `-32600` for well-formed JSON of the wrong shape).
    pub fn parse(body: &str) -> Result<Self, ErrorObject> {
        let value: Value = serde_json::from_str(body).map_err(|e| {
            ErrorObject::new(error_codes::PARSE_ERROR, format!("parse error: {e}"))
        })?;

        let Some(object) = value.as_object() else {
            return Err(ErrorObject::new(
                error_codes::INVALID_REQUEST,
                "message is not a JSON object",
            ));
        };

        if object.contains_key("method") {
            let request = Request::deserialize(&value).map_err(|e| {
                ErrorObject::new(error_codes::INVALID_REQUEST, format!("invalid request: {e}"))
            })?;
            return Ok(Incoming::Request(request));
        }

        if object.contains_key("result") || object.contains_key("error") {
            let response = Response::deserialize(&value).map_err(|e| {
                ErrorObject::new(
                    error_codes::INVALID_REQUEST,
                    format!("invalid response: {e}"),
                )
            })?;
            return Ok(Incoming::Response(response));
        }

        Err(ErrorObject::new(
            error_codes::INVALID_REQUEST,
            "message is neither a request nor a response",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let mut params = Params::new();
        params.insert("message".into(), json!("hello"));
        let request = Request::new("log_message", params, json!(3));

        let text = serde_json::to_string(&request).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "log_message");
        assert_eq!(value["params"]["message"], "hello");
        assert_eq!(value["id"], 3);
    }

    #[test]
    fn test_success_response_omits_error_key() {
        let response = Response::success(json!(1), json!("1.2.3"));
        let text = serde_json::to_string(&response).unwrap();
        assert!(text.contains(r#""result":"1.2.3""#));
        assert!(!text.contains("error"));
    }

    #[test]
    fn test_error_response_omits_result_key() {
        let response = Response::failure(json!(2), -32601, "method not found");
        let text = serde_json::to_string(&response).unwrap();
        assert!(text.contains(r#""code":-32601"#));
        assert!(!text.contains("result"));
    }

    #[test]
    fn test_classify_request() {
        let body = r#"{"jsonrpc":"2.0","method":"get_version","params":{},"id":1}"#;
        match Incoming::parse(body).unwrap() {
            Incoming::Request(request) => {
                assert_eq!(request.method, "get_version");
                assert!(!request.is_notification());
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_notification() {
        // id absent and id null are both notifications
        for body in [
            r#"{"jsonrpc":"2.0","method":"tick","params":{}}"#,
            r#"{"jsonrpc":"2.0","method":"tick","params":{},"id":null}"#,
        ] {
            match Incoming::parse(body).unwrap() {
                Incoming::Request(request) => assert!(request.is_notification()),
                other => panic!("expected request, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_classify_response() {
        let body = r#"{"jsonrpc":"2.0","result":{"ok":true},"id":42}"#;
        match Incoming::parse(body).unwrap() {
            Incoming::Response(response) => {
                assert_eq!(response.id, json!(42));
                assert!(response.error.is_none());
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_error_response() {
        let body = r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"boom"},"id":"abc"}"#;
        match Incoming::parse(body).unwrap() {
            Incoming::Response(response) => {
                let error = response.error.unwrap();
                assert_eq!(error.code, -32603);
                assert_eq!(error.message, "boom");
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_body_yields_parse_error_code() {
        let error = Incoming::parse("{not json").unwrap_err();
        assert_eq!(error.code, error_codes::PARSE_ERROR);
    }

    #[test]
    fn test_wrong_shape_yields_invalid_request_code() {
        let error = Incoming::parse(r#"{"jsonrpc":"2.0","id":1}"#).unwrap_err();
        assert_eq!(error.code, error_codes::INVALID_REQUEST);

        let error = Incoming::parse(r#"[1,2,3]"#).unwrap_err();
        assert_eq!(error.code, error_codes::INVALID_REQUEST);
    }
}
