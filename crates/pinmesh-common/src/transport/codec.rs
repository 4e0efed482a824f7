use crate::protocol::error::Result;
use crate::protocol::{Request, Response};

/// JSON codec for encoding/decoding RPC messages
///
/// Uses JSON serialization for compatibility with the `serde_json::Value`
/// payloads carried in `Request` args and `Response` result fields.
///
/// # Example
///
/// ```
/// use pinmesh_common::transport::JsonCodec;
/// use pinmesh_common::protocol::{Request, Response};
/// use serde_json::json;
///
/// // Encode/decode requests
/// let request = Request::new("Cluster.Status", json!("QmFoo"));
/// let encoded = JsonCodec::encode_request(&request).unwrap();
/// let decoded = JsonCodec::decode_request(&encoded).unwrap();
///
/// // Encode/decode responses
/// let response = Response::success(123, json!({"result": "ok"}));
/// let encoded = JsonCodec::encode_response(&response).unwrap();
/// let decoded = JsonCodec::decode_response(&encoded).unwrap();
/// ```
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a request to bytes
    pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(request)?)
    }

    /// Decode a request from bytes
    pub fn decode_request(data: &[u8]) -> Result<Request> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Encode a response to bytes
    pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(response)?)
    }

    /// Decode a response from bytes
    pub fn decode_response(data: &[u8]) -> Result<Response> {
        Ok(serde_json::from_slice(data)?)
    }
}
