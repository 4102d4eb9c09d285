//! Response written by raw-HTTP functions, or built by the trigger from an `Out`.

use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;

/// Status code carried on the wire. Out-of-range codes are caught when the
/// listener encodes the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const PAYLOAD_TOO_LARGE: StatusCode = StatusCode(413);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode(code)
    }
}

/// A response under construction.
///
/// The HTTP trigger hands raw-HTTP functions a `200` response with no body;
/// they fill it in place with [`set_status`](Self::set_status),
/// [`set_header`](Self::set_header) and [`write`](Self::write).
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
}

impl HttpResponse {
    pub fn new(status: impl Into<StatusCode>) -> Self {
        Self {
            status: status.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn json<T: Serialize>(data: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::ok()
            .header("content-type", "application/json")
            .body(serde_json::to_vec(data)?))
    }

    /// Plain-text response, used for every error the runtime answers itself.
    pub fn error(status: impl Into<StatusCode>, message: impl Into<String>) -> Self {
        Self::new(status)
            .header("content-type", "text/plain")
            .body(message.into())
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(key, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn set_status(&mut self, status: impl Into<StatusCode>) {
        self.status = status.into();
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    /// Append to the body.
    pub fn write(&mut self, data: impl AsRef<[u8]>) {
        let mut body = self.body.take().map(|b| b.to_vec()).unwrap_or_default();
        body.extend_from_slice(data.as_ref());
        self.body = Some(Bytes::from(body));
    }

    pub fn text_body(&self) -> Option<String> {
        self.body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).to_string())
    }
}
