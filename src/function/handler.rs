//! Function signatures and the function error type.

use crate::context::{CloudEvent, InvocationContext, Out};
use crate::http::{HttpResponse, Method};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

static DEFAULT_METHODS: [Method; 6] = Method::DEFAULT_ALLOWED;

/// A function that owns the HTTP exchange.
///
/// The request is read from [`InvocationContext::http_request`] and the
/// response written through [`InvocationContext::http_response_mut`].
#[async_trait]
pub trait HttpFunction: Send + Sync {
    async fn service(&self, ctx: &mut InvocationContext) -> Result<(), FunctionError>;

    /// Methods this function accepts; anything else gets 405.
    fn methods(&self) -> &[Method] {
        &DEFAULT_METHODS
    }

    /// Path prefix this function is served under.
    fn path(&self) -> &str {
        "/"
    }
}

/// A function that consumes a parsed structured event.
#[async_trait]
pub trait CloudEventFunction: Send + Sync {
    async fn accept(
        &self,
        ctx: &mut InvocationContext,
        event: &CloudEvent,
    ) -> Result<(), FunctionError>;
}

/// A function that consumes a raw payload, from any trigger.
///
/// Returning `Ok(None)` leaves the result to normalization ("Success").
#[async_trait]
pub trait OpenFunction: Send + Sync {
    async fn accept(
        &self,
        ctx: &mut InvocationContext,
        payload: &str,
    ) -> Result<Option<Out>, FunctionError>;
}

/// A registered function in one of its three signature variants.
#[derive(Clone)]
pub enum Function {
    Http(Arc<dyn HttpFunction>),
    CloudEvent(Arc<dyn CloudEventFunction>),
    Open(Arc<dyn OpenFunction>),
}

impl Function {
    pub fn http(function: impl HttpFunction + 'static) -> Self {
        Function::Http(Arc::new(function))
    }

    pub fn cloud_event(function: impl CloudEventFunction + 'static) -> Self {
        Function::CloudEvent(Arc::new(function))
    }

    pub fn open(function: impl OpenFunction + 'static) -> Self {
        Function::Open(Arc::new(function))
    }

    /// Short name of the signature variant, for logs and span tags.
    pub fn variant(&self) -> &'static str {
        match self {
            Function::Http(_) => "http",
            Function::CloudEvent(_) => "cloudevent",
            Function::Open(_) => "open",
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Function").field(&self.variant()).finish()
    }
}

/// Error reported by a function or an interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionError {
    /// Error message.
    pub message: String,
    /// Error code.
    pub code: u16,
}

impl FunctionError {
    /// Create a new FunctionError.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: 500,
        }
    }

    /// Create a FunctionError with a specific code.
    pub fn with_code(code: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }

    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_code(400, message)
    }
}

impl fmt::Display for FunctionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for FunctionError {}

impl From<FunctionError> for HttpResponse {
    fn from(err: FunctionError) -> Self {
        HttpResponse::error(err.code, err.message)
    }
}

impl From<std::io::Error> for FunctionError {
    fn from(err: std::io::Error) -> Self {
        FunctionError::new(err.to_string())
    }
}

impl From<serde_json::Error> for FunctionError {
    fn from(err: serde_json::Error) -> Self {
        FunctionError::bad_request(err.to_string())
    }
}

impl From<crate::context::SendError> for FunctionError {
    fn from(err: crate::context::SendError) -> Self {
        FunctionError::new(err.to_string())
    }
}
