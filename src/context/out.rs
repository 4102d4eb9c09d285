//! Function results and their normalization.

use crate::function::FunctionError;
use bytes::Bytes;
use std::collections::HashMap;

/// Body used when a function succeeds without producing one.
pub const SUCCESS_BODY: &str = "Success";

/// The result record of an invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Out {
    pub code: Option<u16>,
    pub error: Option<FunctionError>,
    pub data: Option<Bytes>,
    pub metadata: Option<HashMap<String, String>>,
}

impl Out {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(data: impl Into<Bytes>) -> Self {
        Self::new().with_code(200).with_data(data)
    }

    pub fn error(error: FunctionError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Fill in the missing parts of a result.
    ///
    /// An absent result becomes 200 "Success". An error forces 500 with
    /// the error message as body. Otherwise a missing body becomes
    /// "Success" and a missing code 200. Applying it twice changes nothing.
    pub fn normalize(out: Option<Out>) -> Out {
        let Some(mut out) = out else {
            return Out::ok(SUCCESS_BODY);
        };

        if let Some(error) = &out.error {
            out.code = Some(500);
            out.data = Some(Bytes::from(error.message.clone()));
            return out;
        }

        if out.data.is_none() {
            out.data = Some(Bytes::from_static(SUCCESS_BODY.as_bytes()));
        }
        if out.code.is_none() {
            out.code = Some(200);
        }
        out
    }

    pub fn status(&self) -> u16 {
        self.code.unwrap_or(200)
    }

    pub fn body(&self) -> Bytes {
        self.data.clone().unwrap_or_default()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
