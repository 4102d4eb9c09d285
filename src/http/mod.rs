//! HTTP value types exchanged with raw-HTTP functions.

mod request;
mod response;

pub use request::{HttpRequest, Method};
pub use response::{HttpResponse, StatusCode};
