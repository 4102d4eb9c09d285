//! Trigger adapters: how invocations are started.

pub mod callback;
pub mod event;
pub mod http;
pub mod listener;

pub use callback::CallbackServer;
pub use event::{DeliveryError, EventAdapter};
pub use http::HttpAdapter;
pub use listener::{Handler, Listener};
