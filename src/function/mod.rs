//! User functions: the three signature variants and their registry.

pub mod handler;
pub mod registry;

pub use handler::{CloudEventFunction, Function, FunctionError, HttpFunction, OpenFunction};
pub use registry::{FunctionRegistry, RegistryError};
