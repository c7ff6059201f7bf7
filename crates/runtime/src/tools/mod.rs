//! Tool catalog, argument validation and dispatch.

mod backend;
mod dispatcher;
pub mod errors;
mod registry;
mod schema;

pub use backend::{ToolBackend, ToolboxBackend};
pub use dispatcher::{DispatchConfig, Dispatcher};
pub use errors::ToolError;
pub use registry::{ToolRegistry, ToolSpec};
pub use schema::{ArgumentSchema, FieldKind, FieldSpec, ToolArguments};
