//! Repository layer: table-scoped database operations.

mod audit;
mod conversation_log;
mod session;

pub use audit::*;
pub use conversation_log::*;
pub use session::*;
