//! Async frontend over tokio streams. Same semantics as [`crate::sync`],
//! suspending at transport reads and writes.

mod conn;
mod stream;

pub use conn::{Conn, ResultSet};
pub use stream::Stream;
