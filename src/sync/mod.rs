//! Blocking frontend over `std::net` streams.

mod conn;
mod stream;

pub use conn::{Conn, ResultSet};
pub use stream::Stream;
