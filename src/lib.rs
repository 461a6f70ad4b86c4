pub mod constant;
pub mod error;
mod opts;
pub mod protocol;
mod resultset;
pub mod row;
mod statement;
pub mod value;

pub use error::{Error, Result};
pub use opts::Opts;
pub use row::{Rows, RowsView};
pub use statement::Statement;
pub use value::{Date, Datetime, FieldValue, FieldView, Time};

pub mod sync;

#[cfg(feature = "tokio")]
pub mod tokio;

#[cfg(test)]
mod opts_test;
#[cfg(test)]
mod value_test;
