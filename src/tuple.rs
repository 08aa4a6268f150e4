//! Tuples and table schemas.
//!
//! - [`Schema`]: ordered column definitions with NOT-NULL constraints
//! - [`Tuple`]: a row of [`Value`](crate::datum::Value)s in schema order

mod record;
mod schema;

pub use record::Tuple;
pub use schema::{Column, Schema};
