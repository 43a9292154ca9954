//! SQL fragments and the expression compiler.
//!
//! A [`Fragment`] is literal SQL text interleaved with typed [`Node`]s.
//! Nodes compile to quoted identifiers, `$n` placeholders, column lists,
//! value lists and predicate objects, so values never end up spliced into
//! the SQL text.
//!
//! # Example
//!
//! ```ignore
//! use ormless::sql::{sql, Where};
//!
//! let books = sql("SELECT * FROM ")
//!     .push_ident("books")
//!     .push(" WHERE ")
//!     .push_where(
//!         Where::new()
//!             .set("authorId", 1_i32)
//!             .set("createdAt", sql("").push_self().push(" > now() - ").push_bind(7_i32).push(" * INTERVAL '1 DAY'")),
//!     );
//!
//! // SELECT * FROM "books" WHERE ("authorId" = $1 AND ("createdAt" > now() - $2 * INTERVAL '1 DAY'))
//! let rows = books.run_rows(&client).await?;
//! ```

mod compile;
mod fragment;
mod node;

#[cfg(test)]
mod tests;

pub use compile::{Compiled, Context, compile_node};
pub use fragment::{Fragment, RESULT_COLUMN, ResultTransform};
pub use node::{
    Cell, IntoCell, Node, Record, Where, cols, default, ident, param, parent, raw, self_ref, vals,
};

/// Start building a SQL fragment.
pub fn sql(initial_sql: impl Into<String>) -> Fragment {
    Fragment::new(initial_sql)
}
