//! Shortcut query builders.
//!
//! Each shortcut returns a [`Fragment`] whose result is shaped JSON: rows come
//! back as `to_jsonb(...)` objects in a `result` column and are unwrapped to an
//! object, an array, `null` or a number depending on the call.
//!
//! # Example
//!
//! ```ignore
//! use ormless::{insert, select, parent, record, Filter, SelectOptions};
//!
//! let author = insert("authors", record! { "id" => 1_i32, "name" => "Jane Austen", "isLiving" => false })
//!     .run(&client)
//!     .await?;
//!
//! let authors = select(
//!     "authors",
//!     Filter::All,
//!     SelectOptions::new().lateral(
//!         "books",
//!         select("books", record! { "authorId" => parent("id") }, SelectOptions::new()),
//!     ),
//! )
//! .run(&client)
//! .await?;
//! ```

mod insert;
mod lateral;
mod select;
mod truncate;
mod update;


pub use insert::{insert, upsert};
pub use select::{
    CountOptions, Direction, Nulls, OrderSpec, SelectMode, SelectOptions, count, select,
    select_mode, select_one,
};
pub use truncate::{ForeignKeys, Identity, TruncateOptions, truncate};
pub use update::{delete, update};

use crate::sql::{Fragment, Node, Record, Where, ident, raw};

/// One row or a batch of rows to insert.
///
/// A single row yields a single object, a batch yields an array.
#[derive(Debug, Clone)]
pub enum Rows {
    One(Record),
    Many(Vec<Record>),
}

impl From<Record> for Rows {
    fn from(record: Record) -> Self {
        Rows::One(record)
    }
}

impl From<Vec<Record>> for Rows {
    fn from(records: Vec<Record>) -> Self {
        Rows::Many(records)
    }
}

/// A mandatory row condition for `update` and `delete`.
///
/// An empty [`Where`] is the explicit "every row" form.
#[derive(Debug, Clone)]
pub enum Condition {
    Where(Where),
    Sql(Fragment),
}

impl Condition {
    pub(crate) fn into_node(self) -> Node {
        match self {
            Condition::Where(record) => Node::Where(record),
            Condition::Sql(fragment) => Node::Fragment(fragment),
        }
    }
}

impl From<Record> for Condition {
    fn from(record: Record) -> Self {
        Condition::Where(record)
    }
}

impl From<Fragment> for Condition {
    fn from(fragment: Fragment) -> Self {
        Condition::Sql(fragment)
    }
}

/// Row filter for selects and counts.
#[derive(Debug, Clone, Default)]
pub enum Filter {
    /// No `WHERE` clause.
    #[default]
    All,
    Condition(Condition),
}

impl From<Condition> for Filter {
    fn from(condition: Condition) -> Self {
        Filter::Condition(condition)
    }
}

impl From<Record> for Filter {
    fn from(record: Record) -> Self {
        Filter::Condition(Condition::Where(record))
    }
}

impl From<Fragment> for Filter {
    fn from(fragment: Fragment) -> Self {
        Filter::Condition(Condition::Sql(fragment))
    }
}

/// `"table"."column"`
pub(crate) fn qualified(table: &str, column: &str) -> Node {
    Node::Seq(vec![ident(table), raw("."), ident(column)])
}

/// `to_jsonb("table".*)`
pub(crate) fn row_json(table: &str) -> Node {
    Node::Seq(vec![raw("to_jsonb("), ident(table), raw(".*)")])
}
