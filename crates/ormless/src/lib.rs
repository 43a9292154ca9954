//! # ormless
//!
//! A thin Postgres query layer: SQL fragments, shortcut queries that return
//! JSON, and transactions that retry on serialization conflicts.
//!
//! ## Features
//!
//! - **SQL first**: queries are built from literal SQL interleaved with typed nodes
//!   (identifiers, bound values, column lists, predicates); values are always bound
//! - **JSON results**: shortcuts return rows as `to_jsonb` objects, shaped into an
//!   object, an array, `null` or a count
//! - **Nested results**: lateral sub-selects nest related rows into their parent row
//! - **Explicit mutations**: `update` and `delete` always take a condition
//! - **Retrying transactions**: serialization failures and deadlocks are retried
//!   with a random back-off; `transaction_at` also checks isolation levels at
//!   compile time
//! - **Logging**: executed SQL is logged through `tracing` (target `ormless.sql`)
//!
//! ## Shortcuts
//!
//! ```ignore
//! use ormless::{insert, select_one, update, delete, record, SelectOptions};
//!
//! insert("authors", record! { "id" => 1_i32, "name" => "Jane Austen", "isLiving" => false })
//!     .run(&client)
//!     .await?;
//!
//! let author = select_one("authors", record! { "id" => 1_i32 }, SelectOptions::new())
//!     .run(&client)
//!     .await?;
//!
//! update("authors", record! { "isLiving" => false }, record! { "id" => 1_i32 })
//!     .run(&client)
//!     .await?;
//!
//! delete("authors", record! { "id" => 1_i32 }).run(&client).await?;
//! ```
//!
//! ## Raw SQL
//!
//! ```ignore
//! use ormless::sql;
//!
//! let rows = sql("SELECT name FROM ")
//!     .push_ident("authors")
//!     .push(" WHERE id = ")
//!     .push_bind(1_i32)
//!     .run_rows(&client)
//!     .await?;
//! ```

pub mod client;
pub mod error;
pub mod param;
pub mod shortcuts;
pub mod sql;
pub mod transaction;

pub use client::GenericClient;
pub use error::{OrmError, OrmResult};
pub use param::{Null, Param};
pub use shortcuts::{
    Condition, CountOptions, Direction, Filter, ForeignKeys, Identity, Nulls, OrderSpec, Rows,
    SelectMode, SelectOptions, TruncateOptions, count, delete, insert, select, select_mode,
    select_one, truncate, update, upsert,
};
pub use sql::{Cell, Fragment, Node, Record, ResultTransform, Where, parent, sql};
pub use transaction::{
    ConnectionSource, Isolation, TransactionConfig, Txn, level, transaction, transaction_at,
    transaction_with,
};

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config};
