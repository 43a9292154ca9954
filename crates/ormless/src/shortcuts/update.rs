//! `update` and `delete`.
//!
//! Both take a [`Condition`]; there is no way to leave it out. Pass an empty
//! [`Where`](crate::sql::Where) to touch every row.

use super::{Condition, row_json};
use crate::sql::{Fragment, Node, Record, ResultTransform, sql};

/// `UPDATE "table" SET (...) = ROW(...) WHERE ... RETURNING to_jsonb("table".*) AS result`
///
/// Returns the updated rows as an array. Fragment values see their column as
/// the self reference, e.g. `sql("").push_self().push(" + 1")`.
/// With no values to set, nothing is written and the matching rows are returned.
pub fn update(table: &str, values: Record, condition: impl Into<Condition>) -> Fragment {
    let condition = condition.into().into_node();

    if values.is_empty() {
        return sql("SELECT ")
            .push_node(row_json(table))
            .push(" AS result FROM ")
            .push_ident(table)
            .push(" WHERE ")
            .push_node(condition)
            .with_transform(ResultTransform::All);
    }

    sql("UPDATE ")
        .push_ident(table)
        .push(" SET (")
        .push_node(Node::cols_of(&values))
        .push(") = ROW(")
        .push_vals(values)
        .push(") WHERE ")
        .push_node(condition)
        .push(" RETURNING ")
        .push_node(row_json(table))
        .push(" AS result")
        .with_transform(ResultTransform::All)
}

/// `DELETE FROM "table" WHERE ... RETURNING to_jsonb("table".*) AS result`
pub fn delete(table: &str, condition: impl Into<Condition>) -> Fragment {
    sql("DELETE FROM ")
        .push_ident(table)
        .push(" WHERE ")
        .push_node(condition.into().into_node())
        .push(" RETURNING ")
        .push_node(row_json(table))
        .push(" AS result")
        .with_transform(ResultTransform::All)
}
