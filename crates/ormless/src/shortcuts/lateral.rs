//! Nested sub-selects joined with `LEFT JOIN LATERAL`.
//!
//! Each named sub-select is joined as `LEFT JOIN LATERAL (<sub>) AS "lateral_<key>" ON true`
//! and its `result` merged into the parent row under `<key>`. Filtering happens
//! inside the sub-select, so a parent row is never dropped for lack of a match:
//! it gets `[]` from a `Many` sub-select, `null` from a `One` sub-select and `0`
//! from a count.
//!
//! Sub-selects resolve [`parent`](crate::sql::parent) references against the
//! enclosing query's table alias. Every join opens its own scope, so nested
//! sub-selects may reuse keys of other levels.

use crate::sql::{Fragment, Node, ident, raw};
use std::collections::BTreeMap;

const ALIAS_PREFIX: &str = "lateral_";

fn alias(key: &str) -> String {
    format!("{ALIAS_PREFIX}{key}")
}

/// ` || jsonb_build_object('<key>', "lateral_<key>".result, ...)`, or nothing.
pub(super) fn merge(subselects: &BTreeMap<String, Fragment>) -> Node {
    if subselects.is_empty() {
        return Node::empty();
    }

    let pairs = subselects.keys().map(|key| {
        Node::Seq(vec![
            raw(format!("'{key}', ")),
            ident(alias(key)),
            raw(".result"),
        ])
    });
    Node::Seq(vec![
        raw(" || jsonb_build_object("),
        Node::join(pairs, ", "),
        raw(")"),
    ])
}

/// One ` LEFT JOIN LATERAL (...) AS "lateral_<key>" ON true` per sub-select.
pub(super) fn joins(parent_alias: &str, subselects: BTreeMap<String, Fragment>) -> Node {
    Node::Seq(
        subselects
            .into_iter()
            .map(|(key, subselect)| {
                Node::Seq(vec![
                    raw(" LEFT JOIN LATERAL ("),
                    Node::Fragment(subselect.with_parent_alias(parent_alias)),
                    raw(") AS "),
                    ident(alias(&key)),
                    raw(" ON true"),
                ])
            })
            .collect(),
    )
}
