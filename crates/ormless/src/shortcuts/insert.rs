//! `insert` and `upsert`.

use super::{Rows, qualified, row_json};
use crate::sql::{Cell, Fragment, Node, Record, ResultTransform, ident, raw, sql};
use std::collections::BTreeSet;

/// What goes after `INSERT INTO "table"`.
enum Values {
    /// An empty batch.
    Nothing,
    /// `n` rows made only of column defaults.
    Defaults(usize),
    /// Rows sharing one column list, missing columns already filled with `DEFAULT`.
    Rows {
        columns: Vec<String>,
        rows: Vec<Record>,
    },
}

impl Values {
    fn from_rows(rows: Rows) -> (Self, ResultTransform) {
        match rows {
            Rows::One(record) if record.is_empty() => (Values::Defaults(1), ResultTransform::First),
            Rows::One(record) => {
                let columns = record.keys().map(str::to_string).collect();
                (
                    Values::Rows {
                        columns,
                        rows: vec![record],
                    },
                    ResultTransform::First,
                )
            }
            Rows::Many(records) if records.is_empty() => (Values::Nothing, ResultTransform::All),
            Rows::Many(records) => {
                let count = records.len();
                let (columns, rows) = fill_missing_with_default(records);
                let values = if columns.is_empty() {
                    Values::Defaults(count)
                } else {
                    Values::Rows { columns, rows }
                };
                (values, ResultTransform::All)
            }
        }
    }

    fn columns(&self) -> &[String] {
        match self {
            Values::Rows { columns, .. } => columns,
            _ => &[],
        }
    }

    fn push_onto(self, query: Fragment) -> Fragment {
        match self {
            Values::Nothing => query,
            Values::Defaults(1) => query.push(" DEFAULT VALUES"),
            Values::Defaults(n) => query
                .push(" SELECT FROM generate_series(1, ")
                .push_raw(n.to_string())
                .push(")"),
            Values::Rows { columns, rows } => query
                .push(" (")
                .push_node(Node::cols(columns))
                .push(") VALUES ")
                .push_node(Node::join(
                    rows.into_iter()
                        .map(|row| Node::Seq(vec![raw("("), Node::Vals(row), raw(")")])),
                    ", ",
                )),
        }
    }
}

/// Give every row the union of all rows' columns, filling gaps with `DEFAULT`.
fn fill_missing_with_default(records: Vec<Record>) -> (Vec<String>, Vec<Record>) {
    let columns: BTreeSet<String> = records
        .iter()
        .flat_map(|record| record.keys().map(str::to_string))
        .collect();

    let rows = records
        .into_iter()
        .map(|mut record| {
            for column in &columns {
                if !record.contains_key(column) {
                    record.insert(column.clone(), Cell::Default);
                }
            }
            record
        })
        .collect();

    (columns.into_iter().collect(), rows)
}

fn nothing_inserted() -> Fragment {
    sql("SELECT NULL::jsonb AS result WHERE false").with_transform(ResultTransform::All)
}

/// `INSERT INTO "table" (...) VALUES (...) RETURNING to_jsonb("table".*) AS result`
///
/// Rows of a batch may have different columns; missing ones are inserted as
/// `DEFAULT`, never `NULL`.
pub fn insert(table: &str, rows: impl Into<Rows>) -> Fragment {
    let (values, transform) = Values::from_rows(rows.into());
    if let Values::Nothing = values {
        return nothing_inserted();
    }

    values
        .push_onto(sql("INSERT INTO ").push_ident(table))
        .push(" RETURNING ")
        .push_node(row_json(table))
        .push(" AS result")
        .with_transform(transform)
}

/// Insert, or update on conflict with `unique_cols`.
///
/// Columns listed in `no_null_update_cols` keep their stored value when the
/// incoming one is `NULL`. Each returned object carries `"$action"`, either
/// `"INSERT"` or `"UPDATE"`, derived from the Postgres `xmax` system column.
pub fn upsert(
    table: &str,
    rows: impl Into<Rows>,
    unique_cols: &[&str],
    no_null_update_cols: &[&str],
) -> Fragment {
    let (values, transform) = Values::from_rows(rows.into());
    if let Values::Nothing = values {
        return nothing_inserted();
    }

    let mut unique: Vec<&str> = unique_cols.to_vec();
    unique.sort_unstable();
    unique.dedup();

    let mut update_cols: Vec<String> = values
        .columns()
        .iter()
        .filter(|c| !unique.contains(&c.as_str()))
        .cloned()
        .collect();
    // Only key columns: rewrite them so the conflicting row is still returned.
    if update_cols.is_empty() {
        update_cols = unique.iter().map(|c| c.to_string()).collect();
    }

    let update_vals = Node::join(
        update_cols.iter().map(|column| {
            if no_null_update_cols.contains(&column.as_str()) {
                Node::Seq(vec![
                    raw("CASE WHEN "),
                    excluded(column),
                    raw(" IS NULL THEN "),
                    qualified(table, column),
                    raw(" ELSE "),
                    excluded(column),
                    raw(" END"),
                ])
            } else {
                excluded(column)
            }
        }),
        ", ",
    );

    values
        .push_onto(sql("INSERT INTO ").push_ident(table))
        .push(" ON CONFLICT (")
        .push_node(Node::cols(unique))
        .push(") DO UPDATE SET (")
        .push_node(Node::cols(update_cols))
        .push(") = ROW(")
        .push_node(update_vals)
        .push(") RETURNING ")
        .push_node(row_json(table))
        .push(" || jsonb_build_object('$action', CASE xmax WHEN 0 THEN 'INSERT' ELSE 'UPDATE' END) AS result")
        .with_transform(transform)
}

fn excluded(column: &str) -> Node {
    Node::Seq(vec![raw("EXCLUDED."), ident(column)])
}
