//! `select`, `select_one` and `count`: one query shape in three modes.

use super::{Filter, lateral, qualified, row_json};
use crate::sql::{Fragment, Node, ResultTransform, ident, raw, sql};
use std::collections::BTreeMap;

/// What a select returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectMode {
    /// A JSON array of row objects, `[]` when nothing matches.
    #[default]
    Many,
    /// The first row object, or `null`.
    One,
    /// The number of matching rows.
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nulls {
    First,
    Last,
}

impl Nulls {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Nulls::First => "NULLS FIRST",
            Nulls::Last => "NULLS LAST",
        }
    }
}

/// One `ORDER BY` item.
#[derive(Debug, Clone)]
pub struct OrderSpec {
    pub by: Node,
    pub direction: Direction,
    pub nulls: Option<Nulls>,
}

impl OrderSpec {
    pub fn new(by: impl Into<Node>, direction: Direction) -> Self {
        Self {
            by: by.into(),
            direction,
            nulls: None,
        }
    }

    /// Ascending on a column.
    pub fn asc(column: &str) -> Self {
        Self::new(ident(column), Direction::Asc)
    }

    /// Descending on a column.
    pub fn desc(column: &str) -> Self {
        Self::new(ident(column), Direction::Desc)
    }

    pub fn nulls(mut self, nulls: Nulls) -> Self {
        self.nulls = Some(nulls);
        self
    }

    fn into_node(self) -> Node {
        let mut seq = vec![self.by, raw(" "), raw(self.direction.as_sql())];
        if let Some(nulls) = self.nulls {
            seq.push(raw(" "));
            seq.push(raw(nulls.as_sql()));
        }
        Node::Seq(seq)
    }
}

/// Options for [`select`] and [`select_one`].
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    order: Vec<OrderSpec>,
    limit: Option<u64>,
    offset: Option<u64>,
    columns: Option<Vec<String>>,
    extras: BTreeMap<String, Fragment>,
    lateral: BTreeMap<String, Fragment>,
    alias: Option<String>,
}

impl SelectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an `ORDER BY` item.
    pub fn order(mut self, spec: OrderSpec) -> Self {
        self.order.push(spec);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Return only these columns instead of the whole row.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Add a computed value to every row object under `key`.
    pub fn extra(mut self, key: impl Into<String>, expr: Fragment) -> Self {
        self.extras.insert(key.into(), expr);
        self
    }

    /// Nest the result of a sub-select under `key`.
    ///
    /// The sub-select may reference this query's row with [`parent`](crate::sql::parent).
    pub fn lateral(mut self, key: impl Into<String>, subselect: Fragment) -> Self {
        self.lateral.insert(key.into(), subselect);
        self
    }

    /// Refer to the table by another name, needed when a statement uses the
    /// same table twice (self-joins through lateral sub-selects).
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// Options for [`count`].
#[derive(Debug, Clone, Default)]
pub struct CountOptions {
    columns: Option<Vec<String>>,
    alias: Option<String>,
}

impl CountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count only rows where all of these columns are non-null.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

impl From<CountOptions> for SelectOptions {
    fn from(options: CountOptions) -> Self {
        SelectOptions {
            columns: options.columns,
            alias: options.alias,
            ..SelectOptions::default()
        }
    }
}

/// All matching rows as a JSON array.
pub fn select(table: &str, filter: impl Into<Filter>, options: SelectOptions) -> Fragment {
    select_mode(table, filter, options, SelectMode::Many)
}

/// The first matching row as a JSON object, or `null`.
pub fn select_one(table: &str, filter: impl Into<Filter>, options: SelectOptions) -> Fragment {
    select_mode(table, filter, options, SelectMode::One)
}

/// The number of matching rows.
pub fn count(table: &str, filter: impl Into<Filter>, options: CountOptions) -> Fragment {
    select_mode(table, filter, options.into(), SelectMode::Count)
}

/// Build a select in the given mode.
///
/// `One` forces `LIMIT 1`. `Count` ignores extras and lateral sub-selects,
/// which never change the number of rows, and ordering and paging, which
/// would apply to the single aggregate row rather than the counted ones.
pub fn select_mode(
    table: &str,
    filter: impl Into<Filter>,
    options: SelectOptions,
    mode: SelectMode,
) -> Fragment {
    let SelectOptions {
        mut order,
        mut limit,
        mut offset,
        columns,
        extras,
        lateral,
        alias,
    } = options;

    match mode {
        SelectMode::One => limit = Some(1),
        SelectMode::Count => {
            order.clear();
            limit = None;
            offset = None;
        }
        SelectMode::Many => {}
    }
    let table_ref = alias.as_deref().unwrap_or(table);

    let mut rows = sql("SELECT ");
    rows = match mode {
        SelectMode::Count => rows.push_node(count_projection(columns.as_deref())),
        SelectMode::Many | SelectMode::One => rows
            .push_node(row_projection(table_ref, columns.as_deref()))
            .push_node(lateral::merge(&lateral))
            .push_node(extras_projection(extras)),
    };

    rows = rows.push(" AS result FROM ").push_ident(table);
    if let Some(alias) = &alias {
        rows = rows.push(" AS ").push_ident(alias.as_str());
    }
    if mode != SelectMode::Count {
        rows = rows.push_node(lateral::joins(table_ref, lateral));
    }

    if let Filter::Condition(condition) = filter.into() {
        rows = rows.push(" WHERE ").push_node(condition.into_node());
    }
    if !order.is_empty() {
        rows = rows
            .push(" ORDER BY ")
            .push_node(Node::join(order.into_iter().map(OrderSpec::into_node), ", "));
    }
    if let Some(limit) = limit {
        rows = rows.push(" LIMIT ").push_raw(limit.to_string());
    }
    if let Some(offset) = offset {
        rows = rows.push(" OFFSET ").push_raw(offset.to_string());
    }

    match mode {
        // Aggregate in an outer query so ORDER BY and LIMIT apply to the rows.
        SelectMode::Many => sql("SELECT coalesce(jsonb_agg(result), '[]') AS result FROM (")
            .push_fragment(rows)
            .push(") AS ")
            .push_ident(format!("sq_{table_ref}"))
            .with_transform(ResultTransform::First),
        SelectMode::One => rows.with_transform(ResultTransform::First),
        SelectMode::Count => rows.with_transform(ResultTransform::Count),
    }
}

fn row_projection(table: &str, columns: Option<&[String]>) -> Node {
    match columns {
        None => row_json(table),
        Some(columns) => Node::Seq(vec![
            raw("jsonb_build_object("),
            Node::join(
                columns.iter().map(|column| {
                    Node::Seq(vec![raw(format!("'{column}', ")), qualified(table, column)])
                }),
                ", ",
            ),
            raw(")"),
        ]),
    }
}

fn count_projection(columns: Option<&[String]>) -> Node {
    match columns {
        None | Some([]) => raw("count(*)"),
        Some([column]) => Node::Seq(vec![raw("count("), ident(column.as_str()), raw(")")]),
        Some(columns) => Node::Seq(vec![
            raw("count(*) FILTER (WHERE "),
            Node::join(
                columns
                    .iter()
                    .map(|column| Node::Seq(vec![ident(column.as_str()), raw(" IS NOT NULL")])),
                " AND ",
            ),
            raw(")"),
        ]),
    }
}

fn extras_projection(extras: BTreeMap<String, Fragment>) -> Node {
    if extras.is_empty() {
        return Node::empty();
    }

    let pairs = extras
        .into_iter()
        .map(|(key, expr)| Node::Seq(vec![raw(format!("'{key}', ")), Node::Fragment(expr)]));
    Node::Seq(vec![
        raw(" || jsonb_build_object("),
        Node::join(pairs, ", "),
        raw(")"),
    ])
}
