//! Expression nodes and column-keyed records.

use super::fragment::Fragment;
use crate::param::Param;
use std::collections::BTreeMap;
use tokio_postgres::types::ToSql;

/// One typed node of a SQL expression tree.
///
/// Nodes sit between the literal text segments of a [`Fragment`] and are
/// turned into SQL text (and bound parameters) by the compiler.
#[derive(Clone, Debug)]
pub enum Node {
    /// Table or column name, emitted double-quoted and unescaped.
    Ident(String),
    /// Bound value, emitted as the next `$n` placeholder.
    Param(Param),
    /// Trusted SQL emitted verbatim.
    Raw(String),
    /// `DEFAULT`
    Default,
    /// The column currently being assigned or compared.
    SelfRef,
    /// A column of the enclosing query's current row.
    Parent(String),
    /// Quoted column names, comma-separated.
    Cols(Vec<String>),
    /// Record values in column order, comma-separated.
    Vals(Record),
    /// A nested fragment.
    Fragment(Fragment),
    /// Nodes compiled back to back with nothing in between.
    Seq(Vec<Node>),
    /// Record compiled as an AND-ed equality predicate.
    Where(Record),
}

impl Node {
    /// Column names of a record, in the same order [`Node::Vals`] emits its values.
    pub fn cols_of(record: &Record) -> Self {
        Node::Cols(record.keys().map(str::to_string).collect())
    }

    /// Explicit column names, kept in the given order.
    pub fn cols<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Node::Cols(names.into_iter().map(Into::into).collect())
    }

    /// Join nodes with a raw separator, e.g. `", "`.
    pub fn join(items: impl IntoIterator<Item = Node>, separator: &str) -> Self {
        let mut seq = Vec::new();
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                seq.push(Node::Raw(separator.to_string()));
            }
            seq.push(item);
        }
        Node::Seq(seq)
    }

    /// An empty sequence, compiling to nothing.
    pub fn empty() -> Self {
        Node::Seq(Vec::new())
    }
}

impl From<Fragment> for Node {
    fn from(fragment: Fragment) -> Self {
        Node::Fragment(fragment)
    }
}

/// A value stored under a column of a [`Record`].
#[derive(Clone, Debug)]
pub enum Cell {
    /// Plain value, bound as a parameter.
    Value(Param),
    /// The column's default (`DEFAULT`).
    Default,
    /// A column of the enclosing query's current row.
    Parent(String),
    /// A fragment compiled with the cell's column as its self reference.
    Sql(Fragment),
}

/// Conversion into a [`Cell`].
///
/// Any `ToSql` value becomes a bound parameter; fragments and cells pass through.
pub trait IntoCell {
    fn into_cell(self) -> Cell;
}

impl<T: ToSql + Send + Sync + 'static> IntoCell for T {
    fn into_cell(self) -> Cell {
        Cell::Value(Param::new(self))
    }
}

impl IntoCell for Cell {
    fn into_cell(self) -> Cell {
        self
    }
}

impl IntoCell for Fragment {
    fn into_cell(self) -> Cell {
        Cell::Sql(self)
    }
}

/// Reference a column of the enclosing query's row (inside lateral sub-selects).
pub fn parent(column: impl Into<String>) -> Cell {
    Cell::Parent(column.into())
}

pub fn param<T: ToSql + Send + Sync + 'static>(value: T) -> Node {
    Node::Param(Param::new(value))
}

pub fn raw(sql: impl Into<String>) -> Node {
    Node::Raw(sql.into())
}

pub fn ident(name: impl Into<String>) -> Node {
    Node::Ident(name.into())
}

pub fn self_ref() -> Node {
    Node::SelfRef
}

pub fn default() -> Node {
    Node::Default
}

/// Column names of a record, see [`Node::cols_of`].
pub fn cols(record: &Record) -> Node {
    Node::cols_of(record)
}

pub fn vals(record: Record) -> Node {
    Node::Vals(record)
}

/// Column-keyed values.
///
/// Keys are kept in lexicographic order, so a record's column list and value
/// list always line up and equal records always compile to the same SQL.
#[derive(Clone, Debug, Default)]
pub struct Record(BTreeMap<String, Cell>);

/// A predicate object: `{ column: value }` pairs compiled as `"column" = value AND ...`.
pub type Where = Record;

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing any previous value.
    pub fn set(mut self, column: impl Into<String>, value: impl IntoCell) -> Self {
        self.0.insert(column.into(), value.into_cell());
        self
    }

    /// Set a column to its default.
    pub fn set_default(self, column: impl Into<String>) -> Self {
        self.set(column, Cell::Default)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl IntoCell) -> Option<Cell> {
        self.0.insert(column.into(), value.into_cell())
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.0.get(column)
    }

    pub fn contains_key(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Cell)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Cell)>>(iter: I) -> Self {
        Record(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl IntoIterator for Record {
    type Item = (String, Cell);
    type IntoIter = std::collections::btree_map::IntoIter<String, Cell>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Build a [`Record`] from `column => value` pairs.
///
/// ```ignore
/// let author = ormless::record! { "id" => 1_i32, "name" => "Jane Austen", "isLiving" => false };
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::sql::Record::new()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {
        $crate::sql::Record::new()$(.set($column, $value))+
    };
}
