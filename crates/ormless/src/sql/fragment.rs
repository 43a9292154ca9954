//! SQL fragments: literal text interleaved with expression nodes.

use super::compile::{Compiled, Context};
use super::node::{Node, Record};
use crate::client::GenericClient;
use crate::error::{OrmError, OrmResult};
use crate::param::Param;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// Column every shortcut query returns its JSON in.
pub const RESULT_COLUMN: &str = "result";

/// How the rows of an executed fragment become its JSON result.
///
/// The JSON is read from each row's `result` column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultTransform {
    /// Every row's result, as an array.
    #[default]
    All,
    /// The first row's result, or `null` when there are no rows.
    First,
    /// The first row's `bigint` result as a number, `0` when there are no rows.
    Count,
}

impl ResultTransform {
    /// Shape extracted per-row results.
    pub fn apply(self, results: Vec<Value>) -> Value {
        match self {
            ResultTransform::All => Value::Array(results),
            ResultTransform::First => results.into_iter().next().unwrap_or(Value::Null),
            ResultTransform::Count => results.into_iter().next().unwrap_or_else(|| Value::from(0)),
        }
    }

    fn extract(self, rows: &[Row]) -> OrmResult<Vec<Value>> {
        rows.iter()
            .map(|row| {
                let value = match self {
                    ResultTransform::Count => row.try_get::<_, i64>(RESULT_COLUMN).map(Value::from),
                    _ => row.try_get::<_, Value>(RESULT_COLUMN),
                };
                value.map_err(|e| OrmError::decode(RESULT_COLUMN, e.to_string()))
            })
            .collect()
    }
}

/// A composable SQL expression: `literals[0] node[0] literals[1] ... literals[n]`.
///
/// Invariant: there is always exactly one more literal than there are nodes.
/// Fragments are built per call, compiled on `run`, and then dropped.
#[derive(Clone, Debug)]
pub struct Fragment {
    literals: Vec<String>,
    nodes: Vec<Node>,
    transform: ResultTransform,
    parent_alias: Option<String>,
}

impl Fragment {
    /// Create a fragment starting with literal text.
    pub fn new(initial_sql: impl Into<String>) -> Self {
        Self {
            literals: vec![initial_sql.into()],
            nodes: Vec::new(),
            transform: ResultTransform::default(),
            parent_alias: None,
        }
    }

    /// Create an empty fragment.
    pub fn empty() -> Self {
        Self::new("")
    }

    /// Build a fragment from ordered literals and the nodes between them.
    ///
    /// Fails with [`OrmError::Compile`] unless `literals.len() == nodes.len() + 1`.
    pub fn from_parts(literals: Vec<String>, nodes: Vec<Node>) -> OrmResult<Self> {
        if literals.len() != nodes.len() + 1 {
            return Err(OrmError::compile(format!(
                "fragment needs one more literal than nodes, got {} literals and {} nodes",
                literals.len(),
                nodes.len()
            )));
        }
        Ok(Self {
            literals,
            nodes,
            transform: ResultTransform::default(),
            parent_alias: None,
        })
    }

    /// Append literal SQL text.
    pub fn push(mut self, sql: &str) -> Self {
        if let Some(last) = self.literals.last_mut() {
            last.push_str(sql);
        }
        self
    }

    /// Append a node.
    pub fn push_node(mut self, node: impl Into<Node>) -> Self {
        self.nodes.push(node.into());
        self.literals.push(String::new());
        self
    }

    /// Append a double-quoted identifier.
    pub fn push_ident(self, name: impl Into<String>) -> Self {
        self.push_node(Node::Ident(name.into()))
    }

    /// Append a `$n` placeholder and bind its value.
    pub fn push_bind<T: ToSql + Send + Sync + 'static>(self, value: T) -> Self {
        self.push_node(Node::Param(Param::new(value)))
    }

    /// Append trusted SQL verbatim.
    pub fn push_raw(self, sql: impl Into<String>) -> Self {
        self.push_node(Node::Raw(sql.into()))
    }

    /// Append `DEFAULT`.
    pub fn push_default(self) -> Self {
        self.push_node(Node::Default)
    }

    /// Append a reference to the column currently being assigned or compared.
    pub fn push_self(self) -> Self {
        self.push_node(Node::SelfRef)
    }

    /// Append a reference to a column of the enclosing query's row.
    pub fn push_parent(self, column: impl Into<String>) -> Self {
        self.push_node(Node::Parent(column.into()))
    }

    /// Append the quoted column names of a record.
    pub fn push_cols(self, record: &Record) -> Self {
        self.push_node(Node::cols_of(record))
    }

    /// Append the values of a record, in column order.
    pub fn push_vals(self, record: Record) -> Self {
        self.push_node(Node::Vals(record))
    }

    /// Append a record as an AND-ed equality predicate.
    pub fn push_where(self, record: Record) -> Self {
        self.push_node(Node::Where(record))
    }

    /// Append a nested fragment.
    pub fn push_fragment(self, fragment: Fragment) -> Self {
        self.push_node(Node::Fragment(fragment))
    }

    /// Set how executed rows become the JSON result.
    pub fn with_transform(mut self, transform: ResultTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Set the table alias that parent references inside this fragment resolve to.
    pub(crate) fn with_parent_alias(mut self, alias: impl Into<String>) -> Self {
        self.parent_alias = Some(alias.into());
        self
    }

    pub fn literals(&self) -> &[String] {
        &self.literals
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn transform(&self) -> ResultTransform {
        self.transform
    }

    pub fn parent_alias(&self) -> Option<&str> {
        self.parent_alias.as_deref()
    }

    /// Compile into SQL text with `$1, $2, ...` placeholders and its parameters.
    pub fn compile(&self) -> OrmResult<Compiled> {
        let mut out = Compiled::default();
        self.compile_into(&mut out, Context::new())?;
        Ok(out)
    }

    /// Compile into an accumulating result, appending text and parameters.
    ///
    /// This fragment's own parent alias, if set, replaces the inherited one.
    pub fn compile_into(&self, out: &mut Compiled, ctx: Context<'_>) -> OrmResult<()> {
        let ctx = match self.parent_alias.as_deref() {
            Some(alias) => ctx.with_parent(alias),
            None => ctx,
        };

        out.text.push_str(&self.literals[0]);
        for (node, literal) in self.nodes.iter().zip(&self.literals[1..]) {
            super::compile::compile_node(node, out, ctx)?;
            out.text.push_str(literal);
        }
        Ok(())
    }

    /// Execute and return the raw rows.
    pub async fn run_rows(&self, conn: &impl GenericClient) -> OrmResult<Vec<Row>> {
        let compiled = self.compile()?;
        tracing::debug!(
            target: "ormless.sql",
            sql = %compiled.text,
            param_count = compiled.params.len(),
            "query"
        );
        conn.query(&compiled.text, &compiled.params_ref()).await
    }

    /// Execute and return the JSON result, shaped by this fragment's [`ResultTransform`].
    pub async fn run(&self, conn: &impl GenericClient) -> OrmResult<Value> {
        let rows = self.run_rows(conn).await?;
        let results = self.transform.extract(&rows)?;
        Ok(self.transform.apply(results))
    }

    /// Execute and deserialize the JSON result into `T`.
    pub async fn run_as<T: DeserializeOwned>(&self, conn: &impl GenericClient) -> OrmResult<T> {
        let value = self.run(conn).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Execute and return the number of affected rows.
    pub async fn execute(&self, conn: &impl GenericClient) -> OrmResult<u64> {
        let compiled = self.compile()?;
        tracing::debug!(
            target: "ormless.sql",
            sql = %compiled.text,
            param_count = compiled.params.len(),
            "execute"
        );
        conn.execute(&compiled.text, &compiled.params_ref()).await
    }
}

impl Default for Fragment {
    fn default() -> Self {
        Self::empty()
    }
}
