//! Expression compiler: node trees to SQL text plus ordered parameters.
//!
//! Compilation is a pure, synchronous walk. Text and parameters are appended
//! strictly left to right, so a parameter's `$n` is always its 1-based
//! position in [`Compiled::params`], however deeply fragments nest.

use super::node::{Cell, Node, Record};
use crate::error::{OrmError, OrmResult};
use crate::param::{Param, params_ref};
use std::fmt::Write;
use tokio_postgres::types::ToSql;

/// Compiled SQL text and its parameters, in placeholder order.
#[derive(Debug, Default, Clone)]
pub struct Compiled {
    pub text: String,
    pub params: Vec<Param>,
}

impl Compiled {
    /// Parameter refs compatible with `tokio-postgres`.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        params_ref(&self.params)
    }

    fn push_param(&mut self, param: &Param) {
        self.params.push(param.clone());
        let _ = write!(self.text, "${}", self.params.len());
    }

    fn push_ident(&mut self, name: &str) {
        self.text.push('"');
        self.text.push_str(name);
        self.text.push('"');
    }
}

/// What self and parent references resolve to at a point in the tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct Context<'a> {
    column: Option<&'a str>,
    parent: Option<&'a str>,
}

impl<'a> Context<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The column a self reference names.
    pub fn with_column(self, column: &'a str) -> Self {
        Self {
            column: Some(column),
            ..self
        }
    }

    /// The table alias parent references are qualified with.
    pub fn with_parent(self, alias: &'a str) -> Self {
        Self {
            parent: Some(alias),
            ..self
        }
    }

    pub fn column(&self) -> Option<&'a str> {
        self.column
    }

    pub fn parent(&self) -> Option<&'a str> {
        self.parent
    }
}

/// Compile one node into `out`.
pub fn compile_node<'a>(node: &'a Node, out: &mut Compiled, ctx: Context<'a>) -> OrmResult<()> {
    match node {
        Node::Ident(name) => out.push_ident(name),
        Node::Param(param) => out.push_param(param),
        Node::Raw(sql) => out.text.push_str(sql),
        Node::Default => out.text.push_str("DEFAULT"),
        Node::SelfRef => {
            let column = ctx.column.ok_or_else(|| {
                OrmError::context("self reference used outside of a column context")
            })?;
            out.push_ident(column);
        }
        Node::Parent(column) => compile_parent(column, out, ctx)?,
        Node::Cols(names) => {
            for (i, name) in names.iter().enumerate() {
                if i > 0 {
                    out.text.push_str(", ");
                }
                out.push_ident(name);
            }
        }
        Node::Vals(record) => compile_vals(record, out, ctx)?,
        Node::Fragment(fragment) => fragment.compile_into(out, ctx)?,
        Node::Seq(nodes) => {
            for node in nodes {
                compile_node(node, out, ctx)?;
            }
        }
        Node::Where(record) => compile_where(record, out, ctx)?,
    }
    Ok(())
}

fn compile_parent(column: &str, out: &mut Compiled, ctx: Context<'_>) -> OrmResult<()> {
    let alias = ctx.parent.ok_or_else(|| {
        OrmError::context(format!(
            "parent column \"{column}\" referenced outside of a lateral sub-select"
        ))
    })?;
    out.push_ident(alias);
    out.text.push('.');
    out.push_ident(column);
    Ok(())
}

fn compile_cell<'a>(cell: &'a Cell, out: &mut Compiled, ctx: Context<'a>) -> OrmResult<()> {
    match cell {
        Cell::Value(param) => out.push_param(param),
        Cell::Default => out.text.push_str("DEFAULT"),
        Cell::Parent(column) => compile_parent(column, out, ctx)?,
        Cell::Sql(fragment) => fragment.compile_into(out, ctx)?,
    }
    Ok(())
}

fn compile_vals<'a>(record: &'a Record, out: &mut Compiled, ctx: Context<'a>) -> OrmResult<()> {
    for (i, (column, cell)) in record.iter().enumerate() {
        if i > 0 {
            out.text.push_str(", ");
        }
        compile_cell(cell, out, ctx.with_column(column))?;
    }
    Ok(())
}

fn compile_where<'a>(record: &'a Record, out: &mut Compiled, ctx: Context<'a>) -> OrmResult<()> {
    if record.is_empty() {
        out.text.push_str("TRUE");
        return Ok(());
    }

    out.text.push('(');
    for (i, (column, cell)) in record.iter().enumerate() {
        if i > 0 {
            out.text.push_str(" AND ");
        }
        let ctx = ctx.with_column(column);
        match cell {
            Cell::Sql(fragment) => {
                out.text.push('(');
                fragment.compile_into(out, ctx)?;
                out.text.push(')');
            }
            Cell::Default => {
                return Err(OrmError::compile(format!(
                    "DEFAULT is not a value column \"{column}\" can be compared with"
                )));
            }
            _ => {
                out.push_ident(column);
                out.text.push_str(" = ");
                compile_cell(cell, out, ctx)?;
            }
        }
    }
    out.text.push(')');
    Ok(())
}
