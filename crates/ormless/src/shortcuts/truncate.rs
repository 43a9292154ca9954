//! `truncate`.

use crate::sql::{Fragment, Node, ident, sql};

/// `CONTINUE IDENTITY` / `RESTART IDENTITY`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Continue,
    Restart,
}

impl Identity {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Identity::Continue => "CONTINUE IDENTITY",
            Identity::Restart => "RESTART IDENTITY",
        }
    }
}

/// `RESTRICT` / `CASCADE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKeys {
    Restrict,
    Cascade,
}

impl ForeignKeys {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ForeignKeys::Restrict => "RESTRICT",
            ForeignKeys::Cascade => "CASCADE",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TruncateOptions {
    pub identity: Option<Identity>,
    pub foreign_keys: Option<ForeignKeys>,
}

impl TruncateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn foreign_keys(mut self, foreign_keys: ForeignKeys) -> Self {
        self.foreign_keys = Some(foreign_keys);
        self
    }
}

/// `TRUNCATE "a", "b" [RESTART IDENTITY] [CASCADE]`
///
/// Returns no rows; run it with [`Fragment::execute`].
pub fn truncate(tables: &[&str], options: TruncateOptions) -> Fragment {
    let mut query = sql("TRUNCATE ").push_node(Node::join(tables.iter().map(|t| ident(*t)), ", "));
    if let Some(identity) = options.identity {
        query = query.push(" ").push_raw(identity.as_sql());
    }
    if let Some(foreign_keys) = options.foreign_keys {
        query = query.push(" ").push_raw(foreign_keys.as_sql());
    }
    query
}
