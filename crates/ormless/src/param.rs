//! Bound parameter values.

use bytes::BytesMut;
use std::error::Error;
use std::sync::Arc;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

/// A clone-friendly parameter wrapper using Arc.
///
/// Fragments are cloned when they are reused as lateral sub-selects, so
/// values are shared rather than copied.
#[derive(Clone)]
pub struct Param(Arc<dyn ToSql + Send + Sync>);

impl Param {
    /// Create a new parameter from any ToSql value.
    pub fn new<T: ToSql + Send + Sync + 'static>(value: T) -> Self {
        Param(Arc::new(value))
    }

    /// Get a reference to the inner value as a ToSql trait object.
    pub fn as_ref(&self) -> &(dyn ToSql + Sync) {
        &*self.0 as &(dyn ToSql + Sync)
    }
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Param").field(&self.0).finish()
    }
}

/// Untyped SQL `NULL`, accepted for a parameter of any type.
///
/// `Option::<T>::None` only binds where Postgres expects `T`; use this when the
/// column type is not known at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Null;

impl ToSql for Null {
    fn to_sql(&self, _ty: &Type, _out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        Ok(IsNull::Yes)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Parameter refs compatible with `tokio-postgres`.
pub fn params_ref(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(Param::as_ref).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_shows_bound_value() {
        assert_eq!(format!("{:?}", Param::new(42_i32)), "Param(42)");
        assert_eq!(format!("{:?}", Param::new("Jane")), "Param(\"Jane\")");
        assert_eq!(format!("{:?}", Param::new(Null)), "Param(Null)");
    }

    #[test]
    fn null_accepts_any_type() {
        assert!(<Null as ToSql>::accepts(&Type::INT4));
        assert!(<Null as ToSql>::accepts(&Type::TEXT));
        let mut buf = BytesMut::new();
        assert!(matches!(Null.to_sql(&Type::JSONB, &mut buf), Ok(IsNull::Yes)));
    }

    #[test]
    fn params_ref_keeps_order() {
        let params = vec![Param::new(1_i64), Param::new("x")];
        assert_eq!(params_ref(&params).len(), 2);
    }
}
