//! Reducers and converters
//!
//! Builders for the `mixpanel.reducer.*` aggregation primitives and the
//! `mixpanel.*` converters. Arguments are validated when the value is built;
//! the result is opaque text.

use super::error::{QueryError, QueryResult};
use super::expr::Expr;
use serde_json::Value;
use std::fmt;

/// A built-in JQL reducer, e.g. `mixpanel.reducer.count()`
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Reducer {
    func: String,
}

impl Reducer {
    fn new(func: String) -> Self {
        Self { func }
    }

    pub fn count() -> Self {
        Self::new("count()".to_string())
    }

    /// Keep the `limit` most frequent values
    pub fn top(limit: impl Into<Value>) -> QueryResult<Self> {
        let limit = limit.into();
        if !is_integer(&limit) {
            return Err(QueryError::syntax("limit in top must be an integer"));
        }
        Ok(Self::new(format!("top({})", limit)))
    }

    pub fn sum(accessor: impl Into<Expr>) -> Self {
        Self::with_accessor("sum", accessor.into())
    }

    pub fn avg(accessor: impl Into<Expr>) -> Self {
        Self::with_accessor("avg", accessor.into())
    }

    pub fn min(accessor: impl Into<Expr>) -> Self {
        Self::with_accessor("min", accessor.into())
    }

    pub fn min_by(accessor: impl Into<Expr>) -> Self {
        Self::with_accessor("min_by", accessor.into())
    }

    pub fn max(accessor: impl Into<Expr>) -> Self {
        Self::with_accessor("max", accessor.into())
    }

    pub fn max_by(accessor: impl Into<Expr>) -> Self {
        Self::with_accessor("max_by", accessor.into())
    }

    pub fn null() -> Self {
        Self::new("null()".to_string())
    }

    pub fn any() -> Self {
        Self::new("any()".to_string())
    }

    pub fn numeric_summary(accessor: impl Into<Expr>) -> Self {
        Self::with_accessor("numeric_summary", accessor.into())
    }

    /// Percentiles may be a single integer or an array of integers
    pub fn numeric_percentiles(
        accessor: impl Into<Expr>,
        percentiles: impl Into<Value>,
    ) -> QueryResult<Self> {
        let percentiles = percentiles.into();
        match &percentiles {
            Value::Array(items) => {
                if !items.iter().all(is_integer) {
                    return Err(QueryError::syntax(
                        "percentiles in numeric_percentiles as an array must only contain integers",
                    ));
                }
            }
            v if is_integer(v) => {}
            _ => {
                return Err(QueryError::syntax(
                    "percentiles in numeric_percentiles must be an integer or array",
                ))
            }
        }
        Ok(Self::new(format!(
            "numeric_percentiles({}, {})",
            accessor.into(),
            percentiles
        )))
    }

    /// Buckets may be an array of boundaries or an object of bucket options
    pub fn numeric_bucket(
        accessor: impl Into<Expr>,
        buckets: impl Into<Value>,
    ) -> QueryResult<Self> {
        let buckets = buckets.into();
        if !matches!(buckets, Value::Array(_) | Value::Object(_)) {
            return Err(QueryError::syntax(
                "buckets in numeric_bucket must be an array or dict",
            ));
        }
        Ok(Self::new(format!(
            "numeric_bucket({}, {})",
            accessor.into(),
            buckets
        )))
    }

    pub fn object_merge() -> Self {
        Self::new("object_merge()".to_string())
    }

    pub fn apply_group_limits(
        limits: impl Into<Value>,
        global_limit: impl Into<Value>,
    ) -> QueryResult<Self> {
        let limits = limits.into();
        let global_limit = global_limit.into();
        if !limits.is_array() {
            return Err(QueryError::syntax(
                "limits in apply_group_limits must be iterable",
            ));
        }
        if !is_integer(&global_limit) {
            return Err(QueryError::syntax(
                "global_limit in apply_group_limits must be an integer",
            ));
        }
        Ok(Self::new(format!(
            "applyGroupLimits({}, {})",
            limits, global_limit
        )))
    }

    /// Build a reducer from its name and a JSON argument list
    pub fn from_name(name: &str, args: &[Value]) -> QueryResult<Self> {
        let arity = |n: usize| -> QueryResult<()> {
            if args.len() == n {
                Ok(())
            } else {
                Err(QueryError::syntax(format!(
                    "reducer '{}' takes {} argument(s), got {}",
                    name,
                    n,
                    args.len()
                )))
            }
        };

        match name {
            "count" | "null" | "any" | "object_merge" => {
                arity(0)?;
                Ok(match name {
                    "count" => Self::count(),
                    "null" => Self::null(),
                    "any" => Self::any(),
                    _ => Self::object_merge(),
                })
            }
            "top" => {
                arity(1)?;
                Self::top(args[0].clone())
            }
            "sum" | "avg" | "min" | "min_by" | "max" | "max_by" | "numeric_summary" => {
                arity(1)?;
                Ok(Self::with_accessor(name, Expr::from_value(&args[0])?))
            }
            "numeric_percentiles" => {
                arity(2)?;
                Self::numeric_percentiles(Expr::from_value(&args[0])?, args[1].clone())
            }
            "numeric_bucket" => {
                arity(2)?;
                Self::numeric_bucket(Expr::from_value(&args[0])?, args[1].clone())
            }
            "apply_group_limits" => {
                arity(2)?;
                Self::apply_group_limits(args[0].clone(), args[1].clone())
            }
            _ => Err(QueryError::syntax(format!(
                "'{}' is not a known reducer",
                name
            ))),
        }
    }

    fn with_accessor(name: &str, accessor: Expr) -> Self {
        Self::new(format!("{}({})", name, accessor))
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mixpanel.reducer.{}", self.func)
    }
}

impl fmt::Debug for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reducer('{}')", self)
    }
}

/// A built-in JQL converter, e.g. `mixpanel.to_number(...)`
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Converter {
    func: String,
}

impl Converter {
    pub fn to_number(accessor: impl Into<Expr>) -> Self {
        Self {
            func: format!("to_number({})", accessor.into()),
        }
    }
}

impl fmt::Display for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mixpanel.{}", self.func)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Converter('{}')", self)
    }
}

/// Converters are usable wherever an accessor is expected
impl From<Converter> for Expr {
    fn from(converter: Converter) -> Self {
        Expr::Raw(converter.to_string())
    }
}

fn is_integer(value: &Value) -> bool {
    matches!(value, Value::Number(n) if n.is_i64() || n.is_u64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::raw;
    use serde_json::json;

    #[test]
    fn test_parameterless_reducers() {
        assert_eq!(Reducer::count().to_string(), "mixpanel.reducer.count()");
        assert_eq!(Reducer::null().to_string(), "mixpanel.reducer.null()");
        assert_eq!(Reducer::any().to_string(), "mixpanel.reducer.any()");
        assert_eq!(
            Reducer::object_merge().to_string(),
            "mixpanel.reducer.object_merge()"
        );
    }

    #[test]
    fn test_top() {
        assert_eq!(Reducer::top(7).unwrap().to_string(), "mixpanel.reducer.top(7)");
        assert!(matches!(Reducer::top("x"), Err(QueryError::Syntax(_))));
        assert!(Reducer::top(2.5).is_err());
    }

    #[test]
    fn test_accessor_reducers() {
        assert_eq!(
            Reducer::sum("e.properties.amount").to_string(),
            "mixpanel.reducer.sum(function(e){return e.properties.amount})"
        );
        assert_eq!(
            Reducer::max_by(raw("function(e){return e.time}")).to_string(),
            "mixpanel.reducer.max_by(function(e){return e.time})"
        );
    }

    #[test]
    fn test_numeric_percentiles() {
        assert_eq!(
            Reducer::numeric_percentiles("e.x", vec![25, 50, 75])
                .unwrap()
                .to_string(),
            "mixpanel.reducer.numeric_percentiles(function(e){return e.x}, [25,50,75])"
        );
        assert_eq!(
            Reducer::numeric_percentiles("e.x", 90).unwrap().to_string(),
            "mixpanel.reducer.numeric_percentiles(function(e){return e.x}, 90)"
        );
        let err = Reducer::numeric_percentiles("e.x", json!([25, "50"])).unwrap_err();
        assert!(err.message().contains("must only contain integers"));
        assert!(Reducer::numeric_percentiles("e.x", "50").is_err());
    }

    #[test]
    fn test_numeric_bucket() {
        assert_eq!(
            Reducer::numeric_bucket("e.x", json!({"bucket_size": 10}))
                .unwrap()
                .to_string(),
            r#"mixpanel.reducer.numeric_bucket(function(e){return e.x}, {"bucket_size":10})"#
        );
        assert!(Reducer::numeric_bucket("e.x", vec![0, 10, 100]).is_ok());
        assert!(Reducer::numeric_bucket("e.x", 10).is_err());
    }

    #[test]
    fn test_apply_group_limits() {
        assert_eq!(
            Reducer::apply_group_limits(vec![10, 5], 100).unwrap().to_string(),
            "mixpanel.reducer.applyGroupLimits([10,5], 100)"
        );
        assert!(Reducer::apply_group_limits(10, 100).is_err());
        assert!(Reducer::apply_group_limits(vec![10], "100").is_err());
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Reducer::from_name("count", &[]).unwrap(), Reducer::count());
        assert_eq!(
            Reducer::from_name("top", &[json!(3)]).unwrap(),
            Reducer::top(3).unwrap()
        );
        assert_eq!(
            Reducer::from_name("avg", &[json!("e.x")]).unwrap(),
            Reducer::avg("e.x")
        );
        assert!(Reducer::from_name("count", &[json!(1)]).is_err());
        assert!(Reducer::from_name("median", &[]).is_err());
        assert!(matches!(
            Reducer::from_name("sum", &[json!(1)]),
            Err(QueryError::InvalidExpression(_))
        ));
    }

    #[test]
    fn test_debug_form() {
        assert_eq!(
            format!("{:?}", Reducer::count()),
            "Reducer('mixpanel.reducer.count()')"
        );
    }

    #[test]
    fn test_converter() {
        let converter = Converter::to_number("e.properties.y");
        assert_eq!(
            converter.to_string(),
            "mixpanel.to_number(function(e){return e.properties.y})"
        );
        assert_eq!(
            Expr::from(converter).render(),
            "mixpanel.to_number(function(e){return e.properties.y})"
        );
    }
}
