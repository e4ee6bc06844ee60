//! Expression rendering
//!
//! JQL callbacks are JavaScript functions. An [`Expr`] is either the body of a
//! single-argument function (`e.properties.x`) or a raw code fragment that is
//! inserted as-is.

use super::error::{QueryError, QueryResult};
use serde_json::Value;
use std::fmt;

/// A JavaScript expression passed to a chain operation or reducer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Expression body, wrapped as `function(e){return <body>}`
    Body(String),
    /// Verbatim code, never wrapped or escaped
    Raw(String),
}

/// Wrap text as raw JavaScript
pub fn raw(code: impl Into<String>) -> Expr {
    Expr::Raw(code.into())
}

impl Expr {
    /// Create an expression body
    pub fn body(body: impl Into<String>) -> Self {
        Self::Body(body.into())
    }

    /// Render the expression as JavaScript text
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Interpret a loosely-typed value as an expression
    ///
    /// A JSON string is an expression body and `{"raw": "<code>"}` is raw code.
    /// Anything else is rejected.
    pub fn from_value(value: &Value) -> QueryResult<Self> {
        match value {
            Value::String(body) => Ok(Self::Body(body.clone())),
            Value::Object(map) if map.len() == 1 => match map.get("raw") {
                Some(Value::String(code)) => Ok(Self::Raw(code.clone())),
                Some(_) => Err(QueryError::InvalidExpression(
                    "raw(...) must wrap a text type (string)".to_string(),
                )),
                None => Err(invalid_expression()),
            },
            _ => Err(invalid_expression()),
        }
    }
}

fn invalid_expression() -> QueryError {
    QueryError::InvalidExpression(
        "Must be a text type (string) or wrapped as raw(string)".to_string(),
    )
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Body(body) => write!(f, "function(e){{return {}}}", body),
            Self::Raw(code) => f.write_str(code),
        }
    }
}

impl From<&str> for Expr {
    fn from(body: &str) -> Self {
        Self::Body(body.to_string())
    }
}

impl From<String> for Expr {
    fn from(body: String) -> Self {
        Self::Body(body)
    }
}

impl From<&String> for Expr {
    fn from(body: &String) -> Self {
        Self::Body(body.clone())
    }
}

impl From<&Expr> for Expr {
    fn from(expr: &Expr) -> Self {
        expr.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_body() {
        let expr = Expr::from("e.properties.x");
        assert_eq!(expr.render(), "function(e){return e.properties.x}");
        assert_eq!(expr.to_string(), expr.render());
    }

    #[test]
    fn test_render_raw_is_verbatim() {
        let code = r#"function(e){ return "a\"b"; }"#;
        assert_eq!(raw(code).render(), code);
    }

    #[test]
    fn test_from_value() {
        assert_eq!(
            Expr::from_value(&json!("e.name")).unwrap(),
            Expr::body("e.name")
        );
        assert_eq!(
            Expr::from_value(&json!({"raw": "mixpanel.numeric_bucket"})).unwrap(),
            raw("mixpanel.numeric_bucket")
        );
    }

    #[test]
    fn test_from_value_rejects_non_text() {
        for value in [json!(5), json!(null), json!(["e.x"]), json!({"raw": 1}), json!({"x": "y"})] {
            let err = Expr::from_value(&value).unwrap_err();
            assert!(matches!(err, QueryError::InvalidExpression(_)), "{:?}", value);
        }
    }
}
