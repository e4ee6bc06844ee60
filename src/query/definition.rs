//! Query definitions
//!
//! A JSON document describing a query, so queries can be kept in files and run
//! from the command line:
//!
//! ```json
//! {
//!   "events": {"from_date": "2017-10-01", "to_date": "2017-10-19"},
//!   "operations": [
//!     {"op": "filter", "expr": "e.name == 'signup'"},
//!     {"op": "group_by", "keys": ["e.properties.country"], "accumulator": {"reducer": "count"}}
//!   ]
//! }
//! ```
//!
//! Expressions are strings (function bodies) or `{"raw": "..."}`. Accumulators
//! are expressions or `{"reducer": "<name>", "args": [...]}`. All values go
//! through the same validation as the typed API.

use super::builder::{Accumulator, GroupKeys, Jql};
use super::error::{QueryError, QueryResult};
use super::expr::Expr;
use super::params::JoinParams;
use super::reducer::Reducer;
use super::source::{Events, People};
use serde::Deserialize;
use serde_json::Value;

/// A query as written in a definition file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryDefinition {
    /// Event parameters; present (even `{}`) means "read events"
    #[serde(default)]
    pub events: Option<Value>,
    /// People parameters; present (even `{}`) means "read people"
    #[serde(default)]
    pub people: Option<Value>,
    #[serde(default)]
    pub join_params: Option<Value>,
    #[serde(default)]
    pub operations: Vec<OperationDef>,
}

/// One chain step in a definition file
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum OperationDef {
    Filter { expr: Value },
    Map { expr: Value },
    Flatten {},
    SortAsc { accessor: Value },
    SortDesc { accessor: Value },
    Reduce { accumulator: Value },
    GroupBy { keys: Value, accumulator: Value },
    GroupByUser { keys: Value, accumulator: Value },
}

impl QueryDefinition {
    /// Parse a definition from JSON text
    pub fn parse(text: &str) -> QueryResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| QueryError::syntax(format!("invalid query definition: {}", e)))
    }

    /// Validate the definition and build the query
    pub fn into_query(self, api_secret: impl Into<String>) -> QueryResult<Jql> {
        let mut builder = Jql::builder(api_secret);
        if let Some(params) = &self.events {
            builder = builder.events(Events::from_value(params)?);
        }
        if let Some(params) = &self.people {
            builder = builder.people(People::from_value(params)?);
        }
        if let Some(params) = &self.join_params {
            builder = builder.join_params(JoinParams::from_value(params)?);
        }

        let mut query = builder.build()?;
        for op in &self.operations {
            query = op.apply(&query)?;
        }
        Ok(query)
    }
}

impl OperationDef {
    fn apply(&self, query: &Jql) -> QueryResult<Jql> {
        Ok(match self {
            Self::Filter { expr } => query.filter(Expr::from_value(expr)?),
            Self::Map { expr } => query.map(Expr::from_value(expr)?),
            Self::Flatten {} => query.flatten(),
            Self::SortAsc { accessor } => query.sort_asc(Expr::from_value(accessor)?),
            Self::SortDesc { accessor } => query.sort_desc(Expr::from_value(accessor)?),
            Self::Reduce { accumulator } => query.reduce(accumulator_from_value(accumulator)?),
            Self::GroupBy { keys, accumulator } => query.group_by(
                keys_from_value(keys)?,
                accumulator_from_value(accumulator)?,
            ),
            Self::GroupByUser { keys, accumulator } => query.group_by_user(
                keys_from_value(keys)?,
                accumulator_from_value(accumulator)?,
            ),
        })
    }
}

fn keys_from_value(value: &Value) -> QueryResult<GroupKeys> {
    match value {
        Value::Array(keys) => keys
            .iter()
            .map(Expr::from_value)
            .collect::<QueryResult<Vec<_>>>()
            .map(GroupKeys),
        single => Expr::from_value(single).map(GroupKeys::from),
    }
}

fn accumulator_from_value(value: &Value) -> QueryResult<Accumulator> {
    let Some(name) = value.get("reducer") else {
        return Expr::from_value(value).map(Accumulator::from);
    };

    let Value::String(name) = name else {
        return Err(QueryError::syntax("reducer name must be a string"));
    };
    if let Some(key) = value
        .as_object()
        .and_then(|fields| fields.keys().find(|k| *k != "reducer" && *k != "args"))
    {
        return Err(QueryError::syntax(format!(
            "'{}' is not a valid key in reducer '{}'",
            key, name
        )));
    }
    let args = match value.get("args") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(args)) => args.clone(),
        Some(_) => {
            return Err(QueryError::syntax(format!(
                "args of reducer '{}' must be an array",
                name
            )))
        }
    };
    Reducer::from_name(name, &args).map(Accumulator::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::params::EventParams;
    use chrono::NaiveDate;

    #[test]
    fn test_definition_matches_hand_built_query() {
        let definition = QueryDefinition::parse(
            r#"{
                "events": {"from_date": "2017-10-01", "to_date": "2017-10-19"},
                "operations": [
                    {"op": "filter", "expr": "e.name == 'signup'"},
                    {"op": "group_by", "keys": ["e.properties.country"], "accumulator": {"reducer": "count"}}
                ]
            }"#,
        )
        .unwrap();
        let from_file = definition.into_query("secret").unwrap();

        let events = Events::new(
            EventParams::new()
                .from_date(NaiveDate::from_ymd_opt(2017, 10, 1).unwrap())
                .to_date(NaiveDate::from_ymd_opt(2017, 10, 19).unwrap()),
        );
        let by_hand = Jql::events("secret", events)
            .filter("e.name == 'signup'")
            .group_by("e.properties.country", Reducer::count());

        assert_eq!(from_file.script(), by_hand.script());
    }

    #[test]
    fn test_definition_all_operations() {
        let query = QueryDefinition::parse(
            r#"{
                "people": {},
                "operations": [
                    {"op": "map", "expr": {"raw": "function(u){return u.properties}"}},
                    {"op": "flatten"},
                    {"op": "sort_asc", "accessor": "e.a"},
                    {"op": "sort_desc", "accessor": "e.b"},
                    {"op": "group_by_user", "keys": "e.c", "accumulator": {"reducer": "top", "args": [5]}},
                    {"op": "reduce", "accumulator": "e.d"}
                ]
            }"#,
        )
        .unwrap()
        .into_query("secret")
        .unwrap();

        assert_eq!(
            query.script(),
            "function main() { return People({})\
             .map(function(u){return u.properties})\
             .flatten()\
             .sortAsc(function(e){return e.a})\
             .sortDesc(function(e){return e.b})\
             .groupByUser([function(e){return e.c}], mixpanel.reducer.top(5))\
             .reduce(function(e){return e.d}); }"
        );
    }

    #[test]
    fn test_definition_join() {
        let query = QueryDefinition::parse(
            r#"{"events": {}, "people": {}, "join_params": {"type": "inner"}}"#,
        )
        .unwrap()
        .into_query("secret")
        .unwrap();
        assert_eq!(
            query.script(),
            r#"function main() { return join(Events({}), People({}), {"type":"inner"}); }"#
        );
    }

    #[test]
    fn test_definition_errors() {
        let err = QueryDefinition::parse("{}").unwrap().into_query("s").unwrap_err();
        assert!(err.message().starts_with("No data sources specified"));

        let err = QueryDefinition::parse(r#"{"events": {}, "operations": [{"op": "filter", "expr": 3}]}"#)
            .unwrap()
            .into_query("s")
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidExpression(_)));

        let err = QueryDefinition::parse(
            r#"{"events": {}, "operations": [{"op": "reduce", "accumulator": {"reducer": "top", "args": ["x"]}}]}"#,
        )
        .unwrap()
        .into_query("s")
        .unwrap_err();
        assert_eq!(err.message(), "limit in top must be an integer");

        assert!(QueryDefinition::parse(r#"{"source": "events"}"#).is_err());
        assert!(QueryDefinition::parse(r#"{"operations": [{"op": "explode"}]}"#).is_err());
    }

    #[test]
    fn test_definition_rejects_unknown_fields() {
        let err = QueryDefinition::parse(
            r#"{"events": {}, "operations": [{"op": "filter", "expr": "x", "exprs": 1}]}"#,
        )
        .unwrap_err();
        assert!(err.message().starts_with("invalid query definition:"));
        assert!(err.message().contains("exprs"));

        assert!(QueryDefinition::parse(
            r#"{"events": {}, "operations": [{"op": "flatten", "depth": 2}]}"#
        )
        .is_err());

        let err = QueryDefinition::parse(
            r#"{"events": {}, "operations": [{"op": "reduce", "accumulator": {"reducer": "count", "arg": []}}]}"#,
        )
        .unwrap()
        .into_query("s")
        .unwrap_err();
        assert_eq!(err.message(), "'arg' is not a valid key in reducer 'count'");
    }
}
