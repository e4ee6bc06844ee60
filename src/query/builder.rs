//! Query builder
//!
//! [`Jql`] is an immutable query: credentials, a data source and an ordered
//! list of operations. Chaining methods take `&self` and return a new query
//! with one operation appended, so any intermediate query can be reused as
//! the base of several independent chains.
//!
//! ```rust
//! use mixpanel_jql::query::{Events, Jql, Reducer};
//!
//! let query = Jql::events("api-secret", Events::default())
//!     .filter("e.x == 'y'")
//!     .group_by(["e.a", "e.b"], Reducer::count());
//!
//! assert_eq!(
//!     query.to_string(),
//!     "function main() { return Events({}).filter(function(e){return e.x == 'y'})\
//!      .groupBy([function(e){return e.a}, function(e){return e.b}], mixpanel.reducer.count()); }"
//! );
//! ```

use super::error::{QueryError, QueryResult};
use super::expr::Expr;
use super::params::JoinParams;
use super::reducer::{Converter, Reducer};
use super::source::{Events, People, Source};
use std::fmt;
use std::sync::Arc;

/// Chain operation names as they appear in the script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Filter,
    Map,
    Flatten,
    SortAsc,
    SortDesc,
    Reduce,
    GroupBy,
    GroupByUser,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filter => "filter",
            Self::Map => "map",
            Self::Flatten => "flatten",
            Self::SortAsc => "sortAsc",
            Self::SortDesc => "sortDesc",
            Self::Reduce => "reduce",
            Self::GroupBy => "groupBy",
            Self::GroupByUser => "groupByUser",
        }
    }
}

/// One rendered chain step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub kind: OpKind,
    /// Argument text, already rendered
    pub args: String,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind.as_str(), self.args)
    }
}

/// Accumulator of `reduce`/`groupBy`: a built-in reducer or a custom function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accumulator {
    Reducer(Reducer),
    Expr(Expr),
}

impl Accumulator {
    pub fn render(&self) -> String {
        match self {
            Self::Reducer(reducer) => reducer.to_string(),
            Self::Expr(expr) => expr.render(),
        }
    }
}

impl From<Reducer> for Accumulator {
    fn from(reducer: Reducer) -> Self {
        Self::Reducer(reducer)
    }
}

impl From<Expr> for Accumulator {
    fn from(expr: Expr) -> Self {
        Self::Expr(expr)
    }
}

impl From<&str> for Accumulator {
    fn from(body: &str) -> Self {
        Self::Expr(body.into())
    }
}

impl From<String> for Accumulator {
    fn from(body: String) -> Self {
        Self::Expr(body.into())
    }
}

/// Grouping keys; a single key is a one-element list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupKeys(pub Vec<Expr>);

impl From<&str> for GroupKeys {
    fn from(key: &str) -> Self {
        Self(vec![key.into()])
    }
}

impl From<String> for GroupKeys {
    fn from(key: String) -> Self {
        Self(vec![key.into()])
    }
}

impl From<Expr> for GroupKeys {
    fn from(key: Expr) -> Self {
        Self(vec![key])
    }
}

impl From<Converter> for GroupKeys {
    fn from(key: Converter) -> Self {
        Self(vec![key.into()])
    }
}

impl<T: Into<Expr>> From<Vec<T>> for GroupKeys {
    fn from(keys: Vec<T>) -> Self {
        Self(keys.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Expr>, const N: usize> From<[T; N]> for GroupKeys {
    fn from(keys: [T; N]) -> Self {
        Self(keys.into_iter().map(Into::into).collect())
    }
}

/// An immutable JQL query
#[derive(Clone)]
pub struct Jql {
    api_secret: Arc<str>,
    source: Arc<Source>,
    operations: Vec<Operation>,
}

impl Jql {
    /// Start building a query with the given API secret
    pub fn builder(api_secret: impl Into<String>) -> JqlBuilder {
        JqlBuilder::new(api_secret)
    }

    /// Query over events only
    pub fn events(api_secret: impl Into<String>, events: Events) -> Self {
        Self::with_source(api_secret, Source::Events(events))
    }

    /// Query over people only
    pub fn people(api_secret: impl Into<String>, people: People) -> Self {
        Self::with_source(api_secret, Source::People(people))
    }

    /// Query over the join of events and people
    pub fn join(
        api_secret: impl Into<String>,
        events: Events,
        people: People,
        params: JoinParams,
    ) -> Self {
        Self::with_source(api_secret, Source::join(events, people, params))
    }

    fn with_source(api_secret: impl Into<String>, source: Source) -> Self {
        Self {
            api_secret: Arc::from(api_secret.into()),
            source: Arc::new(source),
            operations: Vec::new(),
        }
    }

    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Operations in call order
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    fn push(&self, kind: OpKind, args: String) -> Self {
        let mut operations = Vec::with_capacity(self.operations.len() + 1);
        operations.extend_from_slice(&self.operations);
        operations.push(Operation { kind, args });

        Self {
            api_secret: Arc::clone(&self.api_secret),
            source: Arc::clone(&self.source),
            operations,
        }
    }

    pub fn filter(&self, expr: impl Into<Expr>) -> Self {
        self.push(OpKind::Filter, expr.into().render())
    }

    pub fn map(&self, expr: impl Into<Expr>) -> Self {
        self.push(OpKind::Map, expr.into().render())
    }

    pub fn flatten(&self) -> Self {
        self.push(OpKind::Flatten, String::new())
    }

    pub fn sort_asc(&self, accessor: impl Into<Expr>) -> Self {
        self.push(OpKind::SortAsc, accessor.into().render())
    }

    pub fn sort_desc(&self, accessor: impl Into<Expr>) -> Self {
        self.push(OpKind::SortDesc, accessor.into().render())
    }

    pub fn reduce(&self, accumulator: impl Into<Accumulator>) -> Self {
        self.push(OpKind::Reduce, accumulator.into().render())
    }

    pub fn group_by(
        &self,
        keys: impl Into<GroupKeys>,
        accumulator: impl Into<Accumulator>,
    ) -> Self {
        self.push(OpKind::GroupBy, group_args(keys.into(), accumulator.into()))
    }

    pub fn group_by_user(
        &self,
        keys: impl Into<GroupKeys>,
        accumulator: impl Into<Accumulator>,
    ) -> Self {
        self.push(
            OpKind::GroupByUser,
            group_args(keys.into(), accumulator.into()),
        )
    }

    /// The script submitted to the JQL endpoint
    pub fn script(&self) -> String {
        self.to_string()
    }

    /// The script laid out with one chained call per line
    pub fn pretty(&self) -> String {
        let mut out = format!("function main() {{\n  return {}", self.source);
        for op in &self.operations {
            out.push_str("\n    .");
            out.push_str(&op.to_string());
        }
        out.push_str(";\n}");
        out
    }
}

fn group_args(keys: GroupKeys, accumulator: Accumulator) -> String {
    let keys: Vec<String> = keys.0.iter().map(Expr::render).collect();
    format!("[{}], {}", keys.join(", "), accumulator.render())
}

impl fmt::Display for Jql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function main() {{ return {}", self.source)?;
        for op in &self.operations {
            write!(f, ".{}", op)?;
        }
        f.write_str("; }")
    }
}

impl fmt::Debug for Jql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jql")
            .field("api_secret", &"<redacted>")
            .field("source", &self.source)
            .field("operations", &self.operations)
            .finish()
    }
}

/// Builder for choosing a query's data source
#[derive(Debug, Clone)]
pub struct JqlBuilder {
    api_secret: String,
    events: Option<Events>,
    people: Option<People>,
    join_params: Option<JoinParams>,
}

impl JqlBuilder {
    pub fn new(api_secret: impl Into<String>) -> Self {
        Self {
            api_secret: api_secret.into(),
            events: None,
            people: None,
            join_params: None,
        }
    }

    /// Read from events
    pub fn events(mut self, events: Events) -> Self {
        self.events = Some(events);
        self
    }

    /// Read from people
    pub fn people(mut self, people: People) -> Self {
        self.people = Some(people);
        self
    }

    /// Parameters for joining events and people; only used when both are set
    pub fn join_params(mut self, params: JoinParams) -> Self {
        self.join_params = Some(params);
        self
    }

    /// Build the query, failing if no source was chosen
    pub fn build(self) -> QueryResult<Jql> {
        if self.join_params.is_some() && (self.events.is_none() || self.people.is_none()) {
            tracing::warn!("join params ignored: a join needs both events and people");
        }

        let source = match (self.events, self.people) {
            (Some(events), Some(people)) => {
                Source::join(events, people, self.join_params.unwrap_or_default())
            }
            (Some(events), None) => Source::Events(events),
            (None, Some(people)) => Source::People(people),
            (None, None) => {
                return Err(QueryError::syntax(
                    "No data sources specified (events=... or people=...)",
                ))
            }
        };

        Ok(Jql::with_source(self.api_secret, source))
    }
}
