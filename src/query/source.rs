//! Query data sources
//!
//! A query reads from `Events(...)`, `People(...)` or the join of both. The
//! parameter text is validated and rendered once, when the source is created.

use super::error::QueryResult;
use super::params::{EventParams, JoinParams, PeopleParams};
use serde_json::Value;
use std::fmt;

/// The `Events(...)` source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Events {
    params: String,
}

impl Events {
    pub fn new(params: EventParams) -> Self {
        Self {
            params: params.to_json(),
        }
    }

    /// Validate loosely-typed event parameters
    pub fn from_value(params: &Value) -> QueryResult<Self> {
        EventParams::from_value(params).map(Self::new)
    }
}

impl Default for Events {
    fn default() -> Self {
        Self::new(EventParams::default())
    }
}

impl fmt::Display for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Events({})", self.params)
    }
}

/// The `People(...)` source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct People {
    params: String,
}

impl People {
    pub fn new(params: PeopleParams) -> Self {
        Self {
            params: params.to_json(),
        }
    }

    /// Validate loosely-typed people parameters
    pub fn from_value(params: &Value) -> QueryResult<Self> {
        PeopleParams::from_value(params).map(Self::new)
    }
}

impl Default for People {
    fn default() -> Self {
        Self::new(PeopleParams::default())
    }
}

impl fmt::Display for People {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "People({})", self.params)
    }
}

/// The data source of a query, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Events(Events),
    People(People),
    Join {
        events: Events,
        people: People,
        params: String,
    },
}

impl Source {
    pub fn join(events: Events, people: People, params: JoinParams) -> Self {
        Self::Join {
            events,
            people,
            params: params.to_json(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Events(events) => write!(f, "{}", events),
            Self::People(people) => write!(f, "{}", people),
            Self::Join {
                events,
                people,
                params,
            } => write!(f, "join({}, {}, {})", events, people, params),
        }
    }
}
