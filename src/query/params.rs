//! Source parameters
//!
//! Parameters for the `Events(...)`, `People(...)` and `join(...)` sources.
//! Each kind can be built with typed setters or validated from a loosely-typed
//! JSON value. Either way the result renders to canonical JSON text, `{}` when
//! nothing is set.
//!
//! Loosely-typed validation is a fixed schema: permitted keys per parameter
//! kind and a value predicate per key. The whole input is checked before
//! anything is produced and the first violation is reported with its index and
//! key.

use super::error::{QueryError, QueryResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use serde_json::{Map, Value};
use std::fmt;

/// A `from_date`/`to_date` value, stored as text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateParam(String);

impl DateParam {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<NaiveDate> for DateParam {
    fn from(date: NaiveDate) -> Self {
        Self(date.format("%Y-%m-%d").to_string())
    }
}

impl From<NaiveDateTime> for DateParam {
    fn from(dt: NaiveDateTime) -> Self {
        Self(dt.format("%Y-%m-%d").to_string())
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for DateParam
where
    Tz::Offset: fmt::Display,
{
    fn from(dt: DateTime<Tz>) -> Self {
        Self(dt.format("%Y-%m-%d").to_string())
    }
}

impl From<&str> for DateParam {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DateParam {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================
// Event parameters
// ============================================

/// One entry of `event_selectors`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSelector {
    pub event: Option<String>,
    pub selector: Option<String>,
    pub label: Option<String>,
}

impl EventSelector {
    /// Select events by name
    pub fn event(name: impl Into<String>) -> Self {
        Self {
            event: Some(name.into()),
            ..Self::default()
        }
    }

    /// Add a selector expression
    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// Add a label
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        insert_opt(&mut map, "event", &self.event);
        insert_opt(&mut map, "selector", &self.selector);
        insert_opt(&mut map, "label", &self.label);
        Value::Object(map)
    }
}

/// Parameters for the `Events(...)` source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventParams {
    pub from_date: Option<DateParam>,
    pub to_date: Option<DateParam>,
    pub event_selectors: Option<Vec<EventSelector>>,
}

impl EventParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_date(mut self, date: impl Into<DateParam>) -> Self {
        self.from_date = Some(date.into());
        self
    }

    pub fn to_date(mut self, date: impl Into<DateParam>) -> Self {
        self.to_date = Some(date.into());
        self
    }

    /// Append an event selector
    pub fn event_selector(mut self, selector: EventSelector) -> Self {
        self.event_selectors
            .get_or_insert_with(Vec::new)
            .push(selector);
        self
    }

    /// Validate loosely-typed event parameters
    pub fn from_value(value: &Value) -> QueryResult<Self> {
        let Some(map) = as_params(value, "event_params")? else {
            return Ok(Self::default());
        };

        let mut params = Self::default();
        for (key, v) in map {
            match key.as_str() {
                "from_date" => params.from_date = Some(date_from_value(key, v)?),
                "to_date" => params.to_date = Some(date_from_value(key, v)?),
                "event_selectors" => {
                    let entries = validate_selectors(
                        v,
                        "event_params['event_selectors']",
                        &["event", "selector", "label"],
                    )?;
                    params.event_selectors = Some(
                        entries
                            .into_iter()
                            .map(|mut e| EventSelector {
                                event: e.remove("event"),
                                selector: e.remove("selector"),
                                label: e.remove("label"),
                            })
                            .collect(),
                    );
                }
                _ => return Err(invalid_key(key, "event_params")),
            }
        }
        Ok(params)
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(date) = &self.from_date {
            map.insert("from_date".into(), Value::String(date.0.clone()));
        }
        if let Some(date) = &self.to_date {
            map.insert("to_date".into(), Value::String(date.0.clone()));
        }
        if let Some(selectors) = &self.event_selectors {
            map.insert(
                "event_selectors".into(),
                Value::Array(selectors.iter().map(EventSelector::to_value).collect()),
            );
        }
        Value::Object(map)
    }

    /// Canonical JSON text
    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }
}

// ============================================
// People parameters
// ============================================

/// One entry of `user_selectors`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSelector {
    pub selector: Option<String>,
}

impl UserSelector {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
        }
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        insert_opt(&mut map, "selector", &self.selector);
        Value::Object(map)
    }
}

/// Parameters for the `People(...)` source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeopleParams {
    pub user_selectors: Option<Vec<UserSelector>>,
}

impl PeopleParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user selector
    pub fn user_selector(mut self, selector: impl Into<String>) -> Self {
        self.user_selectors
            .get_or_insert_with(Vec::new)
            .push(UserSelector::new(selector));
        self
    }

    /// Validate loosely-typed people parameters
    pub fn from_value(value: &Value) -> QueryResult<Self> {
        let Some(map) = as_params(value, "people_params")? else {
            return Ok(Self::default());
        };

        let mut params = Self::default();
        for (key, v) in map {
            if key != "user_selectors" {
                return Err(invalid_key(key, "people_params"));
            }
            let entries =
                validate_selectors(v, "people_params['user_selectors']", &["selector"])?;
            params.user_selectors = Some(
                entries
                    .into_iter()
                    .map(|mut e| UserSelector {
                        selector: e.remove("selector"),
                    })
                    .collect(),
            );
        }
        Ok(params)
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(selectors) = &self.user_selectors {
            map.insert(
                "user_selectors".into(),
                Value::Array(selectors.iter().map(UserSelector::to_value).collect()),
            );
        }
        Value::Object(map)
    }

    /// Canonical JSON text
    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }
}

// ============================================
// Join parameters
// ============================================

/// How events and people are joined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Full,
    Left,
    Right,
    Inner,
}

impl JoinType {
    pub const ALL: [JoinType; 4] = [Self::Full, Self::Left, Self::Right, Self::Inner];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Left => "left",
            Self::Right => "right",
            Self::Inner => "inner",
        }
    }

    /// Parse a join type name
    pub fn parse(s: &str) -> QueryResult<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| invalid_join_type(s))
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn invalid_join_type(shown: &str) -> QueryError {
    let valid: Vec<&str> = JoinType::ALL.iter().map(JoinType::as_str).collect();
    QueryError::syntax(format!(
        "\"{}\" is not a valid join type (valid types: {})",
        shown,
        valid.join(", ")
    ))
}

/// One entry of join `selectors`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinSelector {
    pub event: Option<String>,
    pub selector: Option<String>,
}

impl JoinSelector {
    pub fn event(name: impl Into<String>) -> Self {
        Self {
            event: Some(name.into()),
            selector: None,
        }
    }

    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }
}

/// Parameters for `join(...)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinParams {
    pub join_type: Option<JoinType>,
    pub selectors: Option<Vec<JoinSelector>>,
}

impl JoinParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = Some(join_type);
        self
    }

    /// Append a join selector
    pub fn selector(mut self, selector: JoinSelector) -> Self {
        self.selectors.get_or_insert_with(Vec::new).push(selector);
        self
    }

    /// Validate loosely-typed join parameters
    pub fn from_value(value: &Value) -> QueryResult<Self> {
        let Some(map) = as_params(value, "join_params")? else {
            return Ok(Self::default());
        };

        let mut params = Self::default();
        for (key, v) in map {
            match key.as_str() {
                "type" => {
                    params.join_type = Some(match v {
                        Value::String(s) => JoinType::parse(s)?,
                        other => return Err(invalid_join_type(&other.to_string())),
                    });
                }
                "selectors" => {
                    let entries = validate_selectors(
                        v,
                        "join_params['selectors']",
                        &["event", "selector"],
                    )?;
                    params.selectors = Some(
                        entries
                            .into_iter()
                            .map(|mut e| JoinSelector {
                                event: e.remove("event"),
                                selector: e.remove("selector"),
                            })
                            .collect(),
                    );
                }
                _ => return Err(invalid_key(key, "join_params")),
            }
        }
        Ok(params)
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(join_type) = self.join_type {
            map.insert("type".into(), Value::String(join_type.as_str().to_string()));
        }
        if let Some(selectors) = &self.selectors {
            let entries = selectors
                .iter()
                .map(|s| {
                    let mut entry = Map::new();
                    insert_opt(&mut entry, "event", &s.event);
                    insert_opt(&mut entry, "selector", &s.selector);
                    Value::Object(entry)
                })
                .collect();
            map.insert("selectors".into(), Value::Array(entries));
        }
        Value::Object(map)
    }

    /// Canonical JSON text
    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }
}

// ============================================
// Schema helpers
// ============================================

/// `null` and `{}` mean "no parameters"; anything else must be an object
fn as_params<'a>(value: &'a Value, name: &str) -> QueryResult<Option<&'a Map<String, Value>>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) if map.is_empty() => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        _ => Err(QueryError::syntax(format!("{} must be a dict", name))),
    }
}

fn invalid_key(key: &str, name: &str) -> QueryError {
    QueryError::syntax(format!("\"{}\" is not a valid key in {}", key, name))
}

fn date_from_value(key: &str, value: &Value) -> QueryResult<DateParam> {
    match value {
        Value::String(s) => Ok(DateParam(s.clone())),
        _ => Err(QueryError::syntax(format!(
            "{} must be datetime, date, or str",
            key
        ))),
    }
}

/// Check a list of string-valued selector objects restricted to `allowed` keys
fn validate_selectors(
    value: &Value,
    path: &str,
    allowed: &[&str],
) -> QueryResult<Vec<std::collections::BTreeMap<String, String>>> {
    let Value::Array(items) = value else {
        return Err(QueryError::syntax(format!("{} must be iterable", path)));
    };

    let mut entries = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Value::Object(fields) = item else {
            return Err(QueryError::syntax(format!("{}[{}] must be a dict", path, i)));
        };

        let mut entry = std::collections::BTreeMap::new();
        for (k, v) in fields {
            if !allowed.contains(&k.as_str()) {
                return Err(QueryError::syntax(format!(
                    "'{}' is not a valid key in {}[{}]",
                    k, path, i
                )));
            }
            match v {
                Value::String(s) => {
                    entry.insert(k.clone(), s.clone());
                }
                _ => {
                    return Err(QueryError::syntax(format!(
                        "{}[{}].{} must be a string",
                        path, i, k
                    )))
                }
            }
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn insert_opt(map: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        map.insert(key.to_string(), Value::String(v.clone()));
    }
}
