//! JQL Query Builder
//!
//! Builds JQL scripts for the Mixpanel query API:
//!
//! - **Expr**: JavaScript callbacks (function bodies or raw code)
//! - **Params**: Validated parameters for events, people and joins
//! - **Reducer**: Built-in reducers and converters
//! - **Builder**: The immutable, chainable [`Jql`] query
//! - **Definition**: Queries described as JSON documents
//!
//! # Script Format
//!
//! ```text
//! function main() { return <Source>.<op1>.<op2>...; }
//! ```
//!
//! # Examples
//!
//! ```rust
//! use mixpanel_jql::query::{raw, Events, Jql, Reducer};
//!
//! let signups = Jql::events("api-secret", Events::default())
//!     .filter("e.name == 'signup'");
//!
//! // Both chains branch off `signups`; neither sees the other's operations
//! let by_country = signups.group_by("e.properties.country", Reducer::count());
//! let newest = signups.sort_desc(raw("function(e){return e.time}"));
//!
//! assert_eq!(signups.operations().len(), 1);
//! assert_eq!(by_country.operations().len(), 2);
//! assert_eq!(newest.operations().len(), 2);
//! ```

mod builder;
mod definition;
mod error;
mod expr;
mod params;
mod reducer;
mod source;

pub use builder::{Accumulator, GroupKeys, Jql, JqlBuilder, OpKind, Operation};
pub use definition::{OperationDef, QueryDefinition};
pub use error::{QueryError, QueryResult};
pub use expr::{raw, Expr};
pub use params::{
    DateParam, EventParams, EventSelector, JoinParams, JoinSelector, JoinType, PeopleParams,
    UserSelector,
};
pub use reducer::{Converter, Reducer};
pub use source::{Events, People, Source};
