//! # mixpanel-jql
//!
//! A streaming library for building JQL queries and running them against
//! the Mixpanel query API.
//!
//! ## Features
//!
//! - **Immutable builder**: every chained call returns a new query
//! - **Validated parameters**: event, people and join filters are checked up front
//! - **Reducers**: the `mixpanel.reducer.*` primitives with argument checks
//! - **Streaming results**: rows are decoded as the response arrives
//!
//! ## Modules
//!
//! - [`query`]: Query builder, parameters, reducers, definitions
//! - [`stream`]: Incremental JSON array decoder
//! - [`client`]: Submission to the JQL endpoint
//! - [`config`]: Configuration files and environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use mixpanel_jql::client::{ClientConfig, JqlClient};
//! use mixpanel_jql::query::{EventParams, Events, Jql, Reducer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let events = Events::new(
//!         EventParams::new()
//!             .from_date("2017-10-01")
//!             .to_date("2017-10-19"),
//!     );
//!
//!     let query = Jql::events("api-secret", events)
//!         .filter("e.name == 'signup'")
//!         .group_by("e.properties.country", Reducer::count());
//!
//!     let client = JqlClient::new(ClientConfig::default())?;
//!     let mut rows = query.send(&client).await?;
//!     while let Some(row) = rows.next().await {
//!         println!("{}", row?);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod query;
pub mod stream;

// Re-export top-level types for convenience
pub use query::{
    raw, Accumulator, Converter, EventParams, Events, Expr, JoinParams, JoinType, Jql,
    JqlBuilder, People, PeopleParams, QueryDefinition, QueryError, QueryResult, Reducer, Source,
};

pub use stream::{decode_reader, decode_stream, ArrayDecoder, DecodeError};

pub use client::{
    ClientConfig, ClientError, HttpTransport, JqlClient, RowStream, Transport, TransportResponse,
};

pub use config::{Config, ConfigError, LoggingConfig};
