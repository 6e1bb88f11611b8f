//! Data sources for query execution
//!
//! A [`Source`] is an opaque tabular executor bound to a configured name.
//! The gateway never sees engine details, only [`RawResult`]s and
//! [`SourceError`]s.
//!
//! ## Features
//!
//! Enable engines via Cargo features:
//! - `duckdb` - csv and parquet files (as DuckDB views) and DuckDB database files
//! - `postgres` - PostgreSQL servers, with optional TLS
//! - `all-engines` - both
//!
//! Without an engine feature the matching sources are logged at startup and
//! stay unresolvable.
//!
//! ## Example
//!
//! ```rust,ignore
//! use lence_sources::SourceSet;
//!
//! let sources = SourceSet::from_config(&config).await;
//! if let Some(orders) = sources.resolve("orders") {
//!     let raw = orders.run("SELECT count(*) FROM orders").await?;
//! }
//! ```

pub mod duckdb;
pub mod mock;
pub mod postgres;
pub mod set;
pub mod source;

pub use self::duckdb::{DuckDbEngine, DuckDbSource};
pub use mock::{MockSource, MockSourceBuilder};
pub use postgres::PostgresSource;
pub use set::{SourceInfo, SourceSet};
pub use source::{RawResult, Source, SourceError};
