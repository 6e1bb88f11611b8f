//! HTTP surface for the query pipeline
//!
//! Routes:
//! - `POST /api/sources/query` executes a registered query
//! - `GET /api/sources` and `GET /api/sources/:name` describe data sources
//! - `GET /api/pages/queries?page=/x.md` lists a page's queries and their inputs
//! - `GET /health`
//!
//! Failures are returned as `{ "error": "<kind>", "detail": "<text>" }`.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{router, PageQueries, QueryRequest};
pub use state::{spawn_refresh_loop, AppState, StartupError};
