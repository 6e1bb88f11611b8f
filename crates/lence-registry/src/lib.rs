//! Query registry
//!
//! Process-wide map from (document path, query name) to a trusted
//! [`lence_core::QueryTemplate`]. Each document's templates are rebuilt as a
//! whole and swapped in atomically, so concurrent readers see either the old
//! map or the new one.
//!
//! Document discovery keeps the registry in sync with a pages directory.

pub mod discovery;
pub mod registry;

pub use discovery::{discover_pages, RefreshReport};
pub use registry::{DocumentQueries, LoadOutcome, LookupMiss, QueryRegistry, RegistryError};
