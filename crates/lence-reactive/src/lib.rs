//! Reactive dependency tracking
//!
//! Keeps a page's query results in step with its inputs:
//! - [`InputStore`] holds input values and broadcasts every change
//! - [`DependencyMap`] maps each input to the queries whose SQL references it
//! - [`ReactiveTracker`] re-runs exactly the dependent queries on a change and
//!   merges results by query name, dropping anything superseded
//!
//! ## Example
//!
//! ```rust,ignore
//! let inputs = Arc::new(InputStore::new());
//! let tracker = ReactiveTracker::spawn(Arc::new(gateway), Arc::clone(&inputs));
//!
//! tracker.navigate("/sales.md");
//! inputs.set("region", "EU", Some("Europe".to_string()));
//!
//! let page = tracker.wait_for(|s| s.is_settled()).await;
//! ```

pub mod client;
pub mod dependency;
pub mod inputs;
pub mod tracker;

pub use client::{QueryClient, QuerySpec};
pub use dependency::DependencyMap;
pub use inputs::{InputChange, InputStore, InputValue, Subscription};
pub use tracker::{PageSnapshot, PageStatus, ReactiveTracker};
