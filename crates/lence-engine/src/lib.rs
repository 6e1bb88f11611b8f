//! Query execution pipeline
//!
//! This crate handles:
//! - Checking caller-supplied parameters against a template's declared set
//! - Substituting escaped, type-aware literals into trusted SQL
//! - Running the result against the template's bound data source through
//!   the [`ExecutionGateway`], the single point where every failure is
//!   converted into a caller-facing [`lence_core::ExecError`]

pub mod gateway;
pub mod interpolate;

pub use gateway::{ExecutionGateway, DEFAULT_TIMEOUT};
pub use interpolate::{check_params, quoted_literal, sql_literal, validate, InterpolateError};
