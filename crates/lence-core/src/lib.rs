//! Lence Core
//!
//! Shared domain model for the query pipeline:
//! - Query templates and the placeholders they reference
//! - Caller-supplied parameter values
//! - Uniform tabular execution results
//! - The caller-facing error taxonomy
//! - Project configuration (lence.toml)

pub mod config;
pub mod error;
pub mod placeholder;
pub mod result;
pub mod template;
pub mod value;

pub use config::{Config, ConfigError, ExecutionConfig, ServerConfig, SourceConfig, SourceKind};
pub use error::{ErrorKind, ExecError, ParamError, ParamErrorKind};
pub use placeholder::{extract_placeholders, placeholder_spans};
pub use result::{ColumnInfo, ExecutionResult, ShapeError};
pub use template::{DocumentPath, QueryTemplate};
pub use value::{ParamValue, Params};
