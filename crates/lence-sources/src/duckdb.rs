//! DuckDB engine for file-backed sources
//!
//! csv and parquet sources become views in one shared in-memory database,
//! named after the source, so a template can join any of them. A `duckdb`
//! source opens its own database file.
//!
//! DuckDB calls block, so every statement runs on the blocking pool, on its
//! own connection cloned from the shared database. A statement whose caller
//! stops waiting (deadline, client gone) is interrupted.

use crate::source::{RawResult, Source, SourceError};
use lence_core::SourceKind;
use std::path::Path;

#[cfg(feature = "duckdb")]
use lence_core::ColumnInfo;
#[cfg(feature = "duckdb")]
use std::sync::{Arc, Mutex, PoisonError};

#[cfg(feature = "duckdb")]
use ::duckdb::{types::Value, Connection};

/// A DuckDB database shared by one or more sources
#[derive(Clone)]
pub struct DuckDbEngine {
    #[cfg(feature = "duckdb")]
    conn: Arc<Mutex<Connection>>,

    #[cfg(not(feature = "duckdb"))]
    _disabled: (),
}

impl DuckDbEngine {
    /// Open an in-memory database
    #[cfg(feature = "duckdb")]
    pub fn in_memory() -> Result<Self, SourceError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SourceError::Connection(format!("Failed to open in-memory DuckDB: {}", e)))?;
        Ok(Self::wrap(conn))
    }

    #[cfg(not(feature = "duckdb"))]
    pub fn in_memory() -> Result<Self, SourceError> {
        Err(SourceError::NotCompiled("duckdb"))
    }

    /// Open a database file
    #[cfg(feature = "duckdb")]
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let conn = Connection::open(path)
            .map_err(|e| SourceError::Connection(format!("Failed to open {}: {}", path.display(), e)))?;
        Ok(Self::wrap(conn))
    }

    #[cfg(not(feature = "duckdb"))]
    pub fn open(_path: &Path) -> Result<Self, SourceError> {
        Err(SourceError::NotCompiled("duckdb"))
    }

    #[cfg(feature = "duckdb")]
    fn wrap(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Expose a csv or parquet file as a view named `name`
    #[cfg(feature = "duckdb")]
    pub fn register_view(&self, name: &str, kind: SourceKind, path: &Path) -> Result<DuckDbSource, SourceError> {
        let sql = view_sql(name, kind, path)?;
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute_batch(&sql)
            .map_err(|e| SourceError::Config(format!("Failed to register view {}: {}", name, e)))?;
        drop(conn);

        tracing::debug!(source = name, kind = %kind, path = %path.display(), "registered view");
        Ok(self.source(name))
    }

    #[cfg(not(feature = "duckdb"))]
    pub fn register_view(&self, _name: &str, _kind: SourceKind, _path: &Path) -> Result<DuckDbSource, SourceError> {
        Err(SourceError::NotCompiled("duckdb"))
    }

    /// Fresh connection to the same database
    #[cfg(feature = "duckdb")]
    fn connect(&self) -> Result<Connection, SourceError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.try_clone()
            .map_err(|e| SourceError::Connection(format!("Failed to open DuckDB connection: {}", e)))
    }

    /// A source handle running against this database
    pub fn source(&self, name: impl Into<String>) -> DuckDbSource {
        DuckDbSource {
            name: name.into(),
            engine: self.clone(),
        }
    }
}

/// `CREATE VIEW` statement for a file source
#[cfg_attr(not(feature = "duckdb"), allow(dead_code))]
fn view_sql(name: &str, kind: SourceKind, path: &Path) -> Result<String, SourceError> {
    let reader = match kind {
        SourceKind::Csv => "read_csv_auto",
        SourceKind::Parquet => "read_parquet",
        other => {
            return Err(SourceError::Config(format!("{} sources are not file views", other)));
        }
    };
    let path = path
        .to_str()
        .ok_or_else(|| SourceError::Config(format!("Non UTF-8 path for source {}", name)))?;

    Ok(format!(
        "CREATE OR REPLACE VIEW \"{}\" AS SELECT * FROM {}('{}')",
        name.replace('"', "\"\""),
        reader,
        path.replace('\'', "''")
    ))
}

/// A named source backed by a [`DuckDbEngine`]
#[derive(Clone)]
pub struct DuckDbSource {
    name: String,
    engine: DuckDbEngine,
}

#[async_trait::async_trait]
impl Source for DuckDbSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn engine(&self) -> &'static str {
        "duckdb"
    }

    #[cfg(feature = "duckdb")]
    async fn run(&self, sql: &str) -> Result<RawResult, SourceError> {
        let conn = self.engine.connect()?;
        let interrupt = conn.interrupt_handle();
        let sql = sql.to_string();

        let mut pending = InterruptOnDrop(Some(move || interrupt.interrupt()));
        let result = tokio::task::spawn_blocking(move || query_blocking(&conn, &sql)).await;
        pending.disarm();

        result.map_err(|e| SourceError::Internal(format!("DuckDB worker failed: {}", e)))?
    }

    #[cfg(not(feature = "duckdb"))]
    async fn run(&self, _sql: &str) -> Result<RawResult, SourceError> {
        let _ = &self.engine;
        Err(SourceError::NotCompiled("duckdb"))
    }
}

/// Runs its callback if dropped while still armed
#[cfg(feature = "duckdb")]
struct InterruptOnDrop<F: FnOnce()>(Option<F>);

#[cfg(feature = "duckdb")]
impl<F: FnOnce()> InterruptOnDrop<F> {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

#[cfg(feature = "duckdb")]
impl<F: FnOnce()> Drop for InterruptOnDrop<F> {
    fn drop(&mut self) {
        if let Some(interrupt) = self.0.take() {
            tracing::debug!("interrupting abandoned DuckDB statement");
            interrupt();
        }
    }
}

#[cfg(feature = "duckdb")]
fn query_blocking(conn: &Connection, sql: &str) -> Result<RawResult, SourceError> {
    let query_error = |e: ::duckdb::Error| SourceError::Query(e.to_string());

    let mut stmt = conn.prepare(sql).map_err(query_error)?;
    let mut rows = stmt.query([]).map_err(query_error)?;

    let columns: Vec<ColumnInfo> = match rows.as_ref() {
        Some(stmt) => (0..stmt.column_count())
            .map(|idx| {
                let name = stmt.column_name(idx).map(|n| n.to_string()).unwrap_or_default();
                ColumnInfo::new(name, type_name(&stmt.column_type(idx)))
            })
            .collect(),
        None => Vec::new(),
    };

    let mut data = Vec::new();
    while let Some(row) = rows.next().map_err(query_error)? {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            let value: Value = row.get(idx).map_err(query_error)?;
            values.push(to_json(value));
        }
        data.push(values);
    }

    Ok(RawResult::new(columns, data))
}

/// DuckDB SQL type name for an Arrow result column
#[cfg(feature = "duckdb")]
fn type_name(data_type: &::duckdb::arrow::datatypes::DataType) -> String {
    use ::duckdb::arrow::datatypes::DataType;

    match data_type {
        DataType::Null => "NULL".to_string(),
        DataType::Boolean => "BOOLEAN".to_string(),
        DataType::Int8 => "TINYINT".to_string(),
        DataType::Int16 => "SMALLINT".to_string(),
        DataType::Int32 => "INTEGER".to_string(),
        DataType::Int64 => "BIGINT".to_string(),
        DataType::UInt8 => "UTINYINT".to_string(),
        DataType::UInt16 => "USMALLINT".to_string(),
        DataType::UInt32 => "UINTEGER".to_string(),
        DataType::UInt64 => "UBIGINT".to_string(),
        DataType::Float16 | DataType::Float32 => "FLOAT".to_string(),
        DataType::Float64 => "DOUBLE".to_string(),
        DataType::Decimal128(p, s) | DataType::Decimal256(p, s) => format!("DECIMAL({},{})", p, s),
        DataType::Utf8 | DataType::LargeUtf8 => "VARCHAR".to_string(),
        DataType::Binary | DataType::LargeBinary | DataType::FixedSizeBinary(_) => "BLOB".to_string(),
        DataType::Date32 | DataType::Date64 => "DATE".to_string(),
        DataType::Time32(_) | DataType::Time64(_) => "TIME".to_string(),
        DataType::Timestamp(_, Some(_)) => "TIMESTAMP WITH TIME ZONE".to_string(),
        DataType::Timestamp(_, None) => "TIMESTAMP".to_string(),
        DataType::Interval(_) | DataType::Duration(_) => "INTERVAL".to_string(),
        DataType::List(_) | DataType::LargeList(_) | DataType::FixedSizeList(_, _) => "LIST".to_string(),
        DataType::Struct(_) => "STRUCT".to_string(),
        DataType::Map(_, _) => "MAP".to_string(),
        other => format!("{:?}", other).to_uppercase(),
    }
}

/// Convert an engine value into its JSON form
#[cfg(feature = "duckdb")]
fn to_json(value: Value) -> serde_json::Value {
    use ::duckdb::types::TimeUnit;
    use serde_json::{json, Value as Json};

    fn micros(unit: TimeUnit, value: i64) -> i64 {
        match unit {
            TimeUnit::Second => value.saturating_mul(1_000_000),
            TimeUnit::Millisecond => value.saturating_mul(1_000),
            TimeUnit::Microsecond => value,
            TimeUnit::Nanosecond => value / 1_000,
        }
    }

    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(b),
        Value::TinyInt(n) => json!(n),
        Value::SmallInt(n) => json!(n),
        Value::Int(n) => json!(n),
        Value::BigInt(n) => json!(n),
        Value::UTinyInt(n) => json!(n),
        Value::USmallInt(n) => json!(n),
        Value::UInt(n) => json!(n),
        Value::UBigInt(n) => json!(n),
        // Outside the i64 range JSON numbers lose precision; keep the digits
        Value::HugeInt(n) => i64::try_from(n).map(|n| json!(n)).unwrap_or_else(|_| Json::String(n.to_string())),
        Value::Float(f) => serde_json::Number::from_f64(f64::from(f)).map_or(Json::Null, Json::Number),
        Value::Double(f) => serde_json::Number::from_f64(f).map_or(Json::Null, Json::Number),
        Value::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| Json::String(d.to_string()), Json::Number),
        Value::Text(s) | Value::Enum(s) => Json::String(s),
        Value::Date32(days) => chrono::NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(i64::from(days))))
            .map_or(Json::Null, |date| Json::String(date.format("%Y-%m-%d").to_string())),
        Value::Timestamp(unit, value) => chrono::DateTime::<chrono::Utc>::from_timestamp_micros(micros(unit, value))
            .map_or(Json::Null, |ts| Json::String(ts.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        Value::Time64(unit, value) => {
            let total = micros(unit, value);
            chrono::NaiveTime::from_num_seconds_from_midnight_opt(
                (total / 1_000_000) as u32,
                ((total % 1_000_000) * 1_000) as u32,
            )
            .map_or(Json::Null, |t| Json::String(t.format("%H:%M:%S%.f").to_string()))
        }
        Value::List(items) => Json::Array(items.into_iter().map(to_json).collect()),
        other => Json::String(format!("{:?}", other)),
    }
}
