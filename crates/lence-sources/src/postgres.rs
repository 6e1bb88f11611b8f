//! PostgreSQL data source
//!
//! Connects with tokio-postgres, over TLS via native-tls when the source
//! sets `tls = true`. Statements are prepared once to learn the column
//! types, then run with the simple query protocol and converted from text
//! based on those types.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let source = PostgresSource::connect(
//!     "warehouse",
//!     "host=localhost port=5432 dbname=analytics user=reader",
//!     false,
//! ).await?;
//! let raw = source.run("SELECT 1 AS one").await?;
//! ```

use crate::source::{RawResult, Source, SourceError};

#[cfg(feature = "postgres")]
use lence_core::ColumnInfo;

#[cfg(feature = "postgres")]
use tokio_postgres::{Client, Config as PgConfig, NoTls, SimpleQueryMessage};

#[cfg(feature = "postgres")]
use postgres_native_tls::MakeTlsConnector;

#[cfg(feature = "postgres")]
use native_tls::TlsConnector;

/// PostgreSQL data source
pub struct PostgresSource {
    name: String,

    /// PostgreSQL client (only available with postgres feature)
    #[cfg(feature = "postgres")]
    client: Client,

    /// Host for logs
    host: String,
}

impl PostgresSource {
    /// Connect using a PostgreSQL connection string
    ///
    /// # Arguments
    ///
    /// * `name` - Configured source name
    /// * `conn_str` - Connection string, e.g. `host=localhost dbname=analytics`
    /// * `tls` - Connect over TLS (the string's sslmode is ignored)
    #[cfg(feature = "postgres")]
    pub async fn connect(name: impl Into<String>, conn_str: &str, tls: bool) -> Result<Self, SourceError> {
        let name = name.into();
        let config: PgConfig = conn_str
            .parse()
            .map_err(|e| SourceError::Config(format!("Invalid connection string for {}: {}", name, e)))?;

        let host = config
            .get_hosts()
            .first()
            .map(|h| format!("{:?}", h))
            .unwrap_or_else(|| "localhost".to_string());

        let client = if tls {
            let connector = TlsConnector::builder()
                .build()
                .map_err(|e| SourceError::Config(format!("Failed to create TLS connector: {}", e)))?;
            let (client, connection) = config
                .connect(MakeTlsConnector::new(connector))
                .await
                .map_err(|e| SourceError::Connection(format!("Failed to connect with TLS to {}: {}", host, e)))?;
            let source = name.clone();
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(source = %source, error = %e, "PostgreSQL TLS connection closed");
                }
            });
            client
        } else {
            let (client, connection) = config
                .connect(NoTls)
                .await
                .map_err(|e| SourceError::Connection(format!("Failed to connect to {}: {}", host, e)))?;
            let source = name.clone();
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(source = %source, error = %e, "PostgreSQL connection closed");
                }
            });
            client
        };

        tracing::debug!(source = %name, host = %host, tls, "connected to PostgreSQL");
        Ok(Self { name, client, host })
    }

    /// Connect without the postgres feature (returns error)
    #[cfg(not(feature = "postgres"))]
    pub async fn connect(_name: impl Into<String>, _conn_str: &str, _tls: bool) -> Result<Self, SourceError> {
        Err(SourceError::NotCompiled("postgres"))
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait::async_trait]
impl Source for PostgresSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn engine(&self) -> &'static str {
        "postgres"
    }

    #[cfg(feature = "postgres")]
    async fn run(&self, sql: &str) -> Result<RawResult, SourceError> {
        let statement = self.client.prepare(sql).await.map_err(query_error)?;
        let types: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.type_().name().to_uppercase())
            .collect();
        let columns: Vec<ColumnInfo> = statement
            .columns()
            .iter()
            .zip(&types)
            .map(|(c, t)| ColumnInfo::new(c.name(), t.clone()))
            .collect();

        let messages = self.client.simple_query(sql).await.map_err(query_error)?;

        let mut rows = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                let mut values = Vec::with_capacity(types.len());
                for (idx, pg_type) in types.iter().enumerate() {
                    let text = row.try_get(idx).map_err(query_error)?;
                    values.push(text_to_json(text, pg_type));
                }
                rows.push(values);
            }
        }

        Ok(RawResult::new(columns, rows))
    }

    #[cfg(not(feature = "postgres"))]
    async fn run(&self, _sql: &str) -> Result<RawResult, SourceError> {
        Err(SourceError::NotCompiled("postgres"))
    }
}

#[cfg(feature = "postgres")]
fn query_error(e: tokio_postgres::Error) -> SourceError {
    match e.as_db_error() {
        Some(db) => SourceError::Query(db.message().to_string()),
        None if e.is_closed() => SourceError::Connection(e.to_string()),
        None => SourceError::Query(e.to_string()),
    }
}

/// Convert a text-protocol value using its PostgreSQL type name
#[cfg_attr(not(feature = "postgres"), allow(dead_code))]
fn text_to_json(text: Option<&str>, pg_type: &str) -> serde_json::Value {
    use serde_json::Value;

    let Some(text) = text else {
        return Value::Null;
    };

    match pg_type {
        "BOOL" => Value::Bool(text == "t"),
        "INT2" | "INT4" | "INT8" | "OID" => text
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        "FLOAT4" | "FLOAT8" | "NUMERIC" => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| Value::String(text.to_string()), Value::Number),
        "JSON" | "JSONB" => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())),
        _ => Value::String(text.to_string()),
    }
}
