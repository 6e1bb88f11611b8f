//! Shared handler state and startup wiring

use lence_core::Config;
use lence_engine::ExecutionGateway;
use lence_registry::{QueryRegistry, RefreshReport, RegistryError};
use lence_sources::SourceSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Startup failures
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to scan pages: {0}")]
    Pages(#[from] RegistryError),
}

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    gateway: ExecutionGateway,
}

impl AppState {
    pub fn new(gateway: ExecutionGateway) -> Self {
        Self { gateway }
    }

    /// Register sources and scan pages
    ///
    /// Sources that fail to open are logged and left out. Pages that fail to
    /// load are reported in the returned [`RefreshReport`]; only an
    /// unreadable pages directory fails startup.
    pub async fn from_config(config: &Config) -> Result<(Self, RefreshReport), StartupError> {
        let sources = Arc::new(SourceSet::from_config(config).await);
        let registry = Arc::new(QueryRegistry::new());
        let report = registry.refresh(&config.pages_path())?;

        tracing::info!(
            sources = sources.len(),
            documents = registry.len(),
            failed = report.failed.len(),
            "startup complete"
        );

        let gateway = ExecutionGateway::from_config(registry, sources, config);
        Ok((Self::new(gateway), report))
    }

    pub fn gateway(&self) -> &ExecutionGateway {
        &self.gateway
    }

    pub fn registry(&self) -> &Arc<QueryRegistry> {
        self.gateway.registry()
    }
}

/// Re-scan the pages directory on a fixed interval
///
/// Scan failures are logged and retried on the next tick; the registry keeps
/// serving what it last loaded.
pub fn spawn_refresh_loop(registry: Arc<QueryRegistry>, pages_dir: PathBuf, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately and startup already scanned
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let registry = Arc::clone(&registry);
            let dir = pages_dir.clone();
            match tokio::task::spawn_blocking(move || registry.refresh(&dir)).await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => tracing::warn!(error = %err, "page refresh failed"),
                Err(err) => tracing::error!(error = %err, "page refresh task panicked"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn from_config_scans_pages() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("pages")).unwrap();
        fs::write(
            dir.path().join("pages/index.md"),
            "{% query name=\"one\" %}SELECT 1{% /query %}",
        )
        .unwrap();

        let mut config = Config::default();
        config.project_root = dir.path().to_path_buf();

        let (state, report) = AppState::from_config(&config).await.unwrap();
        assert_eq!(report.loaded.len(), 1);
        assert!(state.registry().lookup("/index.md", "one").is_ok());
    }

    #[tokio::test]
    async fn missing_pages_dir_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.project_root = dir.path().to_path_buf();

        assert!(matches!(
            AppState::from_config(&config).await,
            Err(StartupError::Pages(_))
        ));
    }

    #[tokio::test]
    async fn refresh_loop_picks_up_new_pages() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(QueryRegistry::new());
        registry.refresh(dir.path()).unwrap();

        let handle = spawn_refresh_loop(Arc::clone(&registry), dir.path().to_path_buf(), Duration::from_millis(20));
        fs::write(dir.path().join("new.md"), "{% query name=\"q\" %}SELECT 1{% /query %}").unwrap();

        let found = tokio::time::timeout(Duration::from_secs(5), async {
            while registry.lookup("/new.md", "q").is_err() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        handle.abort();
        assert!(found.is_ok());
    }
}
