use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lence_core::Config;
use lence_reactive::QuerySpec;
use lence_registry::QueryRegistry;
use lence_server::{router, spawn_refresh_loop, AppState};

/// Lence - markdown pages backed by registered SQL queries
#[derive(Parser)]
#[command(name = "lence")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: lence.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the query API
    Serve {
        /// Address to bind, overrides [server] bind
        #[arg(short, long)]
        bind: Option<String>,

        /// Re-scan pages periodically
        #[arg(long)]
        dev: bool,
    },

    /// List every page's queries and the inputs they read
    Queries,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind, dev } => serve_command(config, bind, dev).await,
        Commands::Queries => queries_command(&config),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return Config::from_file(path).with_context(|| format!("loading {}", path.display()));
    }

    let default = Path::new("lence.toml");
    if default.exists() {
        return Config::from_file(default).context("loading lence.toml");
    }

    eprintln!("{}", "No config file found, using defaults".yellow());
    Ok(Config::default())
}

/// Serve command - register sources, scan pages and start the HTTP API
async fn serve_command(mut config: Config, bind: Option<String>, dev: bool) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    config.server.dev |= dev;

    let (state, report) = AppState::from_config(&config).await?;
    for (document, err) in &report.failed {
        eprintln!("{} {}: {}", "Skipped".yellow(), document, err);
    }

    if config.server.dev {
        let interval = Duration::from_millis(config.server.refresh_interval_ms.max(1));
        spawn_refresh_loop(state.registry().clone(), config.pages_path(), interval);
        tracing::info!(interval_ms = interval.as_millis() as u64, "development mode: watching pages");
    }

    let app = router(state, &config.server);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;

    tracing::info!(bind = %config.server.bind, "listening");
    eprintln!("{} http://{}", "Serving on".green(), config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
    }
}

/// Queries command - print what each page defines
fn queries_command(config: &Config) -> Result<()> {
    let registry = QueryRegistry::new();
    let report = registry.refresh(&config.pages_path())?;

    for document in registry.documents() {
        let Some(templates) = registry.queries(document.as_str()) else {
            continue;
        };

        println!("{}", document.as_str().bold());
        if templates.is_empty() {
            println!("  {}", "(no queries)".dimmed());
        }

        for template in templates {
            let spec = QuerySpec::from_template(&template);
            let source = template
                .source()
                .or(config.default_source.as_deref())
                .unwrap_or("<no source>");
            let params: Vec<&str> = spec.params.iter().map(String::as_str).collect();

            if params.is_empty() {
                println!("  {} {}", spec.name.green(), format!("[{}]", source).dimmed());
            } else {
                println!(
                    "  {} {} {}",
                    spec.name.green(),
                    format!("[{}]", source).dimmed(),
                    format!("inputs: {}", params.join(", ")).cyan()
                );
            }
        }
    }

    if report.failed.is_empty() {
        return Ok(());
    }

    eprintln!();
    for (document, err) in &report.failed {
        eprintln!("{} {}: {}", "Failed".red(), document, err);
    }
    Err(anyhow::anyhow!("{} page(s) failed to load", report.failed.len()))
}
