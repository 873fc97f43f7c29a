//! HTTP and WebSocket server for mockql.
//!
//! # Usage
//!
//! ```bash
//! # Serve the bundled ski day schema on http://localhost:4000/graphql
//! mockql
//!
//! # Serve your own schema with deterministic mocks
//! mockql --schema schema.graphql --mocks mocks.json --seed 42
//! ```

pub mod config;
pub mod http;
pub mod skiday;

use colored::Colorize;
use miette::Diagnostic;
use mockql_runtime::{
    pubsub, ConnectionManager, Executor, HandlerMap, MockConfig, MockResolver, MockRules,
    MockRulesFile, SchemaError, SubscriptionRegistry, TypeSystem,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub use config::{Cli, ServerConfig};

/// Startup and serving failures.
#[derive(Debug, Error, Diagnostic)]
pub enum ServerError {
    #[error("failed to read {}", path.display())]
    #[diagnostic(code(mockql::read_file))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(mockql::schema), help("fix the schema or mock rules and restart"))]
    Schema(#[from] SchemaError),

    #[error("invalid mock rules file {}", path.display())]
    #[diagnostic(code(mockql::mock_rules))]
    MockRules {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to bind {addr}")]
    #[diagnostic(code(mockql::bind), help("is another server already listening on this port?"))]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server failed")]
    #[diagnostic(code(mockql::serve))]
    Serve(#[source] std::io::Error),
}

fn read_file(path: &Path) -> Result<String, ServerError> {
    std::fs::read_to_string(path).map_err(|source| ServerError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the configured schema, or the bundled one.
pub fn load_schema(config: &ServerConfig) -> Result<TypeSystem, ServerError> {
    let sdl = match &config.schema_file {
        Some(path) => read_file(path)?,
        None => skiday::SCHEMA.to_string(),
    };
    Ok(TypeSystem::parse(&sdl)?)
}

/// Loads the configured mock rules, or the bundled ones.
pub fn load_mocks(config: &ServerConfig) -> Result<(MockRules, MockConfig), ServerError> {
    let (path, text) = match &config.mocks_file {
        Some(path) => (path.clone(), read_file(path)?),
        None => (PathBuf::from("skiday-mocks.json"), skiday::MOCKS.to_string()),
    };
    let file = MockRulesFile::from_json(&text)
        .map_err(|source| ServerError::MockRules { path, source })?;
    let (rules, mut mock_config) = file.into_rules()?;
    if let Some(seed) = config.seed {
        mock_config = mock_config.seed(seed);
    }
    Ok((rules, mock_config))
}

/// Builds the connection manager and the event pump feeding its registry.
///
/// The bundled ski day store is installed only when serving the bundled
/// schema.
pub fn build(config: &ServerConfig) -> Result<(Arc<ConnectionManager>, pubsub::EventStream), ServerError> {
    let schema = load_schema(config)?;
    let (rules, mock_config) = load_mocks(config)?;
    rules.check(&schema)?;

    let (publisher, events) = pubsub::channel();
    let handlers = if config.schema_file.is_none() {
        skiday::SkiDayStore::new(publisher).handlers()
    } else {
        HandlerMap::new()
    };

    let executor = Arc::new(Executor::new(
        schema,
        MockResolver::new(rules, mock_config),
        handlers,
    ));
    let registry = Arc::new(SubscriptionRegistry::new(Arc::clone(&executor)));
    let manager = Arc::new(ConnectionManager::new(
        executor,
        registry,
        config.manager_config(),
    ));
    Ok((manager, events))
}

/// Runs the server until a shutdown signal, then drains it.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let (manager, events) = build(&config)?;
    let pump = tokio::spawn(Arc::clone(manager.registry()).run_events(events));

    let addr = config.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    print_banner(&config);

    let drain_timeout = config.drain_timeout;
    let state = http::AppState::new(Arc::clone(&manager), config);
    let app = http::router(state.clone());

    let drain_manager = Arc::clone(&manager);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received, draining");
            drain_manager.initiate_drain().await;
        })
        .await
        .map_err(ServerError::Serve)?;

    // Upgraded sockets outlive `serve`.
    if !state.wait_for_sockets(drain_timeout).await {
        warn!("websocket connections still open after the drain timeout");
    }
    pump.abort();
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                warn!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

fn print_banner(config: &ServerConfig) {
    let addr = config.addr();
    println!();
    println!("  {} {}", "mockql".green().bold(), "ready".dimmed());
    println!();
    println!("  {} http://{}{}", "HTTP:     ".bold(), addr, config.path);
    println!("  {} ws://{}{}", "WebSocket:".bold(), addr, config.path);
    if config.playground {
        println!("  {} http://{}{}", "Landing:  ".bold(), addr, config.path);
    }
    println!();
}
