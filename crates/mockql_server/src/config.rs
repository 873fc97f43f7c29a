//! Server configuration and command-line arguments.

use clap::Parser;
use mockql_runtime::ManagerConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the `mockql` binary.
#[derive(Parser, Debug)]
#[command(name = "mockql")]
#[command(author, version, about = "Schema-driven GraphQL mock server with subscriptions", long_about = None)]
pub struct Cli {
    /// Host to bind to
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "4000")]
    pub port: u16,

    /// Endpoint path for HTTP and WebSocket traffic
    #[arg(long, default_value = "/graphql")]
    pub path: String,

    /// Schema file (SDL). Defaults to the bundled ski day schema
    #[arg(short, long)]
    pub schema: Option<PathBuf>,

    /// Mock rules file (JSON). Defaults to the bundled ski day rules
    #[arg(short, long)]
    pub mocks: Option<PathBuf>,

    /// Seed for deterministic mock data
    #[arg(long)]
    pub seed: Option<u64>,

    /// Seconds to wait for in-flight operations when draining
    #[arg(long, default_value = "10")]
    pub drain_timeout: u64,

    /// Seconds between keep-alive messages on WebSocket connections
    #[arg(long, default_value = "12")]
    pub keepalive: u64,

    /// Disable the landing page
    #[arg(long)]
    pub no_playground: bool,
}

impl Cli {
    pub fn into_config(self) -> ServerConfig {
        let mut config = ServerConfig::new()
            .host(self.host)
            .port(self.port)
            .path(self.path)
            .drain_timeout(Duration::from_secs(self.drain_timeout))
            .keepalive(Duration::from_secs(self.keepalive));
        if let Some(schema) = self.schema {
            config = config.schema_file(schema);
        }
        if let Some(mocks) = self.mocks {
            config = config.mocks_file(mocks);
        }
        if let Some(seed) = self.seed {
            config = config.seed(seed);
        }
        if self.no_playground {
            config = config.no_playground();
        }
        config
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Endpoint path, always starting with `/`.
    pub path: String,
    /// Serve the landing page on `GET <path>`.
    pub playground: bool,
    /// Interval between keep-alive messages.
    pub keepalive: Duration,
    /// Upper bound on a drain.
    pub drain_timeout: Duration,
    /// Schema file, or the bundled schema if unset.
    pub schema_file: Option<PathBuf>,
    /// Mock rules file, or the bundled rules if unset.
    pub mocks_file: Option<PathBuf>,
    /// Overrides the seed from the mock rules file.
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    const MIN_KEEPALIVE: Duration = Duration::from_secs(1);

    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4000,
            path: "/graphql".to_string(),
            playground: true,
            keepalive: Duration::from_secs(12),
            drain_timeout: ManagerConfig::default().drain_timeout,
            schema_file: None,
            mocks_file: None,
            seed: None,
        }
    }

    /// Sets the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the endpoint path. A leading `/` is added if missing.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        self
    }

    /// Disables the landing page.
    pub fn no_playground(mut self) -> Self {
        self.playground = false;
        self
    }

    /// Sets the keep-alive interval, at least one second.
    pub fn keepalive(mut self, interval: Duration) -> Self {
        self.keepalive = interval.max(Self::MIN_KEEPALIVE);
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn schema_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_file = Some(path.into());
        self
    }

    pub fn mocks_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.mocks_file = Some(path.into());
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// `host:port`, as passed to the listener.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig::default().drain_timeout(self.drain_timeout)
    }
}
