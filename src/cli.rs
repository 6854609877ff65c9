//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

/// Controllable HTTP backend for testing cache behaviour
#[derive(Parser, Debug)]
#[command(name = "cache-test-backend")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "CACHE_TEST_BACKEND_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "CACHE_TEST_BACKEND_PORT", global = true)]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "CACHE_TEST_BACKEND_HOST", global = true)]
    pub host: Option<String>,

    /// Maximum number of concurrently delayed requests
    #[arg(long, global = true)]
    pub delay_capacity: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "CACHE_TEST_BACKEND_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "CACHE_TEST_BACKEND_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Apply command-line overrides on top of loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ref host) = self.host {
            config.server.host.clone_from(host);
        }
        if let Some(capacity) = self.delay_capacity {
            config.delay.capacity = capacity;
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the backend server (default)
    Serve,

    /// Print the effective configuration as YAML and exit
    Config,
}
