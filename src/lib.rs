//! Cache test backend
//!
//! A controllable HTTP backend for checking how an intermediary cache
//! (Varnish, a CDN, a reverse proxy) treats different response shapes.
//!
//! # Features
//!
//! - **Cache headers**: `Cache-Control: max-age=<n>` for any integer, including `0` and negatives
//! - **Status codes**: any status from 100 to 999, optionally with `max-age`
//! - **Cookies**: sets a cookie and echoes the one the request carried
//! - **Slow responses**: simulated delays under 60 seconds, admitted through a bounded gate
//!   that rejects instead of queueing once saturated
//!
//! Every body is `{"isCacheableHeaderSet": bool, "status": int, "message"?: string}`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod builder;
pub mod cli;
pub mod config;
pub mod error;
pub mod failsafe;
pub mod metrics;
pub mod response;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
