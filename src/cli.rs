//! Command-line interface parsing for cachefetch
//!
//! `cachefetch preload` plays the server: it fetches resources and emits the
//! cache transfer string. `cachefetch render` plays the client: it hydrates a
//! cache from that string and reads resources through it.

use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono::Duration;
use clap::{Parser, Subcommand};
use reqwest::Url;
use thiserror::Error;

use crate::cache::DEFAULT_FRESHNESS_SECS;
use crate::config::CacheConfig;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The base URL is not an absolute http(s) URL
    #[error("Invalid base URL: '{0}'. Expected an absolute http:// or https:// URL")]
    InvalidBaseUrl(String),

    /// A zero timeout would fail every request
    #[error("Invalid timeout: must be at least 1 second")]
    ZeroTimeout,
}

/// cachefetch - deduplicating fetch cache with server-to-client transfer
#[derive(Parser, Debug)]
#[command(name = "cachefetch")]
#[command(about = "Preload resources into a transferable cache and render from it")]
#[command(version)]
pub struct Cli {
    /// Base URL that relative resource identifiers are resolved against
    #[arg(long, value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Seconds a fetched resource stays fresh
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_FRESHNESS_SECS as u32, global = true)]
    pub freshness_secs: u32,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout_secs: Option<u64>,

    /// Log cache hits, joins and requests
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Fetch resources and print the cache transfer string
    Preload {
        /// Resource identifiers to fetch
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,

        /// Write the transfer string to FILE instead of stdout
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Initialize the cache from a transfer string and read resources through it
    Render {
        /// File holding the transfer string produced by `preload`
        #[arg(short, long, value_name = "FILE")]
        state: Option<PathBuf>,

        /// Resource identifiers to read
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,
    },
}

/// Checks that `base_url` is an absolute http(s) URL
pub fn parse_base_url_arg(base_url: &str) -> Result<String, CliError> {
    match Url::parse(base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(base_url.to_string()),
        _ => Err(CliError::InvalidBaseUrl(base_url.to_string())),
    }
}

impl CacheConfig {
    /// Creates a CacheConfig from parsed CLI arguments.
    ///
    /// # Arguments
    /// * `cli` - The parsed CLI struct
    ///
    /// # Returns
    /// * `Ok(CacheConfig)` with the requested settings
    /// * `Err(CliError)` if the base URL or timeout is unusable
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let base_url = cli
            .base_url
            .as_deref()
            .map(parse_base_url_arg)
            .transpose()?;

        let request_timeout = match cli.timeout_secs {
            Some(0) => return Err(CliError::ZeroTimeout),
            Some(secs) => Some(StdDuration::from_secs(secs)),
            None => None,
        };

        Ok(CacheConfig {
            freshness_window: Duration::seconds(i64::from(cli.freshness_secs)),
            base_url,
            request_timeout,
        })
    }
}
