//! cachefetch - drive the preload / transfer / hydrate cycle from a terminal
//!
//! `preload` fetches resources the way a server does before rendering and
//! prints the cache transfer string. `render` initializes a fresh cache from
//! that string the way a client does at bootstrap, then reads each resource
//! through a [`FetchView`], reporting how many network requests were needed.

use std::fs;
use std::path::Path;

use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use caching_fetch::cli::{Cli, Command};
use caching_fetch::{Cache, CacheConfig, CachingFetch, FetchView};

/// Installs the stderr log subscriber, leaving stdout for command output
fn init_logging(verbose: bool) {
    let filter = if verbose {
        "caching_fetch=debug,cachefetch=debug,info"
    } else {
        "caching_fetch=info,cachefetch=info,warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Preloads every URL and emits the resulting transfer string
async fn run_preload(
    fetcher: &CachingFetch,
    urls: &[String],
    out: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    futures::future::join_all(urls.iter().map(|url| fetcher.preload(url))).await;

    let serialized = fetcher.cache().serialize()?;
    match out {
        Some(path) => {
            fs::write(path, &serialized)?;
            info!(
                path = %path.display(),
                entries = fetcher.cache().len(),
                "Wrote cache transfer string"
            );
        }
        None => println!("{}", serialized),
    }
    Ok(())
}

/// Hydrates from `state` and reads every URL through its own view
async fn run_render(
    fetcher: &CachingFetch,
    state: Option<&Path>,
    urls: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = state {
        let serialized = fs::read_to_string(path)?;
        fetcher.cache().initialize(serialized.trim());
    }

    let views: Vec<FetchView> = urls
        .iter()
        .map(|url| FetchView::mount(fetcher.clone(), url))
        .collect();

    let mut resources = Vec::with_capacity(views.len());
    for view in &views {
        let state = view.settled().await;
        resources.push(json!({
            "url": view.url(),
            "is_loading": state.is_loading,
            "data": state.data,
            "error": state.error.map(|e| e.to_string()),
        }));
    }

    let report = json!({
        "resources": resources,
        "network_requests": fetcher.network_requests(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = CacheConfig::from_cli(&cli)?;
    let fetcher = config.build(Cache::new())?;

    match &cli.command {
        Command::Preload { urls, out } => run_preload(&fetcher, urls, out.as_deref()).await,
        Command::Render { state, urls } => run_render(&fetcher, state.as_deref(), urls).await,
    }
}
