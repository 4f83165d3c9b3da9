//! Resolve a dependency list from the command line
//!
//! Prints the continuation arguments as JSON. With `--passive` nothing is
//! loaded; the tool reports what the loader would have fetched.

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

use require_loader::utils::{init_logging_from_config, with_custom_timeout};
use require_loader::{Dependency, LoaderConfig, LoaderHandle};

#[derive(Debug, Parser)]
#[command(name = "require-trace", version, about = "Resolve resource dependencies and print the results")]
struct Args {
    /// Dependencies as `Capability.Path:resource` or a bare `resource`
    #[arg(required = true)]
    dependencies: Vec<String>,

    /// Loader configuration file (TOML, or JSON with a `.json` extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base path for relative resource names
    #[arg(short, long)]
    base_path: Option<String>,

    /// Trace dependencies without loading anything
    #[arg(long)]
    passive: bool,

    /// Append a cache-busting timestamp to resource addresses
    #[arg(long)]
    timestamp: bool,

    /// Print the loader's diagnostic trace
    #[arg(short, long)]
    verbose: bool,

    /// Give up waiting after this many milliseconds
    #[arg(long, default_value_t = 10_000)]
    wait_ms: u64,

    /// Argument forwarded ahead of the resolved values (JSON, or a plain string)
    #[arg(long = "arg")]
    forwarded: Vec<String>,
}

fn load_config(args: &Args) -> anyhow::Result<LoaderConfig> {
    let mut config = match &args.config {
        Some(path) => LoaderConfig::load(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => LoaderConfig::default(),
    }
    .with_env_overrides();

    if let Some(base_path) = &args.base_path {
        config.base_path = Some(base_path.clone());
    }
    config.passive |= args.passive;
    config.append_timestamp |= args.timestamp;
    config.logging |= args.verbose;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging_from_config(config.log.as_ref());

    let dependencies = args
        .dependencies
        .iter()
        .map(|token| Dependency::parse(token))
        .collect::<Result<Vec<_>, _>>()?;
    let forwarded: Vec<Value> = args
        .forwarded
        .iter()
        .map(|raw| serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())))
        .collect();

    let passive = config.passive;
    let loader = LoaderHandle::spawn(config)?;
    let wait = Duration::from_millis(args.wait_ms);

    match with_custom_timeout(loader.resolve(dependencies, forwarded), wait).await {
        Ok(resolution) => {
            let resolution = resolution?;
            println!("{}", serde_json::to_string_pretty(&resolution.arguments())?);
            Ok(())
        }
        Err(_) => {
            let status = loader.status().await?;
            eprintln!(
                "Unresolved after {:?}: in flight {:?}, {} queued",
                wait, status.in_flight, status.pending
            );
            if passive {
                Ok(())
            } else {
                anyhow::bail!("Timed out waiting for dependencies")
            }
        }
    }
}
