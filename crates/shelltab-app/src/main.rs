//! shelltab - keeps the file manager to one window with many tabs.
//!
//! ```text
//! shelltab [--config <path>] [--log-format pretty|compact|json] [--write-config]
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use shelltab_common::{init_logging, LogConfig, LogFormat};
use shelltab_core::WatcherConfig;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "shelltab", version)]
#[command(about = "Keeps the file manager to one window with many tabs")]
struct Cli {
    /// Configuration file (defaults to the per-user config path)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: FormatArg,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    write_config: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<FormatArg> for LogFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Pretty => LogFormat::Pretty,
            FormatArg::Compact => LogFormat::Compact,
            FormatArg::Json => LogFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Route `log` records from the core crate into tracing
    tracing_log::LogTracer::init().context("Failed to set log tracer")?;

    let config_path = args.config.clone().unwrap_or_else(WatcherConfig::default_path);
    let config = WatcherConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    init_logging(LogConfig::from_level_str(&config.log_level).with_format(args.log_format.into()))
        .context("Failed to initialize logging")?;
    info!(config = %config_path.display(), "shelltab {}", env!("CARGO_PKG_VERSION"));

    if args.write_config {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Configuration written");
        return Ok(());
    }

    run(config).await
}

#[cfg(windows)]
async fn run(config: WatcherConfig) -> Result<()> {
    use shelltab_watcher::Watcher;

    let watcher = Watcher::new(shelltab_win32::backend(), &config);
    watcher.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutting down");

    watcher.shutdown().await;
    Ok(())
}

#[cfg(not(windows))]
async fn run(_config: WatcherConfig) -> Result<()> {
    tracing::error!("shelltab only runs on Windows");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("shelltab").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_defaults() {
        let args = parse(&[]).unwrap();
        assert!(args.config.is_none());
        assert_eq!(LogFormat::from(args.log_format), LogFormat::Pretty);
        assert!(!args.write_config);
    }

    #[test]
    fn test_parse_all_options() {
        let args = parse(&["--config", "C:\\cfg.json", "--log-format", "json", "--write-config"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("C:\\cfg.json")));
        assert_eq!(LogFormat::from(args.log_format), LogFormat::Json);
        assert!(args.write_config);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(parse(&["--verbose"]).is_err());
        assert!(parse(&["--log-format", "xml"]).is_err());
        assert!(parse(&["--config"]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
