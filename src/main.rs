mod app;
mod batch;
mod cache;
mod catalog;
mod config;
mod connectivity;
mod controller;
mod event;
mod logging;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pokedex")]
#[command(about = "Browse the Pokémon catalog with an offline-tolerant cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/pokedex/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Start with the network marked unavailable; only cached data is served
  #[arg(long)]
  offline: bool,

  /// Keep the cache in memory only
  #[arg(long)]
  no_cache: bool,

  /// Print results as JSON
  #[arg(long)]
  json: bool,

  #[command(subcommand)]
  command: app::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.logging)?;

  let options = app::AppOptions {
    offline: args.offline,
    no_cache: args.no_cache,
    json: args.json,
  };

  // Initialize and run the app
  let mut app = app::App::new(config, options)?;
  app.run(args.command).await?;

  Ok(())
}
