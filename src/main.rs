// Encore Gateway - Main Entry Point
//
// Runs the rate limiting gate in front of the Encore API and offers a few
// operator helpers for inspecting configuration.

use anyhow::Result;
use clap::{Parser, Subcommand};
use encore_gateway::config::Config;
use encore_gateway::rate_limit::{method_scope, RouteCategory};
use encore_gateway::server;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Encore: rate limiting gateway for the music backend
#[derive(Parser, Debug)]
#[command(name = "encore")]
#[command(author = "Encore Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Per-client, per-route rate limiting gateway", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the configuration file (default: ~/.config/encore/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway
    Serve,
    /// Print the route category for a path
    Classify {
        /// Request path, e.g. /api/songs/upload
        path: String,
    },
    /// Load and validate configuration, then print the policy table
    CheckConfig,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

fn init_tracing(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { config.log_level()? };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    match config.logging.format.to_lowercase().as_str() {
        "json" => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        "pretty" => tracing_subscriber::fmt().pretty().with_env_filter(filter).init(),
        _ => tracing_subscriber::fmt().compact().with_env_filter(filter).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let config = load_config(args.config.as_ref())?;
    init_tracing(&config, args.verbose)?;

    match args.command {
        Some(Commands::Serve) => {
            info!("Encore gateway v0.1.0 starting...");
            server::serve(&config).await?;
        }
        Some(Commands::Classify { path }) => {
            println!("{}", config.rate_limit.classifier.classify(&path));
        }
        Some(Commands::CheckConfig) => {
            print_policies(&config);
        }
        None => {
            info!("No command specified. Use \"encore --help\" for usage.");
        }
    }

    Ok(())
}

fn print_policies(config: &Config) {
    println!("Configuration OK");
    println!(
        "Rate limiting: {}",
        if config.rate_limit.enabled { "enabled" } else { "disabled" }
    );
    println!("{:<10} {:>10} {:>10} {:>12}", "category", "capacity", "refill", "period (s)");
    for category in RouteCategory::ALL {
        let policy = config.rate_limit.policies.policy_for(category);
        println!(
            "{:<10} {:>10} {:>10} {:>12}",
            category, policy.capacity, policy.refill_tokens, policy.refill_period_secs
        );
    }

    let mut methods: Vec<_> = config.rate_limit.methods.iter().collect();
    methods.sort_by(|a, b| a.0.cmp(b.0));
    for (name, limit) in methods {
        println!(
            "method {}: {} requests / {}s (key: {})",
            name,
            limit.requests,
            limit.window_secs,
            method_scope(limit, name)
        );
    }
}
