//! plumage CLI - run log lines through configured decorator pipelines
//!
//! Loads a registry configuration, then either reports the compiled pipelines
//! or pipes stdin through a decorated console or file transport.

use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use plumage::{
    builtin_resolver, CallOptions, ConsoleTransport, FileTransport, Registry, RegistryConfig,
    Transport,
};

#[derive(Parser)]
#[command(name = "plumage")]
#[command(version, about = "Decorator pipelines for log and event transports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a configuration and list the compiled pipelines
    Check {
        /// Path to the registry configuration (defaults to $PLUMAGE_CONFIG)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Decorate stdin line by line and write it to a transport
    Pipe {
        /// Path to the registry configuration (defaults to $PLUMAGE_CONFIG)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Transport to write to
        #[arg(short, long, value_enum, default_value = "console")]
        transport: TransportKind,

        /// Output file for the file transport
        #[arg(short, long, default_value = "plumage.log")]
        path: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TransportKind {
    Console,
    File,
}

fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { config } => check(config),
        Commands::Pipe { config, transport, path } => pipe(config, transport, path),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Resolve the config path with precedence: CLI > PLUMAGE_CONFIG > plumage.yaml
fn config_path(cli_override: Option<PathBuf>) -> PathBuf {
    cli_override
        .or_else(|| std::env::var("PLUMAGE_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("plumage.yaml"))
}

fn load_registry(config: Option<PathBuf>) -> Result<Registry, String> {
    let path = config_path(config);
    let config = RegistryConfig::load_from_file(&path).map_err(|e| e.to_string())?;
    Registry::from_config(&builtin_resolver(), &config).map_err(|e| e.to_string())
}

fn check(config: Option<PathBuf>) -> Result<(), String> {
    let registry = load_registry(config)?;

    println!("Plugins: {}", registry.plugin_names().join(", "));
    for identifier in registry.identifiers() {
        if let Some(pipeline) = registry.get_pipeline(identifier) {
            println!("  {} -> [{}]", identifier, pipeline.steps().join(" -> "));
        }
    }
    Ok(())
}

fn pipe(config: Option<PathBuf>, kind: TransportKind, path: PathBuf) -> Result<(), String> {
    let registry = load_registry(config)?;

    match kind {
        TransportKind::Console => {
            let mut transport = registry
                .wrap(ConsoleTransport::new())
                .map_err(|e| e.to_string())?;
            forward_stdin(&mut transport)?;
            transport.flush().map_err(|e| e.to_string())
        }
        TransportKind::File => {
            let file = FileTransport::open(&path).map_err(|e| e.to_string())?;
            let mut transport = registry.wrap(file).map_err(|e| e.to_string())?;
            forward_stdin(&mut transport)?;
            transport.flush().map_err(|e| e.to_string())
        }
    }
}

fn forward_stdin<T: Transport>(transport: &mut T) -> Result<(), String> {
    let options = CallOptions::new();
    let mut count = 0u64;

    for line in io::stdin().lock().lines() {
        let line = line.map_err(|e| format!("Failed to read stdin: {}", e))?;
        transport
            .write(serde_json::Value::String(line), &options)
            .map_err(|e| e.to_string())?;
        count += 1;
    }

    tracing::info!("Forwarded {} lines to '{}'", count, T::IDENTIFIER);
    Ok(())
}
