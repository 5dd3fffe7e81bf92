use clap::Parser;
use ipa_healthcheck_exporter::config::Config;
use ipa_healthcheck_exporter::{build_registry, server};
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "IPA_HEALTHCHECK_EXPORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Path under which to expose the metrics
    #[arg(long, env = "IPA_HEALTHCHECK_EXPORTER_METRICS_PATH")]
    metrics_path: Option<String>,

    /// Path to the ipa-healthcheck tool
    #[arg(long, env = "IPA_HEALTHCHECK_EXPORTER_IPAHEALTHCHECK_PATH")]
    ipahealthcheck_path: Option<PathBuf>,

    /// Path to the ipa-healthcheck log file
    #[arg(long, env = "IPA_HEALTHCHECK_EXPORTER_IPAHEALTHCHECK_LOG_PATH")]
    ipahealthcheck_log_path: Option<PathBuf>,

    /// Address on which to expose metrics
    #[arg(long, env = "IPA_HEALTHCHECK_EXPORTER_ADDRESS")]
    address: Option<String>,

    /// Port on which to expose metrics
    #[arg(short, long, env = "IPA_HEALTHCHECK_EXPORTER_PORT")]
    port: Option<u16>,

    /// Run ipa-healthcheck through sudo
    #[arg(long, env = "IPA_HEALTHCHECK_EXPORTER_SUDO")]
    sudo: bool,

    /// Enable debug logging
    #[arg(short, long, env = "IPA_HEALTHCHECK_EXPORTER_VERBOSE")]
    verbose: bool,

    /// Directory for the temporary ipa-healthcheck report
    #[arg(long, env = "IPA_HEALTHCHECK_EXPORTER_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Print an example configuration file and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn overrides(&self) -> Config {
        Config::from_cli_args(
            self.metrics_path.clone(),
            self.ipahealthcheck_path.clone(),
            self.ipahealthcheck_log_path.clone(),
            self.address.clone(),
            self.port,
            self.sudo,
            self.verbose,
            self.temp_dir.clone(),
        )
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", Config::example_toml());
        exit(0);
    }

    let file_config = match &cli.config {
        Some(path) => match Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config file {}: {}", path.display(), e);
                exit(1);
            }
        },
        None => Config::default(),
    };

    let config = match file_config.merge_with(cli.overrides()).resolve() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            exit(1);
        }
    };

    let default_level = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("ipa-healthcheck exporter {}", env!("CARGO_PKG_VERSION"));

    let registry = match build_registry(&config) {
        Ok(registry) => registry,
        Err(e) => {
            error!("Failed to build metrics registry: {}", e);
            exit(1);
        }
    };

    if let Err(e) = server::serve(&config, registry).await {
        error!("HTTP server failed: {}", e);
        exit(1);
    }

    // In-flight scrapes are not waited for.
    exit(0);
}
