use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use topup_config::ConfigLoader;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod registry;

#[derive(Parser)]
#[command(name = "topup-broker")]
#[command(about = "Top-up order broker", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/local.toml")]
	config: PathBuf,

	#[arg(long, env = "TOPUP_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the broker
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_service(cli).await,
		Some(Commands::Validate) => validate_config(cli).await,
	}
}

async fn start_service(cli: Cli) -> Result<()> {
	info!("Starting top-up order broker");
	info!("Loading configuration from: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;
	registry::validate_backends(&config)?;

	let service = config.service.clone();
	info!("Service name: {}", service.name);

	let engine = registry::engine_builder(config)
		.build()
		.await
		.context("Failed to build order engine")?;
	let engine = Arc::new(engine);

	let http_engine = engine.clone();
	let http_handle = tokio::spawn(async move {
		api::start_http_server(http_engine, &service.http_host, service.http_port).await
	});

	info!("Top-up order broker started");

	// Confirmation intake runs until a shutdown signal arrives
	engine
		.run(setup_shutdown_signal())
		.await
		.context("Confirmation intake failed")?;

	info!("Shutdown signal received, stopping services...");
	http_handle.abort();

	info!("Top-up order broker stopped");
	Ok(())
}

async fn validate_config(cli: Cli) -> Result<()> {
	info!("Validating configuration file: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;
	registry::validate_backends(&config)?;

	info!("Configuration is valid");
	info!("Service name: {}", config.service.name);
	info!("  Cache: {}", config.cache.backend);
	info!("  Idempotency: {}", config.idempotency_backend().backend);
	info!("  Lock: {}", config.lock.backend);
	info!("  Ledger: {}", config.ledger.backend);
	info!("  Catalog: {}", config.catalog.backend);
	info!("  Payment: {}", config.payment.backend);
	for name in config.discovery.sources.keys() {
		info!("  Confirmation source: {}", name);
	}

	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
