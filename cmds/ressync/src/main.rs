use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use util::BrokenPipeGuard;

mod config;
mod discover;
mod sheet;
mod sync;
mod util;

#[derive(Parser)]
#[command(name = "ressync")]
#[command(about = "Apply sizing sheet values to Kubernetes manifests", long_about = None)]
#[command(version = env!("RESSYNC_VERSION"))]
struct Cli {
	#[command(flatten)]
	args: sync::SyncArgs,
}

/// Initialize tracing with logfmt output format
fn init_logger(level: &str) {
	let level = match level.to_lowercase().as_str() {
		"trace" => "trace",
		"debug" => "debug",
		"info" => "info",
		"warn" | "warning" => "warn",
		"error" => "error",
		_ => "info",
	};

	let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::registry()
		.with(filter)
		.with(tracing_logfmt::layer())
		.init();
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	init_logger(&cli.args.log_level);

	let stdout = BrokenPipeGuard::new(std::io::stdout());
	sync::run(cli.args, stdout)
}
