//! Reference CLI: load `watcher.json`, watch the configured roots and
//! print one line per delivered change.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use watchfs::Watcher;

mod config;

#[derive(Parser, Debug)]
#[command(name = "watchfs", about = "Watch directories recursively and report changes")]
struct Cli {
	/// Path to the configuration file
	#[arg(long, default_value = "watcher.json")]
	config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();

	let cli = Cli::parse();
	let config = config::load(&cli.config)?;

	info!("Registering watcher");
	let mut watcher = Watcher::new();
	for path in config.paths {
		watcher = watcher.add_path(path);
	}
	for pattern in config.ignore {
		watcher = watcher.ignore(pattern);
	}
	for extension in config.extensions {
		watcher = watcher.add_extension(extension);
	}
	let watcher =
		watcher.on_change(|info| println!("Changed: {}", info.path().display()), false);

	info!("Watching given paths...");
	let handle = watcher.start()?;

	let control = handle.control();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			info!("Shutting down");
			control.stop();
		}
	});

	handle.join().await?;
	Ok(())
}
