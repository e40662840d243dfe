//! `watcher.json` loading.
//!
//! Configuration problems are fatal before any watch starts: a missing
//! file, an unreadable file and a missing `paths` key each produce their
//! own message.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct Config {
	/// Roots to watch recursively. Required.
	pub paths: Vec<PathBuf>,
	/// Regexes matched against resolved full paths.
	#[serde(default)]
	pub ignore: Vec<String>,
	/// Extension allow-list; empty means everything passes.
	#[serde(default)]
	pub extensions: Vec<String>,
}

pub fn load(path: &Path) -> Result<Config> {
	if !path.exists() {
		bail!(
			"configuration file missing, please create {:?} in your project directory",
			path
		);
	}

	let raw = fs::read_to_string(path).with_context(|| {
		format!(
			"configuration file {:?} cannot be read, please verify its permissions",
			path
		)
	})?;

	let config: Config = serde_json::from_str(&raw)
		.with_context(|| format!("invalid configuration in {:?}", path))?;

	if config.paths.is_empty() {
		bail!("please specify directories to watch under \"paths\"");
	}

	Ok(config)
}
