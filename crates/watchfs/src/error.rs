use std::io;
use thiserror::Error;

/// Errors surfaced by the watcher core.
///
/// Backend failures and invalid filter patterns are kept distinct so
/// callers can tell a watch-limit problem from an operator typo.
#[derive(Debug, Error)]
pub enum Error {
	#[error("backend error: {0}")]
	Backend(#[source] io::Error),

	#[error("walk error on {path}: {source}")]
	Walk {
		path: std::path::PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("invalid ignore pattern {pattern:?}: {source}")]
	InvalidFilterPattern {
		pattern: String,
		#[source]
		source: regex::Error,
	},
}

pub type Result<T> = std::result::Result<T, Error>;
