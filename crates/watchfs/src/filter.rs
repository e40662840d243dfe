//! Ordered predicate chain deciding whether a classified event reaches
//! subscribers.
//!
//! Evaluation order is fixed and short-circuits on the first rejection:
//! suffix denial, subscription validity, extension allow-list, ignore
//! patterns.

use crate::event::EventInfo;
use crate::subscribe::Registry;
use crate::table::WatchTable;
use crate::{Error, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::trace;

/// An ignore pattern matched against the resolved full path.
///
/// The pattern is a regex, compiled lazily the first time an event needs
/// evaluating against it. A pattern that fails to compile surfaces
/// [`Error::InvalidFilterPattern`] at that point.
#[derive(Debug, Default)]
pub struct IgnorePattern {
	source: String,
	compiled: OnceCell<Regex>,
}

impl IgnorePattern {
	pub fn new(source: impl Into<String>) -> Self {
		Self {
			source: source.into(),
			compiled: OnceCell::new(),
		}
	}

	pub fn source(&self) -> &str {
		&self.source
	}

	fn is_match(&self, haystack: &str) -> Result<bool> {
		let regex = self.compiled.get_or_try_init(|| {
			Regex::new(&self.source).map_err(|source| Error::InvalidFilterPattern {
				pattern: self.source.clone(),
				source,
			})
		})?;
		Ok(regex.is_match(haystack))
	}
}

/// Filtering configuration held by the watcher.
#[derive(Debug)]
pub struct FilterSpec {
	/// Entry-name suffixes that are never delivered. Defaults to `~` so
	/// editor backup files are skipped.
	pub deny_suffixes: Vec<String>,
	/// If non-empty, only entries with one of these extensions pass.
	pub extensions: Vec<String>,
	/// Patterns matched against the resolved full path.
	pub ignores: Vec<IgnorePattern>,
}

impl Default for FilterSpec {
	fn default() -> Self {
		Self {
			deny_suffixes: vec!["~".into()],
			extensions: Vec::new(),
			ignores: Vec::new(),
		}
	}
}

/// Run the chain. `Ok(false)` means the event is silently dropped; the
/// only error is an ignore pattern failing to compile.
pub fn should_deliver(
	info: &EventInfo,
	spec: &FilterSpec,
	registry: &Registry,
	table: &WatchTable,
) -> Result<bool> {
	// 1. Suffix rejection, on the raw entry name.
	if let Some(name) = info.entry_name() {
		let name = name.to_string_lossy();
		if spec
			.deny_suffixes
			.iter()
			.any(|suffix| name.ends_with(suffix.as_str()))
		{
			trace!(name = %name, "rejected by suffix filter");
			return Ok(false);
		}
	}

	// 2. Validity: outside wildcard mode the kind must be subscribed and
	// the handle still live.
	if !registry.watch_any() {
		if !registry.is_subscribed(info.kind()) {
			return Ok(false);
		}
		if table.resolve(info.handle()).is_none() {
			return Ok(false);
		}
	}

	// 3. Extension allow-list. The extension is the substring after the
	// final dot; a dotless name is compared whole.
	if !spec.extensions.is_empty() {
		let name = match info.entry_name() {
			Some(name) => name.to_string_lossy().into_owned(),
			None => match info.path().file_name() {
				Some(name) => name.to_string_lossy().into_owned(),
				None => return Ok(false),
			},
		};
		let extension = name.rsplit('.').next().unwrap_or(name.as_str());
		if !spec.extensions.iter().any(|e| e == extension) {
			trace!(name = %name, "rejected by extension allow-list");
			return Ok(false);
		}
	}

	// 4. Ignore patterns, against the resolved full path.
	let path = info.path().to_string_lossy();
	for pattern in &spec.ignores {
		if pattern.is_match(&path)? {
			trace!(path = %path, pattern = %pattern.source(), "rejected by ignore pattern");
			return Ok(false);
		}
	}

	Ok(true)
}
