//! Recursive watch lifecycle: the start-time walk and the structural
//! reactions that keep the watch table mirroring the directory tree.

use crate::backend::Backend;
use crate::event::{mask, RawEvent};
use crate::table::{PathKind, WatchTable};
use crate::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Register `root` and, if it is a directory, every subdirectory below
/// it, depth-first in pre-order. Entries already in the table are
/// skipped. Files under a watched directory are not individually
/// registered; the directory watch covers its immediate children.
///
/// The walk runs once, synchronously. Directories created while it is in
/// flight can be missed; that race is accepted, the structural handling
/// below picks up anything created afterwards.
pub fn watch_recursively<B: Backend + ?Sized>(
	table: &mut WatchTable,
	backend: &mut B,
	root: &Path,
) -> Result<()> {
	if !table.contains(root) {
		table.register(backend, root)?;
	}

	if !root.is_dir() {
		return Ok(());
	}

	let entries = match fs::read_dir(root) {
		Ok(entries) => entries,
		// The directory vanished between registration and the walk.
		Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
		Err(source) => {
			return Err(Error::Walk {
				path: root.to_path_buf(),
				source,
			})
		}
	};

	for entry in entries {
		let entry = match entry {
			Ok(entry) => entry,
			Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
			Err(source) => {
				return Err(Error::Walk {
					path: root.to_path_buf(),
					source,
				})
			}
		};

		// file_type() does not follow symlinks, so symlinked directories
		// are not descended into.
		let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
		if is_dir {
			watch_recursively(table, backend, &entry.path())?;
		}
	}

	Ok(())
}

/// Structural bookkeeping, invoked for every raw record before any
/// filtering: a directory created under a watch gets its own watch, a
/// directory deleted (or a watched path vanishing outright) releases its
/// entry.
///
/// Directory create/delete are recognized by the exact combined mask
/// (base kind + is-directory bit), never by the generic kind, so file
/// creates are not misread as structural events.
pub fn on_structural_event<B: Backend + ?Sized>(
	table: &mut WatchTable,
	backend: &mut B,
	raw: &RawEvent,
) -> Result<()> {
	if raw.mask & mask::DIR_CREATE == mask::DIR_CREATE {
		if let Some(path) = scoped_path(table, raw) {
			debug!(path = %path.display(), "directory created, extending watch");
			return watch_recursively(table, backend, &path);
		}
	} else if raw.mask & mask::DIR_DELETE == mask::DIR_DELETE {
		if let Some(path) = scoped_path(table, raw) {
			if let Some(handle) = table.handle_for(&path) {
				debug!(path = %path.display(), "directory deleted, releasing watch");
				return table.unregister(backend, handle);
			}
		}
	} else if raw.mask & (mask::DELETE_SELF | mask::IGNORED) != 0 {
		trace!(handle = ?raw.handle, "watched path vanished, releasing watch");
		return table.unregister(backend, raw.handle);
	}

	Ok(())
}

/// Full path of a directory-scoped record, when its handle still resolves.
fn scoped_path(table: &WatchTable, raw: &RawEvent) -> Option<PathBuf> {
	let watched = table.resolve(raw.handle)?;
	match (&raw.name, watched.kind) {
		(Some(name), PathKind::Directory) => Some(watched.path.join(name)),
		_ => None,
	}
}
