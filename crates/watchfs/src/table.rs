//! Bidirectional map between native watch handles and filesystem paths.

use crate::backend::{Backend, WatchHandle};
use crate::event::mask;
use crate::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Whether a registered path was a file or a directory at registration
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
	File,
	Directory,
}

/// A path under watch, owned exclusively by the [`WatchTable`].
#[derive(Debug, Clone)]
pub struct WatchedPath {
	pub path: PathBuf,
	pub handle: WatchHandle,
	pub kind: PathKind,
}

/// Handle→path mapping mirrored by a path→handle index.
///
/// Every register/unregister call reaches the backend; the table never
/// holds a handle the backend does not know about (modulo the removal
/// races classified events are dropped for).
#[derive(Default)]
pub struct WatchTable {
	by_handle: HashMap<WatchHandle, WatchedPath>,
	by_path: HashMap<PathBuf, WatchHandle>,
}

impl WatchTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Ask the backend to monitor `path` for all supported change kinds
	/// and record the mapping. Backend failure is fatal and not retried.
	pub fn register<B: Backend + ?Sized>(
		&mut self,
		backend: &mut B,
		path: &Path,
	) -> Result<WatchHandle> {
		let kind = if path.is_dir() {
			PathKind::Directory
		} else {
			PathKind::File
		};

		let handle = backend.add_watch(path, mask::ALL_EVENTS)?;
		trace!(?handle, path = %path.display(), "registered watch");

		self.by_path.insert(path.to_path_buf(), handle);
		self.by_handle.insert(
			handle,
			WatchedPath {
				path: path.to_path_buf(),
				handle,
				kind,
			},
		);
		Ok(handle)
	}

	/// Stop monitoring and drop the mapping. A handle that is already
	/// absent is a no-op, not an error.
	pub fn unregister<B: Backend + ?Sized>(
		&mut self,
		backend: &mut B,
		handle: WatchHandle,
	) -> Result<()> {
		let Some(watched) = self.by_handle.remove(&handle) else {
			return Ok(());
		};

		trace!(?handle, path = %watched.path.display(), "unregistered watch");
		self.by_path.remove(&watched.path);
		backend.remove_watch(handle)
	}

	pub fn resolve(&self, handle: WatchHandle) -> Option<&WatchedPath> {
		self.by_handle.get(&handle)
	}

	pub fn handle_for(&self, path: &Path) -> Option<WatchHandle> {
		self.by_path.get(path).copied()
	}

	pub fn contains(&self, path: &Path) -> bool {
		self.by_path.contains_key(path)
	}

	pub fn len(&self) -> usize {
		self.by_handle.len()
	}

	pub fn is_empty(&self) -> bool {
		self.by_handle.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &WatchedPath> {
		self.by_handle.values()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backend::testing::ScriptedBackend;

	#[test]
	fn register_records_both_directions() {
		let dir = tempfile::tempdir().unwrap();
		let mut backend = ScriptedBackend::detached();
		let mut table = WatchTable::new();

		let handle = table.register(&mut backend, dir.path()).unwrap();

		assert!(table.contains(dir.path()));
		assert_eq!(table.handle_for(dir.path()), Some(handle));
		let watched = table.resolve(handle).unwrap();
		assert_eq!(watched.path, dir.path());
		assert_eq!(watched.kind, PathKind::Directory);
		assert_eq!(table.len(), 1);
	}

	#[test]
	fn register_classifies_files() {
		let dir = tempfile::tempdir().unwrap();
		let file = dir.path().join("f");
		std::fs::write(&file, b"x").unwrap();

		let mut backend = ScriptedBackend::detached();
		let mut table = WatchTable::new();
		let handle = table.register(&mut backend, &file).unwrap();

		assert_eq!(table.resolve(handle).unwrap().kind, PathKind::File);
	}

	#[test]
	fn unregister_reaches_backend_and_clears_both_maps() {
		let dir = tempfile::tempdir().unwrap();
		let mut backend = ScriptedBackend::detached();
		let state = backend.state();
		let mut table = WatchTable::new();

		let handle = table.register(&mut backend, dir.path()).unwrap();
		table.unregister(&mut backend, handle).unwrap();

		assert!(!table.contains(dir.path()));
		assert!(table.resolve(handle).is_none());
		assert!(table.is_empty());
		assert_eq!(state.lock().unwrap().removed, vec![handle]);
	}

	#[test]
	fn double_unregister_is_a_noop() {
		let dir = tempfile::tempdir().unwrap();
		let mut backend = ScriptedBackend::detached();
		let state = backend.state();
		let mut table = WatchTable::new();

		let handle = table.register(&mut backend, dir.path()).unwrap();
		table.unregister(&mut backend, handle).unwrap();
		table.unregister(&mut backend, handle).unwrap();

		// The second call never reached the backend.
		assert_eq!(state.lock().unwrap().removed.len(), 1);
	}
}
