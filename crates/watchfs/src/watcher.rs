//! Watcher orchestrator: configuration builder, start-time walk and the
//! drain-and-dispatch loop.
//!
//! Configuration is a consuming builder, so adding paths or filters
//! after `start()` is unrepresentable. `stop()` is a cancellation-token
//! cancel: idempotent, and safe to call from inside a handler while a
//! drain pass is in flight (the batch was read before dispatch; the
//! token is observed between records).

use crate::backend::Backend;
#[cfg(target_os = "linux")]
use crate::backend::InotifyBackend;
use crate::event::{classify, EventInfo, EventKind};
use crate::filter::{should_deliver, FilterSpec, IgnorePattern};
use crate::manager;
use crate::subscribe::Registry;
use crate::table::WatchTable;
use crate::Result;
use std::panic;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Not-yet-started watcher holding paths, filters and subscriptions.
pub struct Watcher {
	paths: Vec<PathBuf>,
	filter: FilterSpec,
	registry: Registry,
	token: CancellationToken,
}

impl Default for Watcher {
	fn default() -> Self {
		Self::new()
	}
}

impl Watcher {
	pub fn new() -> Self {
		Self {
			paths: Vec::new(),
			filter: FilterSpec::default(),
			registry: Registry::new(),
			token: CancellationToken::new(),
		}
	}

	/// Add a root to watch. Directories are walked recursively at start
	/// time; a plain file is registered directly.
	pub fn add_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.paths.push(path.into());
		self
	}

	/// Restrict delivery to entries with this extension. The allow-list
	/// only applies once it is non-empty.
	pub fn add_extension(mut self, extension: impl Into<String>) -> Self {
		self.filter.extensions.push(extension.into());
		self
	}

	/// Ignore events whose resolved full path matches this regex.
	pub fn ignore(mut self, pattern: impl Into<String>) -> Self {
		self.filter.ignores.push(IgnorePattern::new(pattern));
		self
	}

	/// Never deliver entries whose name ends with this suffix. `~` is
	/// denied by default.
	pub fn deny_suffix(mut self, suffix: impl Into<String>) -> Self {
		self.filter.deny_suffixes.push(suffix.into());
		self
	}

	pub fn on(mut self, kind: EventKind, handler: impl FnMut(&EventInfo) + Send + 'static) -> Self {
		self.registry.on(kind, handler);
		self
	}

	pub fn once(
		mut self,
		kind: EventKind,
		handler: impl FnMut(&EventInfo) + Send + 'static,
	) -> Self {
		self.registry.once(kind, handler);
		self
	}

	/// Subscribe to every event; switches dispatch into wildcard mode for
	/// the watcher's lifetime.
	pub fn on_any(mut self, handler: impl FnMut(&EventInfo) + Send + 'static, fire_once: bool) -> Self {
		self.registry.on_any(handler, fire_once);
		self
	}

	/// Subscribe to write-close events, the usual "file changed" signal.
	pub fn on_change(
		mut self,
		handler: impl FnMut(&EventInfo) + Send + 'static,
		fire_once: bool,
	) -> Self {
		self.registry.on_change(handler, fire_once);
		self
	}

	/// A stop control that can be captured by handlers before the watcher
	/// starts.
	pub fn control(&self) -> WatcherControl {
		WatcherControl {
			token: self.token.clone(),
		}
	}

	/// Open the backend, walk every configured root and spawn the drain
	/// loop. Must be called from within a tokio runtime. Backend or walk
	/// failure aborts the whole session before any event is delivered.
	#[cfg(target_os = "linux")]
	pub fn start(self) -> Result<WatcherHandle> {
		let backend = InotifyBackend::new()?;
		self.start_with_backend(backend)
	}

	pub(crate) fn start_with_backend<B: Backend + 'static>(
		self,
		mut backend: B,
	) -> Result<WatcherHandle> {
		let mut table = WatchTable::new();
		for path in &self.paths {
			manager::watch_recursively(&mut table, &mut backend, path)?;
		}
		info!(roots = self.paths.len(), watches = table.len(), "watcher started");

		let token = self.token;
		let task = tokio::spawn(drain_loop(
			backend,
			table,
			self.registry,
			self.filter,
			token.clone(),
		));

		Ok(WatcherHandle { token, task })
	}
}

/// One readiness wakeup at a time: take everything the backend has
/// queued, then per record, in backend order, do structural bookkeeping
/// unconditionally and only then classify, filter and dispatch.
async fn drain_loop<B: Backend>(
	mut backend: B,
	mut table: WatchTable,
	mut registry: Registry,
	filter: FilterSpec,
	token: CancellationToken,
) -> Result<()> {
	loop {
		let batch = tokio::select! {
			_ = token.cancelled() => break,
			batch = backend.next_batch() => batch?,
		};
		debug!(records = batch.len(), "drain pass");

		for raw in &batch {
			manager::on_structural_event(&mut table, &mut backend, raw)?;

			if let Some(info) = classify(raw, &table) {
				if should_deliver(&info, &filter, &registry, &table)? {
					registry.emit(&info);
				}
			}

			// A handler may have stopped us mid-batch.
			if token.is_cancelled() {
				break;
			}
		}

		if token.is_cancelled() {
			break;
		}
	}

	info!("watcher stopped");
	Ok(())
}

/// Cloneable stop control, safe to use from inside handlers.
#[derive(Clone)]
pub struct WatcherControl {
	token: CancellationToken,
}

impl WatcherControl {
	/// Request shutdown. Idempotent; a second call is a no-op.
	pub fn stop(&self) {
		self.token.cancel();
	}

	pub fn is_stopped(&self) -> bool {
		self.token.is_cancelled()
	}
}

/// Handle to a running watcher.
pub struct WatcherHandle {
	token: CancellationToken,
	task: JoinHandle<Result<()>>,
}

impl WatcherHandle {
	/// Request shutdown. Idempotent; a second call is a no-op. The
	/// backend descriptor is released when the drain task observes the
	/// cancellation and exits.
	pub fn stop(&self) {
		self.token.cancel();
	}

	pub fn is_stopped(&self) -> bool {
		self.token.is_cancelled()
	}

	pub fn control(&self) -> WatcherControl {
		WatcherControl {
			token: self.token.clone(),
		}
	}

	/// Wait for the drain task to finish, surfacing any fatal error it
	/// hit (backend read failure, invalid ignore pattern).
	pub async fn join(self) -> Result<()> {
		match self.task.await {
			Ok(result) => result,
			Err(e) if e.is_cancelled() => Ok(()),
			Err(e) => {
				error!("watcher task panicked");
				panic::resume_unwind(e.into_panic())
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backend::testing::ScriptedBackend;
	use crate::event::{mask, RawEvent};
	use std::ffi::OsString;
	use std::fs;
	use std::time::Duration;
	use tokio::sync::mpsc;
	use tokio::time::timeout;

	fn raw(handle: crate::backend::WatchHandle, mask_bits: u32, name: Option<&str>) -> RawEvent {
		RawEvent {
			handle,
			mask: mask_bits,
			name: name.map(OsString::from),
			cookie: 0,
		}
	}

	async fn recv(
		rx: &mut mpsc::UnboundedReceiver<(EventKind, PathBuf)>,
	) -> (EventKind, PathBuf) {
		timeout(Duration::from_secs(2), rx.recv())
			.await
			.expect("timed out waiting for event")
			.expect("event channel closed")
	}

	#[tokio::test]
	async fn dispatches_in_backend_order() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("a.txt"), b"x").unwrap();
		fs::write(dir.path().join("b.txt"), b"x").unwrap();

		let (feed, state, backend) = ScriptedBackend::scripted();
		let (tx, mut rx) = mpsc::unbounded_channel();

		let handle = Watcher::new()
			.add_path(dir.path())
			.on(EventKind::Create, move |info| {
				tx.send((info.kind(), info.path().to_path_buf())).unwrap();
			})
			.start_with_backend(backend)
			.unwrap();

		let root = state.lock().unwrap().handle_for(dir.path()).unwrap();
		feed.send(vec![
			raw(root, mask::CREATE, Some("a.txt")),
			raw(root, mask::CREATE, Some("b.txt")),
		])
		.unwrap();

		assert_eq!(recv(&mut rx).await.1, dir.path().join("a.txt"));
		assert_eq!(recv(&mut rx).await.1, dir.path().join("b.txt"));

		handle.stop();
		handle.join().await.unwrap();
	}

	#[tokio::test]
	async fn structural_bookkeeping_runs_even_for_filtered_records() {
		let dir = tempfile::tempdir().unwrap();

		let (feed, state, backend) = ScriptedBackend::scripted();
		let (tx, mut rx) = mpsc::unbounded_channel();

		// Only write-close is subscribed, so the directory-create record
		// below is rejected by the filter chain; its watch must appear
		// anyway.
		let handle = Watcher::new()
			.add_path(dir.path())
			.on_change(
				move |info| {
					tx.send((info.kind(), info.path().to_path_buf())).unwrap();
				},
				false,
			)
			.start_with_backend(backend)
			.unwrap();

		let root = state.lock().unwrap().handle_for(dir.path()).unwrap();
		let sub = dir.path().join("sub");
		fs::create_dir(&sub).unwrap();
		feed.send(vec![raw(root, mask::DIR_CREATE, Some("sub"))]).unwrap();

		// Synchronize on a delivered event; structural work for the same
		// batch happened before dispatch.
		fs::write(sub.join("probe.txt"), b"x").unwrap();
		feed.send(vec![raw(root, mask::CLOSE_WRITE, Some("probe"))]).unwrap();
		recv(&mut rx).await;

		assert!(state.lock().unwrap().handle_for(&sub).is_some());

		handle.stop();
		handle.join().await.unwrap();
	}

	#[tokio::test]
	async fn handler_can_stop_the_watcher_mid_batch() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("a.txt"), b"x").unwrap();

		let (feed, state, backend) = ScriptedBackend::scripted();
		let (tx, mut rx) = mpsc::unbounded_channel();

		let watcher = Watcher::new().add_path(dir.path());
		let control = watcher.control();
		let handle = watcher
			.on(EventKind::Create, move |info| {
				tx.send((info.kind(), info.path().to_path_buf())).unwrap();
				control.stop();
			})
			.start_with_backend(backend)
			.unwrap();

		let root = state.lock().unwrap().handle_for(dir.path()).unwrap();
		feed.send(vec![
			raw(root, mask::CREATE, Some("a.txt")),
			raw(root, mask::CREATE, Some("a.txt")),
		])
		.unwrap();

		recv(&mut rx).await;
		handle.join().await.unwrap();

		// The second record of the batch was never dispatched.
		assert!(rx.try_recv().is_err());
	}

	#[tokio::test]
	async fn stop_twice_is_a_noop() {
		let dir = tempfile::tempdir().unwrap();
		let (_feed, _state, backend) = ScriptedBackend::scripted();

		let handle = Watcher::new()
			.add_path(dir.path())
			.start_with_backend(backend)
			.unwrap();

		handle.stop();
		assert!(handle.is_stopped());
		handle.stop();
		assert!(handle.is_stopped());
		handle.join().await.unwrap();
	}

	#[tokio::test]
	async fn invalid_ignore_pattern_is_fatal_to_the_session() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("a.txt"), b"x").unwrap();

		let (feed, state, backend) = ScriptedBackend::scripted();

		let handle = Watcher::new()
			.add_path(dir.path())
			.ignore("(unclosed")
			.on(EventKind::Create, |_| {})
			.start_with_backend(backend)
			.unwrap();

		let root = state.lock().unwrap().handle_for(dir.path()).unwrap();
		feed.send(vec![raw(root, mask::CREATE, Some("a.txt"))]).unwrap();

		let err = handle.join().await.unwrap_err();
		assert!(matches!(err, crate::Error::InvalidFilterPattern { .. }));
	}

	#[tokio::test]
	async fn wildcard_subscription_still_gets_structural_tracking() {
		let dir = tempfile::tempdir().unwrap();

		let (feed, state, backend) = ScriptedBackend::scripted();
		let (tx, mut rx) = mpsc::unbounded_channel();

		let handle = Watcher::new()
			.add_path(dir.path())
			.on_any(
				move |info| {
					tx.send((info.kind(), info.path().to_path_buf())).unwrap();
				},
				false,
			)
			.start_with_backend(backend)
			.unwrap();

		let root = state.lock().unwrap().handle_for(dir.path()).unwrap();
		let sub = dir.path().join("sub");
		fs::create_dir(&sub).unwrap();
		feed.send(vec![raw(root, mask::DIR_CREATE, Some("sub"))]).unwrap();

		let (kind, path) = recv(&mut rx).await;
		assert_eq!(kind, EventKind::Create);
		assert_eq!(path, sub);
		assert!(state.lock().unwrap().handle_for(&sub).is_some());

		handle.stop();
		handle.join().await.unwrap();
	}
}
