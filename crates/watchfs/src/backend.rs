//! Native notification backend.
//!
//! The core only depends on the [`Backend`] contract: add/remove a watch
//! and drain every queued record once the descriptor becomes readable.
//! The production implementation wraps inotify behind tokio's `AsyncFd`,
//! which is how the descriptor gets registered with the host reactor.

use crate::event::RawEvent;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Opaque, backend-assigned identifier correlating notifications to a
/// registered path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchHandle(pub(crate) i32);

#[async_trait]
pub trait Backend: Send {
	/// Start monitoring `path` for the change kinds in `mask`.
	///
	/// Registration failure (e.g. watch-limit exhaustion) is fatal to the
	/// enclosing watch-setup operation and is not retried.
	fn add_watch(&mut self, path: &Path, mask: u32) -> Result<WatchHandle>;

	/// Stop monitoring. Removing a watch the backend has already dropped
	/// on its own (vanished path) is not an error.
	fn remove_watch(&mut self, handle: WatchHandle) -> Result<()>;

	/// Wait until the backend has records queued, then return all of them
	/// in one batch, in kernel-return order.
	async fn next_batch(&mut self) -> Result<Vec<RawEvent>>;
}

#[cfg(target_os = "linux")]
pub use self::linux::InotifyBackend;

#[cfg(target_os = "linux")]
mod linux {
	use super::*;
	use inotify::{Inotify, WatchDescriptor, WatchMask};
	use std::collections::HashMap;
	use std::io;
	use tokio::io::unix::AsyncFd;
	use tracing::trace;

	/// Large enough for a full burst of records with NAME_MAX entry names.
	const EVENT_BUFFER_SIZE: usize = 8192;

	/// Production backend: an inotify instance registered with the tokio
	/// reactor for read readiness.
	pub struct InotifyBackend {
		fd: AsyncFd<Inotify>,
		descriptors: HashMap<WatchHandle, WatchDescriptor>,
		buffer: Box<[u8; EVENT_BUFFER_SIZE]>,
	}

	impl InotifyBackend {
		/// Open the inotify descriptor and register it with the reactor.
		/// Must be called from within a tokio runtime.
		pub fn new() -> Result<Self> {
			let inotify = Inotify::init().map_err(Error::Backend)?;
			Ok(Self {
				fd: AsyncFd::new(inotify).map_err(Error::Backend)?,
				descriptors: HashMap::new(),
				buffer: Box::new([0; EVENT_BUFFER_SIZE]),
			})
		}
	}

	#[async_trait]
	impl Backend for InotifyBackend {
		fn add_watch(&mut self, path: &Path, mask: u32) -> Result<WatchHandle> {
			let descriptor = self
				.fd
				.get_mut()
				.watches()
				.add(path, WatchMask::from_bits_truncate(mask))
				.map_err(Error::Backend)?;

			let handle = WatchHandle(descriptor.get_watch_descriptor_id());
			trace!(?handle, path = %path.display(), "added inotify watch");
			self.descriptors.insert(handle, descriptor);
			Ok(handle)
		}

		fn remove_watch(&mut self, handle: WatchHandle) -> Result<()> {
			let Some(descriptor) = self.descriptors.remove(&handle) else {
				return Ok(());
			};

			match self.fd.get_mut().watches().remove(descriptor) {
				Ok(()) => Ok(()),
				// EINVAL: the kernel already dropped the watch because the
				// path vanished. The IN_IGNORED record races with explicit
				// removal, so this is expected.
				Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
					trace!(?handle, "watch already removed by the kernel");
					Ok(())
				}
				Err(e) => Err(Error::Backend(e)),
			}
		}

		async fn next_batch(&mut self) -> Result<Vec<RawEvent>> {
			loop {
				let mut guard = self.fd.readable_mut().await.map_err(Error::Backend)?;

				let drained = guard.try_io(|fd| {
					let mut batch = Vec::new();
					loop {
						match fd.get_mut().read_events(&mut self.buffer[..]) {
							Ok(events) => {
								batch.extend(events.map(|event| RawEvent {
									handle: WatchHandle(event.wd.get_watch_descriptor_id()),
									mask: event.mask.bits(),
									name: event.name.map(|name| name.to_os_string()),
									cookie: event.cookie,
								}));
							}
							Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
								if batch.is_empty() {
									// Propagate so try_io clears readiness.
									return Err(e);
								}
								break;
							}
							Err(e) => return Err(e),
						}
					}
					Ok(batch)
				});

				match drained {
					Ok(Ok(batch)) => return Ok(batch),
					Ok(Err(e)) => return Err(Error::Backend(e)),
					// Readiness was spurious; wait again.
					Err(_would_block) => continue,
				}
			}
		}
	}
}
