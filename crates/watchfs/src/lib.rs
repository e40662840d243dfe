//! Recursive filesystem-change watcher.
//!
//! Mirrors a set of root directories into a table of inotify watch
//! descriptors, keeps that table consistent as subdirectories are
//! created and removed, and dispatches classified, filtered events to
//! mask-based subscribers.
//!
//! ```no_run
//! use watchfs::Watcher;
//!
//! # async fn run() -> watchfs::Result<()> {
//! let handle = Watcher::new()
//! 	.add_path("/srv/app")
//! 	.ignore(r"\.tmp$")
//! 	.on_change(|info| println!("Changed: {}", info.path().display()), false)
//! 	.start()?;
//! handle.join().await
//! # }
//! ```

pub mod backend;
pub mod event;
pub mod filter;
pub mod manager;
pub mod subscribe;
pub mod table;
pub mod watcher;

mod error;

pub use backend::{Backend, WatchHandle};
pub use error::{Error, Result};
pub use event::{classify, EventInfo, EventKind, RawEvent};
pub use filter::{FilterSpec, IgnorePattern};
pub use subscribe::Registry;
pub use table::{PathKind, WatchTable, WatchedPath};
pub use watcher::{Watcher, WatcherControl, WatcherHandle};
