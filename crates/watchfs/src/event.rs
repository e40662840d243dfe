//! Event kinds, raw notification records and event classification.
//!
//! Bit arithmetic is confined to this module: raw masks coming off the
//! backend are decoded here into [`EventKind`], and everything downstream
//! (filtering, dispatch) works with the enum.

use crate::backend::WatchHandle;
use crate::table::{PathKind, WatchTable};
use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Raw inotify mask bits.
///
/// The registration modifiers at the bottom (`ONLYDIR` and friends) are
/// passed through to the backend at watch time but never acted upon when
/// decoding events.
pub mod mask {
	pub const ACCESS: u32 = 0x0000_0001;
	pub const MODIFY: u32 = 0x0000_0002;
	pub const ATTRIB: u32 = 0x0000_0004;
	pub const CLOSE_WRITE: u32 = 0x0000_0008;
	pub const CLOSE_NOWRITE: u32 = 0x0000_0010;
	pub const OPEN: u32 = 0x0000_0020;
	pub const MOVED_FROM: u32 = 0x0000_0040;
	pub const MOVED_TO: u32 = 0x0000_0080;
	pub const CREATE: u32 = 0x0000_0100;
	pub const DELETE: u32 = 0x0000_0200;
	pub const DELETE_SELF: u32 = 0x0000_0400;
	pub const MOVE_SELF: u32 = 0x0000_0800;
	pub const UNMOUNT: u32 = 0x0000_2000;
	pub const Q_OVERFLOW: u32 = 0x0000_4000;
	pub const IGNORED: u32 = 0x0000_8000;

	pub const CLOSE: u32 = CLOSE_WRITE | CLOSE_NOWRITE;
	pub const MOVE: u32 = MOVED_FROM | MOVED_TO;
	pub const ALL_EVENTS: u32 = 0x0000_0fff;

	pub const ONLYDIR: u32 = 0x0100_0000;
	pub const DONT_FOLLOW: u32 = 0x0200_0000;
	pub const MASK_ADD: u32 = 0x2000_0000;
	pub const ISDIR: u32 = 0x4000_0000;
	pub const ONESHOT: u32 = 0x8000_0000;

	/// Bits that qualify an event without changing its kind.
	pub const MODIFIERS: u32 = ONLYDIR | DONT_FOLLOW | MASK_ADD | ISDIR | ONESHOT;

	/// Exact mask of a directory created inside a watched directory.
	pub const DIR_CREATE: u32 = CREATE | ISDIR;
	/// Exact mask of a directory deleted from a watched directory.
	pub const DIR_DELETE: u32 = DELETE | ISDIR;
}

/// A decoded change kind.
///
/// `Close`, `Move` and `All` are combined kinds: they never come off the
/// backend but can be subscribed to, matching any of their constituents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
	Access,
	Modify,
	Attrib,
	CloseWrite,
	CloseNoWrite,
	Open,
	MovedFrom,
	MovedTo,
	Create,
	Delete,
	DeleteSelf,
	MoveSelf,
	Unmount,
	QueueOverflow,
	Ignored,
	Close,
	Move,
	All,
}

impl EventKind {
	/// Decode the kind from a raw mask, ignoring modifier bits.
	///
	/// Returns `None` for masks this core does not recognize; such
	/// records are dropped by the classifier.
	pub fn from_mask(raw: u32) -> Option<Self> {
		match raw & !mask::MODIFIERS {
			mask::ACCESS => Some(Self::Access),
			mask::MODIFY => Some(Self::Modify),
			mask::ATTRIB => Some(Self::Attrib),
			mask::CLOSE_WRITE => Some(Self::CloseWrite),
			mask::CLOSE_NOWRITE => Some(Self::CloseNoWrite),
			mask::OPEN => Some(Self::Open),
			mask::MOVED_FROM => Some(Self::MovedFrom),
			mask::MOVED_TO => Some(Self::MovedTo),
			mask::CREATE => Some(Self::Create),
			mask::DELETE => Some(Self::Delete),
			mask::DELETE_SELF => Some(Self::DeleteSelf),
			mask::MOVE_SELF => Some(Self::MoveSelf),
			mask::UNMOUNT => Some(Self::Unmount),
			mask::Q_OVERFLOW => Some(Self::QueueOverflow),
			mask::IGNORED => Some(Self::Ignored),
			mask::CLOSE => Some(Self::Close),
			mask::MOVE => Some(Self::Move),
			mask::ALL_EVENTS => Some(Self::All),
			_ => None,
		}
	}

	/// The mask bits this kind corresponds to.
	pub fn mask(self) -> u32 {
		match self {
			Self::Access => mask::ACCESS,
			Self::Modify => mask::MODIFY,
			Self::Attrib => mask::ATTRIB,
			Self::CloseWrite => mask::CLOSE_WRITE,
			Self::CloseNoWrite => mask::CLOSE_NOWRITE,
			Self::Open => mask::OPEN,
			Self::MovedFrom => mask::MOVED_FROM,
			Self::MovedTo => mask::MOVED_TO,
			Self::Create => mask::CREATE,
			Self::Delete => mask::DELETE,
			Self::DeleteSelf => mask::DELETE_SELF,
			Self::MoveSelf => mask::MOVE_SELF,
			Self::Unmount => mask::UNMOUNT,
			Self::QueueOverflow => mask::Q_OVERFLOW,
			Self::Ignored => mask::IGNORED,
			Self::Close => mask::CLOSE,
			Self::Move => mask::MOVE,
			Self::All => mask::ALL_EVENTS,
		}
	}

	/// Whether a subscription for `self` covers an event of `kind`.
	pub fn matches(self, kind: EventKind) -> bool {
		match self {
			Self::All => true,
			Self::Close => matches!(kind, Self::Close | Self::CloseWrite | Self::CloseNoWrite),
			Self::Move => matches!(kind, Self::Move | Self::MovedFrom | Self::MovedTo),
			other => other == kind,
		}
	}

	pub fn name(self) -> &'static str {
		match self {
			Self::Access => "ACCESS",
			Self::Modify => "MODIFY",
			Self::Attrib => "ATTRIB",
			Self::CloseWrite => "CLOSE_WRITE",
			Self::CloseNoWrite => "CLOSE_NOWRITE",
			Self::Open => "OPEN",
			Self::MovedFrom => "MOVED_FROM",
			Self::MovedTo => "MOVED_TO",
			Self::Create => "CREATE",
			Self::Delete => "DELETE",
			Self::DeleteSelf => "DELETE_SELF",
			Self::MoveSelf => "MOVE_SELF",
			Self::Unmount => "UNMOUNT",
			Self::QueueOverflow => "Q_OVERFLOW",
			Self::Ignored => "IGNORED",
			Self::Close => "CLOSE",
			Self::Move => "MOVE",
			Self::All => "ALL_EVENTS",
		}
	}

	pub fn description(self) -> &'static str {
		match self {
			Self::Access => "File was accessed (read)",
			Self::Modify => "File was modified",
			Self::Attrib => "Metadata changed (e.g. permissions, mtime, etc.)",
			Self::CloseWrite => "File opened for writing was closed",
			Self::CloseNoWrite => "File not opened for writing was closed",
			Self::Open => "File was opened",
			Self::MovedFrom => "File moved out of watched directory",
			Self::MovedTo => "File moved into watched directory",
			Self::Create => "File or directory created in watched directory",
			Self::Delete => "File or directory deleted in watched directory",
			Self::DeleteSelf => "Watched file or directory was deleted",
			Self::MoveSelf => "Watched file or directory was moved",
			Self::Unmount => "File system containing watched object was unmounted",
			Self::QueueOverflow => "Event queue overflowed",
			Self::Ignored => "Watch was removed, explicitly or because the file vanished",
			Self::Close => "Equals CLOSE_WRITE | CLOSE_NOWRITE",
			Self::Move => "Equals MOVED_FROM | MOVED_TO",
			Self::All => "Bitmask of all event kinds",
		}
	}
}

/// An unprocessed notification record as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
	/// Watch the record was reported against.
	pub handle: WatchHandle,
	/// Raw mask: base kind bits, possibly OR-ed with the is-directory bit.
	pub mask: u32,
	/// Entry name for directory-scoped events; absent for self-targeted ones.
	pub name: Option<OsString>,
	/// Correlates MOVED_FROM/MOVED_TO pairs; not interpreted by this core.
	pub cookie: u32,
}

impl RawEvent {
	/// Whether the record targets a directory, per the mask alone.
	pub fn is_dir_mask(&self) -> bool {
		self.mask & mask::ISDIR != 0
	}
}

/// A raw event resolved against the watch table: decoded kind, full path
/// and file/directory status. Derived per record, never persisted.
#[derive(Debug, Clone)]
pub struct EventInfo {
	kind: EventKind,
	path: PathBuf,
	is_dir: bool,
	is_file: bool,
	raw: RawEvent,
}

impl EventInfo {
	pub fn kind(&self) -> EventKind {
		self.kind
	}

	/// The resolved full path: the registered path for self-targeted
	/// events, `<registered>/<name>` for directory-scoped ones.
	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn is_dir(&self) -> bool {
		self.is_dir
	}

	pub fn is_file(&self) -> bool {
		self.is_file
	}

	/// The raw entry name, when the event is directory-scoped.
	pub fn entry_name(&self) -> Option<&OsStr> {
		self.raw.name.as_deref()
	}

	pub fn handle(&self) -> WatchHandle {
		self.raw.handle
	}

	pub fn raw(&self) -> &RawEvent {
		&self.raw
	}
}

/// Resolve a raw record into an [`EventInfo`].
///
/// Returns `None` when the handle is no longer in the table (an expected
/// removal race, dropped without diagnostics) or when the mask does not
/// decode to a known kind.
pub fn classify(raw: &RawEvent, table: &WatchTable) -> Option<EventInfo> {
	let Some(watched) = table.resolve(raw.handle) else {
		trace!(handle = ?raw.handle, "dropping event for unknown watch handle");
		return None;
	};

	let kind = EventKind::from_mask(raw.mask)?;

	let path = match (&raw.name, watched.kind) {
		(Some(name), PathKind::Directory) => watched.path.join(name),
		_ => watched.path.clone(),
	};

	// A deleted entry can no longer be stat'ed; fall back to the mask's
	// is-directory bit in that case.
	let (is_dir, is_file) = match std::fs::symlink_metadata(&path) {
		Ok(meta) => (meta.is_dir(), meta.is_file()),
		Err(_) => {
			let dir = raw.is_dir_mask();
			(dir, !dir)
		}
	};

	Some(EventInfo {
		kind,
		path,
		is_dir,
		is_file,
		raw: raw.clone(),
	})
}
