//! A versioned filesystem library backed by a bare git object store.
//!
//! `vost` treats a repository as a mapping from named refs (branches,
//! tags) to immutable snapshots of a directory tree. Every mutation
//! commits atomically and advances a branch under a compare-and-swap
//! protocol, so concurrent writers see linear history or a
//! [`StaleSnapshot`](Error::StaleSnapshot) error, never interleaving.
//!
//! # Key types
//!
//! - [`Store`] — opens (or creates) a bare repository; hands out branch,
//!   tag, and notes views, plus mirror backup/restore.
//! - [`Snapshot`] — an immutable view of one commit. Reads never change
//!   state; writes commit and return a new `Snapshot`.
//! - [`Batch`] — stages writes and removes for a single commit, with
//!   last-write-wins conflict resolution per path.
//! - [`RefMap`] — dictionary-style access to branches or tags.
//! - [`Notes`] — a per-commit annotation namespace under `refs/notes/`.
//!
//! # Quick example
//!
//! ```rust,no_run
//! use vost::{Store, OpenOptions, WriteOptions};
//!
//! let store = Store::open("/tmp/data.git", OpenOptions {
//!     create: true,
//!     branch: Some("main".into()),
//!     ..Default::default()
//! }).unwrap();
//!
//! let snap = store.branches().get("main").unwrap();
//! let snap = snap.write_text("hello.txt", "world", WriteOptions::default()).unwrap();
//! assert_eq!(snap.read_text("hello.txt").unwrap(), "world");
//!
//! // The previous snapshot still reads its own history.
//! let old = snap.back(1).unwrap();
//! assert!(!old.exists("hello.txt").unwrap());
//! ```

pub mod batch;
mod bundle;
mod commit;
mod copy;
pub mod error;
pub mod filter;
pub mod glob;
pub mod lock;
mod mirror;
pub mod notes;
pub mod path;
pub mod refs;
pub mod snapshot;
pub mod store;
pub mod stream;
mod tree;
pub mod types;

pub use batch::Batch;
pub use error::{Error, Result};
pub use filter::{ExcludeRules, PathFilter};
pub use notes::{Notes, NotesBatch};
pub use refs::RefMap;
pub use snapshot::{
    retry_write, ApplyOptions, BatchOptions, CopyOptions, CopyOutOptions, CopyRefOptions,
    DiskRemoveOptions, LogOptions, MoveOptions, RemoveOptions, Snapshot, SyncOptions,
    WriteOptions,
};
pub use store::Store;
pub use stream::{BatchWriter, SnapshotWriter};
pub use types::*;
