use std::path::PathBuf;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Tree entry modes
// ---------------------------------------------------------------------------

/// Regular file, `0o100644`.
pub const MODE_BLOB: u32 = 0o100644;
/// Executable file, `0o100755`.
pub const MODE_EXEC: u32 = 0o100755;
/// Symbolic link, `0o120000`.
pub const MODE_LINK: u32 = 0o120000;
/// Subtree (directory), `0o040000`.
pub const MODE_TREE: u32 = 0o040000;

/// The type of a tree entry, bijective with the allowed mode set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Blob,
    Executable,
    Link,
    Tree,
}

impl FileType {
    /// Map a raw tree-entry mode to its `FileType`, or `None` for any mode
    /// outside the allowed set.
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode {
            MODE_BLOB => Some(Self::Blob),
            MODE_EXEC => Some(Self::Executable),
            MODE_LINK => Some(Self::Link),
            MODE_TREE => Some(Self::Tree),
            _ => None,
        }
    }

    /// The raw mode for this type.
    pub fn mode(self) -> u32 {
        match self {
            Self::Blob => MODE_BLOB,
            Self::Executable => MODE_EXEC,
            Self::Link => MODE_LINK,
            Self::Tree => MODE_TREE,
        }
    }

    /// Regular file (blob or executable).
    pub fn is_file(self) -> bool {
        matches!(self, Self::Blob | Self::Executable)
    }

    pub fn is_dir(self) -> bool {
        matches!(self, Self::Tree)
    }

    pub fn is_link(self) -> bool {
        matches!(self, Self::Link)
    }
}

// ---------------------------------------------------------------------------
// Walk records
// ---------------------------------------------------------------------------

/// One tree entry as returned by listing and walking operations.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Entry basename.
    pub name: String,
    /// Object id of the entry.
    pub id: git2::Oid,
    /// Raw tree-entry mode.
    pub mode: u32,
}

impl TreeEntry {
    /// The parsed [`FileType`], or `None` for a mode outside the allowed set.
    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_mode(self.mode)
    }
}

/// One directory visited by [`Snapshot::walk_dirs`](crate::Snapshot::walk_dirs):
/// the directory path, its subdirectory names, and its non-directory entries.
#[derive(Debug, Clone)]
pub struct DirListing {
    /// Directory path relative to the walk root (empty for the root itself).
    pub path: String,
    /// Names of immediate subdirectories.
    pub dirs: Vec<String>,
    /// Immediate non-directory entries.
    pub files: Vec<TreeEntry>,
}

/// Single-call metadata projection for a path, shaped for filesystem
/// front-ends (`getattr`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stat {
    /// Raw tree-entry mode.
    pub mode: u32,
    /// Parsed file type.
    pub file_type: FileType,
    /// Blob size in bytes; 0 for directories.
    pub size: u64,
    /// 40-char hex id of the object.
    pub id: String,
    /// 1 for leaves, `2 + subdirectory count` for directories.
    pub nlink: u32,
    /// Commit timestamp, seconds since the Unix epoch.
    pub mtime: u64,
}

// ---------------------------------------------------------------------------
// WriteEntry
// ---------------------------------------------------------------------------

/// Caller-supplied content for a multi-path [`apply`](crate::Snapshot::apply).
#[derive(Debug, Clone)]
pub enum WriteEntry {
    /// File content with an explicit mode ([`MODE_BLOB`] or [`MODE_EXEC`]).
    Data { bytes: Vec<u8>, mode: u32 },
    /// Symbolic link; the target string becomes the blob content.
    Symlink { target: String },
}

impl WriteEntry {
    /// A regular file entry.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Data {
            bytes: bytes.into(),
            mode: MODE_BLOB,
        }
    }

    /// A regular file entry from UTF-8 text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::from_bytes(text.into().into_bytes())
    }

    /// An executable file entry.
    pub fn executable(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Data {
            bytes: bytes.into(),
            mode: MODE_EXEC,
        }
    }

    /// A symlink entry.
    pub fn symlink(target: impl Into<String>) -> Self {
        Self::Symlink {
            target: target.into(),
        }
    }

    /// The tree-entry mode this entry will be stored with.
    pub fn mode(&self) -> u32 {
        match self {
            Self::Data { mode, .. } => *mode,
            Self::Symlink { .. } => MODE_LINK,
        }
    }

    /// The blob content this entry will be stored as.
    pub fn content(&self) -> &[u8] {
        match self {
            Self::Data { bytes, .. } => bytes,
            Self::Symlink { target } => target.as_bytes(),
        }
    }

    /// Reject entries whose mode falls outside the allowed file modes.
    pub fn validate(&self) -> crate::error::Result<()> {
        match self {
            Self::Data { mode, .. } if *mode != MODE_BLOB && *mode != MODE_EXEC => {
                Err(crate::error::Error::invalid_path(format!(
                    "unsupported file mode: {:#o}",
                    mode
                )))
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Change reports
// ---------------------------------------------------------------------------

/// One file touched by a copy, sync, or remove operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// Repository-relative path.
    pub path: String,
    /// Type of the entry.
    pub file_type: FileType,
    /// Disk-side path, when the operation crossed the disk boundary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<PathBuf>,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, file_type: FileType) -> Self {
        Self {
            path: path.into(),
            file_type,
            src: None,
        }
    }

    pub fn with_src(
        path: impl Into<String>,
        file_type: FileType,
        src: impl Into<PathBuf>,
    ) -> Self {
        Self {
            path: path.into(),
            file_type,
            src: Some(src.into()),
        }
    }
}

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Add,
    Update,
    Delete,
}

/// A `(kind, path)` pair; [`ChangeReport::actions`] returns these sorted by
/// path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeAction {
    pub kind: ChangeKind,
    pub path: String,
}

/// A per-path failure recorded while an operation kept going.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeError {
    pub path: String,
    pub error: String,
}

/// Outcome summary of a copy, sync, or remove operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeReport {
    /// Newly created entries.
    pub add: Vec<FileEntry>,
    /// Entries whose content or mode changed.
    pub update: Vec<FileEntry>,
    /// Removed entries.
    pub delete: Vec<FileEntry>,
    /// Per-path failures (the operation continued past them).
    pub errors: Vec<ChangeError>,
    /// Non-fatal notes, e.g. skipped unreadable subtrees.
    pub warnings: Vec<String>,
}

impl ChangeReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when the operation changed nothing.
    pub fn in_sync(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// Count of add + update + delete entries.
    pub fn total(&self) -> usize {
        self.add.len() + self.update.len() + self.delete.len()
    }

    /// All changes as `(kind, path)` pairs, sorted by path.
    pub fn actions(&self) -> Vec<ChangeAction> {
        let mut out: Vec<ChangeAction> = Vec::with_capacity(self.total());
        let tagged = [
            (ChangeKind::Add, &self.add),
            (ChangeKind::Update, &self.update),
            (ChangeKind::Delete, &self.delete),
        ];
        for (kind, entries) in tagged {
            out.extend(entries.iter().map(|fe| ChangeAction {
                kind,
                path: fe.path.clone(),
            }));
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        out
    }
}

// ---------------------------------------------------------------------------
// Commits, signatures, reflog
// ---------------------------------------------------------------------------

/// Author/committer identity applied to every commit the store creates.
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            name: "vost".into(),
            email: "vost@localhost".into(),
        }
    }
}

/// Commit projection returned by [`log`](crate::Snapshot::log).
#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    /// 40-char hex commit id.
    pub id: String,
    /// Commit message.
    pub message: String,
    /// Author timestamp, seconds since the Unix epoch.
    pub time: u64,
    pub author_name: String,
    pub author_email: String,
}

/// One recorded branch movement.
#[derive(Debug, Clone)]
pub struct ReflogEntry {
    /// Previous target (all zeros for ref creation).
    pub old_id: String,
    /// New target.
    pub new_id: String,
    /// Committer identity, `Name <email>`.
    pub committer: String,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// Reflog message (e.g. `commit: write: a.txt`).
    pub message: String,
}

// ---------------------------------------------------------------------------
// Mirror types
// ---------------------------------------------------------------------------

/// One ref difference between two object stores. An absent `old_id` means
/// the ref would be created; an absent `new_id` means it would be deleted.
#[derive(Debug, Clone, Serialize)]
pub struct RefChange {
    pub ref_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_id: Option<String>,
}

/// Ref-level difference summary computed by backup/restore.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MirrorDiff {
    pub add: Vec<RefChange>,
    pub update: Vec<RefChange>,
    pub delete: Vec<RefChange>,
}

impl MirrorDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_sync(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    pub fn total(&self) -> usize {
        self.add.len() + self.update.len() + self.delete.len()
    }
}

// ---------------------------------------------------------------------------
// Option structs
// ---------------------------------------------------------------------------

/// Options for [`Store::open`](crate::Store::open).
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Create the repository if it does not exist.
    pub create: bool,
    /// Branch to initialize on creation.
    pub branch: Option<String>,
    /// Override the default author name.
    pub author: Option<String>,
    /// Override the default author email.
    pub email: Option<String>,
}

/// Options for [`Store::backup`](crate::Store::backup).
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Compute the diff without pushing.
    pub dry_run: bool,
    /// Restrict to these refs (short names like `main` or full names like
    /// `refs/heads/main`). Disables remote-side deletes.
    pub refs: Option<Vec<String>>,
    /// Force bundle output regardless of the destination extension.
    pub bundle: bool,
}

/// Options for [`Store::restore`](crate::Store::restore).
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Compute the diff without fetching.
    pub dry_run: bool,
    /// Restrict to these refs (short or full names).
    pub refs: Option<Vec<String>>,
    /// Force bundle input regardless of the source extension.
    pub bundle: bool,
}
