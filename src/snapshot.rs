use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

use git2::Oid;

use crate::batch::Batch;
use crate::commit;
use crate::error::{Error, Result};
use crate::filter::PathFilter;
use crate::path;
use crate::store::StoreInner;
use crate::stream::SnapshotWriter;
use crate::tree::{self, Stage};
use crate::types::{
    ChangeReport, CommitInfo, DirListing, FileEntry, FileType, Stat, TreeEntry, WriteEntry,
    MODE_BLOB, MODE_LINK, MODE_TREE,
};

// ---------------------------------------------------------------------------
// Option structs
// ---------------------------------------------------------------------------

/// Options for the single-path write methods.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Commit message; auto-generated when `None`.
    pub message: Option<String>,
    /// Tree-entry mode override; detected or defaulted when `None`.
    pub mode: Option<u32>,
}

/// Options for [`Snapshot::apply`].
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Commit message; auto-generated when `None`.
    pub message: Option<String>,
    /// Verb used in the auto-generated message (default `apply`).
    pub operation: Option<String>,
}

/// Options for [`Snapshot::batch`].
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Commit message; auto-generated when `None`.
    pub message: Option<String>,
    /// Verb used in the auto-generated message (default `batch`).
    pub operation: Option<String>,
}

/// Options for [`Snapshot::remove`].
#[derive(Debug, Clone, Default)]
pub struct RemoveOptions {
    /// Allow removing directories with their contents.
    pub recursive: bool,
    /// Report what would change without committing.
    pub dry_run: bool,
    /// Commit message; auto-generated when `None`.
    pub message: Option<String>,
}

/// Options for [`Snapshot::move_paths`].
#[derive(Debug, Clone, Default)]
pub struct MoveOptions {
    /// Allow moving directories with their contents.
    pub recursive: bool,
    /// Report what would change without committing.
    pub dry_run: bool,
    /// Commit message; auto-generated when `None`.
    pub message: Option<String>,
}

/// Options for [`Snapshot::copy_in`].
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Glob patterns a path must match to be copied; `None` admits all.
    pub include: Option<Vec<String>>,
    /// Gitignore-style exclude patterns.
    pub exclude: Option<Vec<String>>,
    /// File of additional exclude patterns, one per line.
    pub exclude_from: Option<std::path::PathBuf>,
    /// Commit message; auto-generated when `None`.
    pub message: Option<String>,
    /// Report what would change without committing.
    pub dry_run: bool,
    /// Skip files whose blob id and mode already match (default `true`).
    pub checksum: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            include: None,
            exclude: None,
            exclude_from: None,
            message: None,
            dry_run: false,
            checksum: true,
        }
    }
}

/// Options for [`Snapshot::copy_out`].
#[derive(Debug, Clone, Default)]
pub struct CopyOutOptions {
    /// Glob patterns a path must match to be exported; `None` admits all.
    pub include: Option<Vec<String>>,
    /// Gitignore-style exclude patterns.
    pub exclude: Option<Vec<String>>,
    /// File of additional exclude patterns, one per line.
    pub exclude_from: Option<std::path::PathBuf>,
}

/// Options for [`Snapshot::sync_in`] and [`Snapshot::sync_out`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Glob patterns a path must match to be synced; `None` admits all.
    pub include: Option<Vec<String>>,
    /// Gitignore-style exclude patterns.
    pub exclude: Option<Vec<String>>,
    /// File of additional exclude patterns, one per line.
    pub exclude_from: Option<std::path::PathBuf>,
    /// Commit message (`sync_in` only); auto-generated when `None`.
    pub message: Option<String>,
    /// Report what would change without touching anything.
    pub dry_run: bool,
    /// Skip unchanged files by blob id and mode (default `true`).
    pub checksum: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            include: None,
            exclude: None,
            exclude_from: None,
            message: None,
            dry_run: false,
            checksum: true,
        }
    }
}

/// Options for [`Snapshot::remove_from_disk`].
#[derive(Debug, Clone, Default)]
pub struct DiskRemoveOptions {
    /// Glob patterns a path must match to be deleted; `None` admits all.
    pub include: Option<Vec<String>>,
    /// Gitignore-style exclude patterns.
    pub exclude: Option<Vec<String>>,
}

/// Options for [`Snapshot::copy_ref`].
#[derive(Debug, Clone, Default)]
pub struct CopyRefOptions {
    /// Also remove destination entries absent from the source.
    pub delete: bool,
    /// Report what would change without committing.
    pub dry_run: bool,
    /// Commit message; auto-generated when `None`.
    pub message: Option<String>,
}

/// Filters for [`Snapshot::log`]; all combine with AND.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Stop after this many entries.
    pub limit: Option<usize>,
    /// Discard the first N matching entries.
    pub skip: Option<usize>,
    /// Only commits where this path's entry differs from the parent's.
    pub path: Option<String>,
    /// fnmatch pattern the commit message must match.
    pub match_pattern: Option<String>,
    /// Only commits with author time at or before this epoch second.
    pub before: Option<u64>,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// An immutable snapshot of a committed tree.
///
/// Reads never change state. Write methods require a writable (branch-bound)
/// snapshot, commit atomically, and return a **new** `Snapshot`; the
/// receiver keeps observing its original content forever. Clones are cheap
/// and share the repository handle.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub(crate) inner: Arc<StoreInner>,
    pub(crate) commit_id: Option<Oid>,
    pub(crate) tree_id: Option<Oid>,
    pub(crate) ref_name: Option<String>,
    pub(crate) writable: bool,
    pub(crate) changes: Option<ChangeReport>,
}

impl Snapshot {
    pub(crate) fn with_repo<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&git2::Repository) -> Result<T>,
    {
        let repo = self
            .inner
            .repo
            .lock()
            .map_err(|e| Error::git_msg(e.to_string()))?;
        f(&repo)
    }

    fn require_tree(&self) -> Result<Oid> {
        self.tree_id
            .ok_or_else(|| Error::not_found("snapshot has no tree"))
    }

    pub(crate) fn require_writable(&self, verb: &str) -> Result<&str> {
        if !self.writable {
            return Err(Error::permission_denied(match &self.ref_name {
                Some(name) => format!("cannot {} read-only snapshot of {:?}", verb, name),
                None => format!("cannot {} detached snapshot", verb),
            }));
        }
        self.ref_name.as_deref().ok_or_else(|| {
            Error::permission_denied(format!("cannot {} snapshot without a branch", verb))
        })
    }

    fn with_commit<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&git2::Commit<'_>) -> Result<T>,
    {
        let id = self
            .commit_id
            .ok_or_else(|| Error::not_found("snapshot has no commit"))?;
        self.with_repo(|repo| {
            let commit = repo.find_commit(id).map_err(Error::git)?;
            f(&commit)
        })
    }

    /// Write a blob and return its staged placement.
    pub(crate) fn stage_blob(&self, data: &[u8], mode: u32) -> Result<Stage> {
        self.with_repo(|repo| {
            let id = repo.blob(data).map_err(Error::git)?;
            Ok(Stage { id, mode })
        })
    }

    // -- Identity -----------------------------------------------------------

    /// 40-char hex id of this snapshot's commit, or `None` for an empty
    /// snapshot.
    pub fn commit_hash(&self) -> Option<String> {
        self.commit_id.map(|id| id.to_string())
    }

    /// 40-char hex id of the root tree, or `None` for an empty snapshot.
    pub fn tree_hash(&self) -> Option<String> {
        self.tree_id.map(|id| id.to_string())
    }

    /// The branch or tag name, or `None` for a detached snapshot.
    pub fn ref_name(&self) -> Option<&str> {
        self.ref_name.as_deref()
    }

    /// Whether write methods are available (branch snapshots only).
    pub fn writable(&self) -> bool {
        self.writable
    }

    /// The change report attached by the copy/sync/remove operation that
    /// produced this snapshot, if any.
    pub fn changes(&self) -> Option<&ChangeReport> {
        self.changes.as_ref()
    }

    /// The commit message, without trailing newline.
    pub fn message(&self) -> Result<String> {
        self.with_commit(|c| Ok(c.message().unwrap_or_default().trim_end_matches('\n').into()))
    }

    /// Commit author time, seconds since the Unix epoch.
    pub fn time(&self) -> Result<u64> {
        self.with_commit(|c| Ok(c.time().seconds().max(0) as u64))
    }

    pub fn author_name(&self) -> Result<String> {
        self.with_commit(|c| Ok(c.author().name().unwrap_or_default().to_string()))
    }

    pub fn author_email(&self) -> Result<String> {
        self.with_commit(|c| Ok(c.author().email().unwrap_or_default().to_string()))
    }

    // -- Reads ----------------------------------------------------------------

    /// Whole-file read as bytes.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        let norm = path::normalize(path)?;
        let root = self.require_tree()?;
        self.with_repo(|repo| tree::blob_at(repo, root, &norm))
    }

    /// Whole-file read as UTF-8 text.
    pub fn read_text(&self, path: &str) -> Result<String> {
        String::from_utf8(self.read(path)?)
            .map_err(|e| Error::git_msg(format!("not valid UTF-8: {}", e)))
    }

    /// Read `size` bytes (or the remainder) starting at `offset`. The range
    /// is clamped to the blob length, so over-long requests are not errors.
    pub fn read_range(&self, path: &str, offset: usize, size: Option<usize>) -> Result<Vec<u8>> {
        let data = self.read(path)?;
        Ok(clamp_range(&data, offset, size).to_vec())
    }

    /// Read a blob directly by its 40-hex id, bypassing tree traversal.
    /// The stat-then-read pattern for filesystem front-ends.
    pub fn read_by_hash(
        &self,
        hash: &str,
        offset: usize,
        size: Option<usize>,
    ) -> Result<Vec<u8>> {
        path::validate_hash(hash)?;
        let id = Oid::from_str(hash).map_err(|_| Error::invalid_hash(hash))?;
        self.with_repo(|repo| {
            let blob = repo.find_blob(id).map_err(|_| Error::not_found(hash))?;
            Ok(clamp_range(blob.content(), offset, size).to_vec())
        })
    }

    /// Entry names in the directory at `path` (`""` for the root).
    pub fn ls(&self, path: &str) -> Result<Vec<String>> {
        Ok(self.listdir(path)?.into_iter().map(|e| e.name).collect())
    }

    /// Entries (name, id, mode) in the directory at `path`.
    pub fn listdir(&self, path: &str) -> Result<Vec<TreeEntry>> {
        let norm = path::normalize(path)?;
        let root = self.require_tree()?;
        self.with_repo(|repo| tree::entries_at(repo, root, &norm))
    }

    /// Every non-directory leaf under `path`, as `(relative path, entry)`
    /// pairs in depth-first pre-order. Directory entries are not emitted.
    pub fn walk(&self, path: &str) -> Result<Vec<(String, TreeEntry)>> {
        let norm = path::normalize(path)?;
        let root = self.require_tree()?;
        self.with_repo(|repo| {
            let subtree = tree::tree_at(repo, root, &norm)?;
            tree::walk(repo, subtree)
        })
    }

    /// os.walk-style traversal: one [`DirListing`] per directory under
    /// `path`, with paths rooted at `path`.
    pub fn walk_dirs(&self, path: &str) -> Result<Vec<DirListing>> {
        let norm = path::normalize(path)?;
        let root = self.require_tree()?;
        self.with_repo(|repo| {
            let subtree = tree::tree_at(repo, root, &norm)?;
            let mut listings = tree::walk_dirs(repo, subtree)?;
            if !norm.is_empty() {
                for listing in &mut listings {
                    listing.path = if listing.path.is_empty() {
                        norm.clone()
                    } else {
                        format!("{}/{}", norm, listing.path)
                    };
                }
            }
            Ok(listings)
        })
    }

    /// Whether `path` exists. Never fails for well-formed paths; the root
    /// always exists.
    pub fn exists(&self, path: &str) -> Result<bool> {
        let norm = path::normalize(path)?;
        let root = self.require_tree()?;
        self.with_repo(|repo| Ok(tree::entry_at(repo, root, &norm)?.is_some()))
    }

    /// Whether `path` is a directory; `false` for absent paths.
    pub fn is_dir(&self, path: &str) -> Result<bool> {
        let norm = path::normalize(path)?;
        let root = self.require_tree()?;
        self.with_repo(|repo| {
            Ok(matches!(
                tree::entry_at(repo, root, &norm)?,
                Some((_, mode)) if mode == MODE_TREE
            ))
        })
    }

    /// The [`FileType`] at `path`.
    pub fn file_type(&self, path: &str) -> Result<FileType> {
        let (_, mode) = self.entry_or_not_found(path)?;
        FileType::from_mode(mode)
            .ok_or_else(|| Error::git_msg(format!("unknown mode {:#o} at {:?}", mode, path)))
    }

    /// Blob size in bytes at `path`; directories are an error.
    pub fn size(&self, path: &str) -> Result<u64> {
        let (id, mode) = self.entry_or_not_found(path)?;
        if mode == MODE_TREE {
            return Err(Error::is_a_directory(path));
        }
        self.with_repo(|repo| {
            let blob = repo.find_blob(id).map_err(Error::git)?;
            Ok(blob.size() as u64)
        })
    }

    /// 40-char hex id of the object at `path` (blob or tree).
    pub fn object_hash(&self, path: &str) -> Result<String> {
        let (id, _) = self.entry_or_not_found(path)?;
        Ok(id.to_string())
    }

    /// The target of the symlink at `path`.
    pub fn readlink(&self, path: &str) -> Result<String> {
        let (id, mode) = self.entry_or_not_found(path)?;
        if mode != MODE_LINK {
            return Err(Error::invalid_path(format!("{} is not a symlink", path)));
        }
        self.with_repo(|repo| {
            let blob = repo.find_blob(id).map_err(Error::git)?;
            String::from_utf8(blob.content().to_vec())
                .map_err(|e| Error::git_msg(format!("symlink target not UTF-8: {}", e)))
        })
    }

    /// Mode, type, size, id, nlink, and mtime in one call (`""` for the
    /// root). The hot path for `getattr`-style consumers.
    pub fn stat(&self, path: &str) -> Result<Stat> {
        let norm = path::normalize(path)?;
        let root = self.require_tree()?;
        let mtime = self.time()?;

        self.with_repo(|repo| {
            let (id, mode) = tree::entry_at(repo, root, &norm)?
                .ok_or_else(|| Error::not_found(&norm))?;
            let file_type = FileType::from_mode(mode)
                .ok_or_else(|| Error::git_msg(format!("unknown mode {:#o} at {:?}", mode, norm)))?;

            if mode == MODE_TREE {
                Ok(Stat {
                    mode,
                    file_type,
                    size: 0,
                    id: id.to_string(),
                    nlink: 2 + tree::subdir_count(repo, id)?,
                    mtime,
                })
            } else {
                let blob = repo.find_blob(id).map_err(Error::git)?;
                Ok(Stat {
                    mode,
                    file_type,
                    size: blob.size() as u64,
                    id: id.to_string(),
                    nlink: 1,
                    mtime,
                })
            }
        })
    }

    fn entry_or_not_found(&self, path: &str) -> Result<(Oid, u32)> {
        let norm = path::normalize(path)?;
        let root = self.require_tree()?;
        self.with_repo(|repo| {
            tree::entry_at(repo, root, &norm)?.ok_or_else(|| Error::not_found(&norm))
        })
    }

    // -- Glob -----------------------------------------------------------------

    /// Expand a glob pattern, sorted. Segments support `*`, `?`, and `[...]`;
    /// a `**` segment spans zero or more directory levels (never descending
    /// into dot-directories). The final segment matches leaves only.
    pub fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let mut out = self.iglob(pattern)?;
        out.sort();
        Ok(out)
    }

    /// Like [`glob`](Self::glob) but in traversal order, skipping the sort.
    pub fn iglob(&self, pattern: &str) -> Result<Vec<String>> {
        let root = self.require_tree()?;
        let trimmed = pattern.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        let segments: Vec<&str> = trimmed.split('/').collect();

        self.with_repo(|repo| {
            let mut raw = Vec::new();
            glob_walk(repo, root, &segments, "", &mut raw)?;
            let mut seen = HashSet::new();
            raw.retain(|p| seen.insert(p.clone()));
            Ok(raw)
        })
    }

    // -- Writes -----------------------------------------------------------------

    /// Write `data` to `path` in one commit, returning the new snapshot.
    pub fn write(&self, path: &str, data: &[u8], opts: WriteOptions) -> Result<Snapshot> {
        let norm = path::normalize(path)?;
        if norm.is_empty() {
            return Err(Error::invalid_path("cannot write to the root"));
        }
        let mode = opts.mode.unwrap_or(MODE_BLOB);
        let message = opts
            .message
            .unwrap_or_else(|| format!("write: {}", norm));
        let stage = self.stage_blob(data, mode)?;
        commit::advance(self, &[(norm, stage)], &[], &message)
    }

    /// Write UTF-8 text to `path` in one commit.
    pub fn write_text(&self, path: &str, text: &str, opts: WriteOptions) -> Result<Snapshot> {
        self.write(path, text.as_bytes(), opts)
    }

    /// Import one disk file to `path`, detecting executable/symlink modes
    /// unless `opts.mode` overrides.
    pub fn write_from_file(&self, path: &str, src: &Path, opts: WriteOptions) -> Result<Snapshot> {
        let mode = match opts.mode {
            Some(m) => m,
            None => tree::mode_from_disk(src)?,
        };
        let data = if mode == MODE_LINK {
            let target = std::fs::read_link(src).map_err(|e| Error::io_at(src, e))?;
            target.to_string_lossy().into_owned().into_bytes()
        } else {
            std::fs::read(src).map_err(|e| Error::io_at(src, e))?
        };
        self.write(
            path,
            &data,
            WriteOptions {
                mode: Some(mode),
                ..opts
            },
        )
    }

    /// Create a symlink at `path` whose blob content is the target string.
    pub fn write_symlink(&self, path: &str, target: &str, opts: WriteOptions) -> Result<Snapshot> {
        let norm = path::normalize(path)?;
        if norm.is_empty() {
            return Err(Error::invalid_path("cannot write to the root"));
        }
        let message = opts
            .message
            .unwrap_or_else(|| format!("symlink: {}", norm));
        let stage = self.stage_blob(target.as_bytes(), MODE_LINK)?;
        commit::advance(self, &[(norm, stage)], &[], &message)
    }

    /// The atomic multi-path primitive: apply every write and remove in one
    /// commit. The caller guarantees at most one action per path.
    pub fn apply(
        &self,
        entries: &[(&str, WriteEntry)],
        removes: &[&str],
        opts: ApplyOptions,
    ) -> Result<Snapshot> {
        let mut writes = Vec::with_capacity(entries.len());
        for (path, entry) in entries {
            entry.validate()?;
            let norm = path::normalize(path)?;
            if norm.is_empty() {
                return Err(Error::invalid_path("cannot write to the root"));
            }
            let stage = self.stage_blob(entry.content(), entry.mode())?;
            writes.push((norm, stage));
        }

        let mut staged_removes = Vec::with_capacity(removes.len());
        for path in removes {
            let norm = path::normalize(path)?;
            if norm.is_empty() {
                return Err(Error::invalid_path("cannot remove the root"));
            }
            staged_removes.push(norm);
        }

        let op = opts.operation.as_deref().unwrap_or("apply");
        let message = opts.message.unwrap_or_else(|| {
            format!(
                "{}: {} write(s), {} remove(s)",
                op,
                writes.len(),
                staged_removes.len()
            )
        });
        commit::advance(self, &writes, &staged_removes, &message)
    }

    /// A [`Batch`] accumulating writes and removes for one commit.
    pub fn batch(&self, opts: BatchOptions) -> Batch {
        Batch::new(self.clone(), opts.message, opts.operation)
    }

    /// A buffered [`SnapshotWriter`] that commits a single write on close.
    pub fn writer(&self, path: &str) -> Result<SnapshotWriter> {
        self.require_writable("write through")?;
        let norm = path::normalize(path)?;
        Ok(SnapshotWriter::new(self.clone(), norm))
    }

    /// Remove files (and, with `recursive`, directories) in one commit.
    /// Fails `NotFound` when any source is absent. With `dry_run` the
    /// returned snapshot is this one, carrying the would-be change report.
    pub fn remove(&self, sources: &[&str], opts: RemoveOptions) -> Result<Snapshot> {
        self.require_writable("remove from")?;
        let root = self.require_tree()?;

        let mut removes: Vec<String> = Vec::new();
        let mut report = ChangeReport::new();

        self.with_repo(|repo| {
            for src in sources {
                let norm = path::normalize(src)?;
                if norm.is_empty() {
                    return Err(Error::invalid_path("cannot remove the root"));
                }
                let (id, mode) = tree::entry_at(repo, root, &norm)?
                    .ok_or_else(|| Error::not_found(&norm))?;

                if mode == MODE_TREE {
                    if !opts.recursive {
                        return Err(Error::is_a_directory(&norm));
                    }
                    // One staged remove drops the whole subtree; the report
                    // still lists each leaf.
                    for (rel, entry) in tree::walk(repo, id)? {
                        let ft = entry.file_type().unwrap_or(FileType::Blob);
                        report
                            .delete
                            .push(FileEntry::new(format!("{}/{}", norm, rel), ft));
                    }
                    removes.push(norm);
                } else {
                    let ft = FileType::from_mode(mode).unwrap_or(FileType::Blob);
                    report.delete.push(FileEntry::new(&norm, ft));
                    removes.push(norm);
                }
            }
            Ok(())
        })?;

        if opts.dry_run || removes.is_empty() {
            let mut snap = self.clone();
            snap.changes = Some(report);
            return Ok(snap);
        }

        let message = opts
            .message
            .unwrap_or_else(|| format!("remove: {} path(s)", sources.len()));
        let mut next = commit::advance(self, &[], &removes, &message)?;
        next.changes = Some(report);
        Ok(next)
    }

    /// Rename `src` to `dest` in one commit. Directories move with all
    /// their leaves; neither endpoint may be the root.
    pub fn rename(&self, src: &str, dest: &str, opts: WriteOptions) -> Result<Snapshot> {
        self.require_writable("rename in")?;
        let src_norm = path::normalize(src)?;
        let dest_norm = path::normalize(dest)?;
        if src_norm.is_empty() || dest_norm.is_empty() {
            return Err(Error::invalid_path("cannot rename to or from the root"));
        }

        let root = self.require_tree()?;
        let (writes, removes) = self.with_repo(|repo| {
            let (id, mode) = tree::entry_at(repo, root, &src_norm)?
                .ok_or_else(|| Error::not_found(&src_norm))?;

            let mut writes = Vec::new();
            if mode == MODE_TREE {
                for (rel, entry) in tree::walk(repo, id)? {
                    writes.push((
                        format!("{}/{}", dest_norm, rel),
                        Stage {
                            id: entry.id,
                            mode: entry.mode,
                        },
                    ));
                }
            } else {
                writes.push((dest_norm.clone(), Stage { id, mode }));
            }
            Ok((writes, vec![src_norm.clone()]))
        })?;

        let message = opts
            .message
            .unwrap_or_else(|| format!("rename: {} -> {}", src_norm, dest_norm));
        commit::advance(self, &writes, &removes, &message)
    }

    /// POSIX `mv`: move sources into an existing directory, or rename a
    /// single source. Multiple sources require a directory destination.
    pub fn move_paths(&self, sources: &[&str], dest: &str, opts: MoveOptions) -> Result<Snapshot> {
        self.require_writable("move in")?;
        let root = self.require_tree()?;
        let dest_norm = path::normalize(dest)?;

        let dest_is_dir = self.with_repo(|repo| {
            Ok(matches!(
                tree::entry_at(repo, root, &dest_norm)?,
                Some((_, mode)) if mode == MODE_TREE
            ))
        })?;
        if sources.len() > 1 && !dest_is_dir {
            return Err(Error::not_a_directory(&dest_norm));
        }

        let mut writes: Vec<(String, Stage)> = Vec::new();
        let mut removes: Vec<String> = Vec::new();

        self.with_repo(|repo| {
            for src in sources {
                let src_norm = path::normalize(src)?;
                if src_norm.is_empty() {
                    return Err(Error::invalid_path("cannot move the root"));
                }
                let (id, mode) = tree::entry_at(repo, root, &src_norm)?
                    .ok_or_else(|| Error::not_found(&src_norm))?;

                let target = if dest_is_dir {
                    let base = src_norm.rsplit('/').next().unwrap_or(&src_norm);
                    tree::join(&dest_norm, base)
                } else {
                    dest_norm.clone()
                };

                if mode == MODE_TREE {
                    if !opts.recursive {
                        return Err(Error::is_a_directory(&src_norm));
                    }
                    for (rel, entry) in tree::walk(repo, id)? {
                        writes.push((
                            format!("{}/{}", target, rel),
                            Stage {
                                id: entry.id,
                                mode: entry.mode,
                            },
                        ));
                    }
                } else {
                    writes.push((target, Stage { id, mode }));
                }
                removes.push(src_norm);
            }
            Ok(())
        })?;

        if opts.dry_run || (writes.is_empty() && removes.is_empty()) {
            return Ok(self.clone());
        }

        let message = opts
            .message
            .unwrap_or_else(|| format!("move: {} source(s)", sources.len()));
        commit::advance(self, &writes, &removes, &message)
    }

    /// Copy paths from another snapshot of the same repository into this
    /// branch, staging by object id. Source paths follow rsync conventions:
    /// `"dir"` copies the directory itself, `"dir/"` pours its contents,
    /// `""` pours the root. With `opts.delete`, destination entries absent
    /// from the source are removed.
    pub fn copy_ref(
        &self,
        source: &Snapshot,
        sources: &[&str],
        dest: &str,
        opts: CopyRefOptions,
    ) -> Result<Snapshot> {
        self.require_writable("copy into")?;

        let same_store = Arc::ptr_eq(&self.inner, &source.inner) || {
            let a = std::fs::canonicalize(&self.inner.path).ok();
            let b = std::fs::canonicalize(&source.inner.path).ok();
            a.is_some() && a == b
        };
        if !same_store {
            return Err(Error::invalid_path(
                "source snapshot belongs to a different repository",
            ));
        }

        let dest_norm = path::normalize(dest)?;
        let src_root = source.require_tree()?;
        let dest_root = self.require_tree()?;

        // Source leaves keyed by their destination path.
        let mut incoming: BTreeMap<String, (Oid, u32)> = BTreeMap::new();
        // Destination prefixes that take part in the delete comparison.
        let mut dest_prefixes: BTreeSet<String> = BTreeSet::new();

        self.with_repo(|repo| {
            for &raw in sources {
                let pour = raw.ends_with('/') || path::is_root(raw);
                let norm = path::normalize(raw.trim_end_matches('/'))?;

                if pour || norm.is_empty() {
                    if !norm.is_empty() {
                        match tree::entry_at(repo, src_root, &norm)? {
                            Some((_, mode)) if mode == MODE_TREE => {}
                            Some(_) => return Err(Error::not_a_directory(&norm)),
                            None => return Err(Error::not_found(&norm)),
                        }
                    }
                    let subtree = tree::tree_at(repo, src_root, &norm)?;
                    for (rel, entry) in tree::walk(repo, subtree)? {
                        incoming.insert(tree::join(&dest_norm, &rel), (entry.id, entry.mode));
                    }
                    dest_prefixes.insert(dest_norm.clone());
                    continue;
                }

                let (id, mode) = tree::entry_at(repo, src_root, &norm)?
                    .ok_or_else(|| Error::not_found(&norm))?;
                let base = norm.rsplit('/').next().unwrap_or(&norm);
                let target = tree::join(&dest_norm, base);

                if mode == MODE_TREE {
                    for (rel, entry) in tree::walk(repo, id)? {
                        incoming.insert(format!("{}/{}", target, rel), (entry.id, entry.mode));
                    }
                    dest_prefixes.insert(target);
                } else {
                    incoming.insert(target, (id, mode));
                    dest_prefixes.insert(dest_norm.clone());
                }
            }
            Ok(())
        })?;

        let existing: BTreeMap<String, (Oid, u32)> = self.with_repo(|repo| {
            let mut out = BTreeMap::new();
            for prefix in &dest_prefixes {
                let subtree = match tree::entry_at(repo, dest_root, prefix)? {
                    Some((id, mode)) if mode == MODE_TREE => id,
                    _ => continue,
                };
                for (rel, entry) in tree::walk(repo, subtree)? {
                    out.insert(tree::join(prefix, &rel), (entry.id, entry.mode));
                }
            }
            Ok(out)
        })?;

        let mut writes: Vec<(String, Stage)> = Vec::new();
        let mut removes: Vec<String> = Vec::new();
        let mut report = ChangeReport::new();

        for (dest_path, (id, mode)) in &incoming {
            let ft = FileType::from_mode(*mode).unwrap_or(FileType::Blob);
            match existing.get(dest_path) {
                None => {
                    report.add.push(FileEntry::new(dest_path, ft));
                    writes.push((dest_path.clone(), Stage { id: *id, mode: *mode }));
                }
                Some((old_id, old_mode)) if old_id != id || old_mode != mode => {
                    report.update.push(FileEntry::new(dest_path, ft));
                    writes.push((dest_path.clone(), Stage { id: *id, mode: *mode }));
                }
                Some(_) => {}
            }
        }

        if opts.delete {
            for (dest_path, (_, mode)) in &existing {
                if !incoming.contains_key(dest_path) {
                    let ft = FileType::from_mode(*mode).unwrap_or(FileType::Blob);
                    report.delete.push(FileEntry::new(dest_path, ft));
                    removes.push(dest_path.clone());
                }
            }
        }

        if opts.dry_run || (writes.is_empty() && removes.is_empty()) {
            let mut snap = self.clone();
            snap.changes = Some(report);
            return Ok(snap);
        }

        let message = opts
            .message
            .unwrap_or_else(|| format!("copy: {} file(s)", writes.len()));
        let mut next = commit::advance(self, &writes, &removes, &message)?;
        next.changes = Some(report);
        Ok(next)
    }

    // -- Copy / sync against disk ---------------------------------------------

    /// Import a disk directory under `dest`. Additive: repository entries
    /// missing on disk are untouched. Returns the report and the committed
    /// snapshot (this one when `dry_run` or nothing changed).
    pub fn copy_in(
        &self,
        src: &Path,
        dest: &str,
        opts: CopyOptions,
    ) -> Result<(ChangeReport, Snapshot)> {
        self.require_writable("copy into")?;
        let root = self.require_tree()?;
        let dest_norm = path::normalize(dest)?;
        let filter = PathFilter::build(
            opts.include.as_deref(),
            opts.exclude.as_deref(),
            opts.exclude_from.as_deref(),
        )?;

        let mut report = ChangeReport::new();
        let writes = self.with_repo(|repo| {
            crate::copy::import(
                repo,
                root,
                src,
                &dest_norm,
                &filter,
                opts.checksum,
                &mut report,
            )
        })?;

        if opts.dry_run || writes.is_empty() {
            return Ok((report, self.clone()));
        }

        let message = opts
            .message
            .unwrap_or_else(|| format!("copy_in: {} file(s)", writes.len()));
        let mut next = commit::advance(self, &writes, &[], &message)?;
        next.changes = Some(report.clone());
        Ok((report, next))
    }

    /// Make the repository subtree at `dest` mirror the disk directory
    /// `src`: imports changed files and removes entries missing on disk.
    pub fn sync_in(
        &self,
        src: &Path,
        dest: &str,
        opts: SyncOptions,
    ) -> Result<(ChangeReport, Snapshot)> {
        self.require_writable("sync into")?;
        let root = self.require_tree()?;
        let dest_norm = path::normalize(dest)?;
        let filter = PathFilter::build(
            opts.include.as_deref(),
            opts.exclude.as_deref(),
            opts.exclude_from.as_deref(),
        )?;

        let mut report = ChangeReport::new();
        let (writes, removes) = self.with_repo(|repo| {
            crate::copy::sync_import(
                repo,
                root,
                src,
                &dest_norm,
                &filter,
                opts.checksum,
                &mut report,
            )
        })?;

        if opts.dry_run || (writes.is_empty() && removes.is_empty()) {
            return Ok((report, self.clone()));
        }

        let message = opts
            .message
            .unwrap_or_else(|| format!("sync_in: {} change(s)", writes.len() + removes.len()));
        let mut next = commit::advance(self, &writes, &removes, &message)?;
        next.changes = Some(report.clone());
        Ok((report, next))
    }

    /// Export the subtree at `src` to a disk directory. The repository is
    /// not modified.
    pub fn copy_out(&self, src: &str, dest: &Path, opts: CopyOutOptions) -> Result<ChangeReport> {
        let root = self.require_tree()?;
        let src_norm = path::normalize(src)?;
        let filter = PathFilter::build(
            opts.include.as_deref(),
            opts.exclude.as_deref(),
            opts.exclude_from.as_deref(),
        )?;
        self.with_repo(|repo| crate::copy::export(repo, root, &src_norm, dest, &filter))
    }

    /// Make the disk directory `dest` mirror the subtree at `src`:
    /// writes changed files, deletes extras, prunes empty directories.
    pub fn sync_out(&self, src: &str, dest: &Path, opts: SyncOptions) -> Result<ChangeReport> {
        let root = self.require_tree()?;
        let src_norm = path::normalize(src)?;
        let filter = PathFilter::build(
            opts.include.as_deref(),
            opts.exclude.as_deref(),
            opts.exclude_from.as_deref(),
        )?;
        self.with_repo(|repo| {
            crate::copy::sync_export(repo, root, &src_norm, dest, &filter, opts.checksum, opts.dry_run)
        })
    }

    /// Delete filtered files under a disk root. The repository is not
    /// touched; the report lists what was removed.
    pub fn remove_from_disk(&self, root: &Path, opts: DiskRemoveOptions) -> Result<ChangeReport> {
        let filter = PathFilter::build(opts.include.as_deref(), opts.exclude.as_deref(), None)?;
        crate::copy::remove_from_disk(root, &filter)
    }

    // -- History ----------------------------------------------------------------

    /// The parent snapshot (same ref and writability), or `None` for an
    /// initial commit.
    pub fn parent(&self) -> Result<Option<Snapshot>> {
        let parent_id = self.with_commit(|c| {
            if c.parent_count() == 0 {
                Ok(None)
            } else {
                Ok(Some(c.parent_id(0).map_err(Error::git)?))
            }
        })?;

        parent_id
            .map(|id| {
                Snapshot::from_commit(
                    Arc::clone(&self.inner),
                    id,
                    self.ref_name.clone(),
                    Some(self.writable),
                )
            })
            .transpose()
    }

    /// The snapshot `n` commits back, failing `NotFound` when the history
    /// is shorter.
    pub fn back(&self, n: usize) -> Result<Snapshot> {
        let mut current = self.clone();
        for walked in 0..n {
            current = current.parent()?.ok_or_else(|| {
                Error::not_found(format!(
                    "cannot go back {} commit(s): history ends after {}",
                    n, walked
                ))
            })?;
        }
        Ok(current)
    }

    /// Move the branch back `n` commits (soft reset). The branch steps
    /// through each intermediate commit so the reflog records one entry
    /// per step, which is what [`redo`](Self::redo) replays.
    pub fn undo(&self, n: usize) -> Result<Snapshot> {
        let branch = self.require_writable("undo on")?.to_string();
        let current = self
            .commit_id
            .ok_or_else(|| Error::not_found("snapshot has no commit"))?;

        let mut chain = Vec::with_capacity(n);
        let mut walk = self.clone();
        for stepped in 0..n {
            walk = walk.parent()?.ok_or_else(|| {
                Error::not_found(format!(
                    "cannot undo {} commit(s): history ends after {}",
                    n, stepped
                ))
            })?;
            chain.push(
                walk.commit_id
                    .ok_or_else(|| Error::not_found("undo target has no commit"))?,
            );
        }

        commit::reset_chain(
            &self.inner,
            &branch,
            current,
            &chain,
            &format!("undo: {} commit(s)", n),
        )?;
        Ok(walk)
    }

    /// Move the branch forward `n` steps by scanning the reflog for the
    /// `undo:`/`redo:` entries that landed on the current commit.
    pub fn redo(&self, n: usize) -> Result<Snapshot> {
        let branch = self.require_writable("redo on")?.to_string();
        let current = self
            .commit_id
            .ok_or_else(|| Error::not_found("snapshot has no commit"))?;
        let refname = format!("refs/heads/{}", branch);

        // (old, new, message) triples, most recent first.
        let entries: Vec<(Oid, Oid, String)> = self.with_repo(|repo| {
            let reflog = match repo.reflog(&refname) {
                Ok(l) => l,
                Err(_) => return Ok(Vec::new()),
            };
            Ok(reflog
                .iter()
                .map(|e| {
                    (
                        e.id_old(),
                        e.id_new(),
                        e.message().unwrap_or_default().to_string(),
                    )
                })
                .collect())
        })?;

        let mut cursor = current;
        let mut steps = 0usize;
        for (old, new, message) in &entries {
            if steps == n {
                break;
            }
            let reversal = message.starts_with("undo:") || message.starts_with("redo:");
            if reversal && *new == cursor {
                if old.is_zero() {
                    break;
                }
                cursor = *old;
                steps += 1;
            }
        }
        if steps < n {
            return Err(Error::not_found(format!(
                "cannot redo {} step(s): only {} undo/redo entr{} lead here",
                n,
                steps,
                if steps == 1 { "y" } else { "ies" }
            )));
        }

        commit::reset_chain(
            &self.inner,
            &branch,
            current,
            &[cursor],
            &format!("redo: {} commit(s)", n),
        )?;
        Snapshot::from_commit(
            Arc::clone(&self.inner),
            cursor,
            self.ref_name.clone(),
            Some(self.writable),
        )
    }

    /// Walk the first-parent history from this commit, most recent first,
    /// applying the ANDed [`LogOptions`] filters.
    pub fn log(&self, opts: LogOptions) -> Result<Vec<CommitInfo>> {
        let mut cursor = self
            .commit_id
            .ok_or_else(|| Error::not_found("snapshot has no commit"))?;

        let skip = opts.skip.unwrap_or(0);
        let limit = opts.limit.unwrap_or(usize::MAX);
        let path_filter = opts
            .path
            .as_deref()
            .map(path::normalize)
            .transpose()?
            .filter(|p| !p.is_empty());

        let repo = self
            .inner
            .repo
            .lock()
            .map_err(|e| Error::git_msg(e.to_string()))?;

        let mut out = Vec::new();
        let mut matched = 0usize;

        loop {
            let commit = repo.find_commit(cursor).map_err(Error::git)?;
            let time = commit.time().seconds().max(0) as u64;
            let message = commit
                .message()
                .unwrap_or_default()
                .trim_end_matches('\n')
                .to_string();
            let parent_id = if commit.parent_count() > 0 {
                Some(commit.parent_id(0).map_err(Error::git)?)
            } else {
                None
            };

            let mut include = true;

            if let Some(cutoff) = opts.before {
                include &= time <= cutoff;
            }

            if include {
                if let Some(pattern) = opts.match_pattern.as_deref() {
                    include &= crate::glob::wildcard_match(pattern.as_bytes(), message.as_bytes());
                }
            }

            if include {
                if let Some(ref wanted) = path_filter {
                    let here = tree::entry_at(&repo, commit.tree_id(), wanted)?;
                    let in_parent = match parent_id {
                        Some(pid) => {
                            let parent = repo.find_commit(pid).map_err(Error::git)?;
                            tree::entry_at(&repo, parent.tree_id(), wanted)?
                        }
                        None => None,
                    };
                    include &= here != in_parent;
                }
            }

            if include {
                matched += 1;
                if matched > skip {
                    let author = commit.author();
                    out.push(CommitInfo {
                        id: cursor.to_string(),
                        message,
                        time,
                        author_name: author.name().unwrap_or_default().to_string(),
                        author_email: author.email().unwrap_or_default().to_string(),
                    });
                }
            }

            if out.len() >= limit {
                break;
            }
            match parent_id {
                Some(pid) => cursor = pid,
                None => break,
            }
        }

        Ok(out)
    }

    // -- Construction -------------------------------------------------------

    /// Build a snapshot at a known commit, deriving the tree id.
    pub(crate) fn from_commit(
        inner: Arc<StoreInner>,
        commit_id: Oid,
        ref_name: Option<String>,
        writable: Option<bool>,
    ) -> Result<Self> {
        let writable = writable.unwrap_or(ref_name.is_some());
        let tree_id = {
            let repo = inner
                .repo
                .lock()
                .map_err(|e| Error::git_msg(e.to_string()))?;
            let id = repo.find_commit(commit_id).map_err(Error::git)?.tree_id();
            id
        };

        Ok(Snapshot {
            inner,
            commit_id: Some(commit_id),
            tree_id: Some(tree_id),
            ref_name,
            writable,
            changes: None,
        })
    }
}

/// Snapshot equality is by commit id: two values at the same commit observe
/// identical content forever, regardless of ref binding or writability.
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.commit_id == other.commit_id
    }
}

impl Eq for Snapshot {}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let id = self.commit_id.map(|o| o.to_string()).unwrap_or_default();
        let short = &id[..id.len().min(7)];
        let mut parts = Vec::new();
        if let Some(ref name) = self.ref_name {
            parts.push(format!("ref={:?}", name));
        }
        parts.push(format!("commit={}", short));
        if !self.writable {
            parts.push("readonly".into());
        }
        write!(f, "Snapshot({})", parts.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn clamp_range(data: &[u8], offset: usize, size: Option<usize>) -> &[u8] {
    let start = offset.min(data.len());
    let end = match size {
        Some(s) => start.saturating_add(s).min(data.len()),
        None => data.len(),
    };
    &data[start..end]
}

/// Retry `f` on `StaleSnapshot`, up to six calls total, sleeping
/// `min(10 * 2^attempt, 200)` ms between attempts. Other errors pass
/// through immediately.
pub fn retry_write<F, T>(mut f: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(Error::StaleSnapshot(_)) if attempt < 5 => {
                let backoff = std::time::Duration::from_millis((10 * 2u64.pow(attempt)).min(200));
                std::thread::sleep(backoff);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Glob traversal
// ---------------------------------------------------------------------------

fn glob_walk(
    repo: &git2::Repository,
    tree_id: Oid,
    segments: &[&str],
    prefix: &str,
    out: &mut Vec<String>,
) -> Result<()> {
    let Some((&seg, rest)) = segments.split_first() else {
        return Ok(());
    };

    let entries = tree::entries_at(repo, tree_id, "")?;

    if seg == "**" {
        if rest.is_empty() {
            // Terminal `**`: every non-dot leaf at this level.
            for e in &entries {
                if !e.name.starts_with('.') && e.mode != MODE_TREE {
                    out.push(tree::join(prefix, &e.name));
                }
            }
        } else {
            // Zero directories consumed: match the remainder right here.
            glob_walk(repo, tree_id, rest, prefix, out)?;
        }
        // One or more directories consumed: descend with `**` retained,
        // never into dot-directories.
        for e in &entries {
            if e.mode == MODE_TREE && !e.name.starts_with('.') {
                glob_walk(repo, e.id, segments, &tree::join(prefix, &e.name), out)?;
            }
        }
        return Ok(());
    }

    let wild = seg.contains(['*', '?', '[']);
    for e in &entries {
        let hit = if wild {
            crate::glob::segment_match(seg, &e.name)
        } else {
            e.name == seg
        };
        if !hit {
            continue;
        }
        let full = tree::join(prefix, &e.name);
        if rest.is_empty() {
            // The final segment matches leaves only.
            if e.mode != MODE_TREE {
                out.push(full);
            }
        } else if e.mode == MODE_TREE {
            glob_walk(repo, e.id, rest, &full, out)?;
        }
    }
    Ok(())
}
