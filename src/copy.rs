//! Disk ↔ tree copy and sync.
//!
//! Import paths stage into the tree rebuilder and commit through the
//! engine; export paths only touch disk. Unchanged-file detection always
//! computes the prospective blob id and compares it (with the mode) to the
//! existing entry — there is deliberately no size/mtime shortcut.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use git2::{Oid, Repository};
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::filter::PathFilter;
use crate::tree::{self, Stage};
use crate::types::{ChangeError, ChangeReport, FileEntry, FileType, MODE_LINK, MODE_TREE};

/// Relative paths of every file under `root`, sorted. Directory symlinks
/// are followed; unreadable subtrees are skipped with a warning.
pub(crate) fn walk_disk(root: &Path, warnings: &mut Vec<String>) -> Result<Vec<String>> {
    let mut out = Vec::new();
    if !root.exists() {
        return Ok(out);
    }

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let what = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                warn!(path = %what, error = %e, "skipping unreadable entry");
                warnings.push(format!("skipped {}: {}", what, e));
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();
        out.push(rel);
    }

    out.sort();
    Ok(out)
}

/// Read one disk file the way it will be stored: symlinks yield their
/// target string, everything else its bytes. Returns the data and mode.
fn read_disk_entry(path: &Path) -> Result<(Vec<u8>, u32)> {
    let mode = tree::mode_from_disk(path)?;
    let data = if mode == MODE_LINK {
        let target = std::fs::read_link(path).map_err(|e| Error::io_at(path, e))?;
        target.to_string_lossy().into_owned().into_bytes()
    } else {
        std::fs::read(path).map_err(|e| Error::io_at(path, e))?
    };
    Ok((data, mode))
}

/// Leaves of the subtree at `dest` keyed by relative path, or empty when
/// `dest` is missing or not a tree.
fn subtree_leaves(
    repo: &Repository,
    root: Oid,
    dest: &str,
) -> Result<HashMap<String, (Oid, u32)>> {
    let subtree = if dest.is_empty() {
        root
    } else {
        match tree::entry_at(repo, root, dest)? {
            Some((id, mode)) if mode == MODE_TREE => id,
            _ => return Ok(HashMap::new()),
        }
    };
    Ok(tree::walk(repo, subtree)?
        .into_iter()
        .map(|(rel, e)| (rel, (e.id, e.mode)))
        .collect())
}

/// Additive disk → tree import. Returns the staged writes; adds and
/// per-path failures land in `report`.
pub(crate) fn import(
    repo: &Repository,
    root: Oid,
    src: &Path,
    dest: &str,
    filter: &PathFilter,
    checksum: bool,
    report: &mut ChangeReport,
) -> Result<Vec<(String, Stage)>> {
    let existing = if checksum {
        subtree_leaves(repo, root, dest)?
    } else {
        HashMap::new()
    };

    let mut writes = Vec::new();
    for rel in walk_disk(src, &mut report.warnings)? {
        if !filter.admits(&rel, false) {
            continue;
        }

        let disk_path = src.join(&rel);
        let (data, mode) = match read_disk_entry(&disk_path) {
            Ok(v) => v,
            Err(e) => {
                report.errors.push(ChangeError {
                    path: rel.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        let blob = repo.blob(&data).map_err(Error::git)?;
        if checksum && existing.get(&rel) == Some(&(blob, mode)) {
            continue;
        }

        let store_path = tree::join(dest, &rel);
        let ft = FileType::from_mode(mode).unwrap_or(FileType::Blob);
        report
            .add
            .push(FileEntry::with_src(&store_path, ft, &disk_path));
        writes.push((store_path, Stage { id: blob, mode }));
    }

    Ok(writes)
}

/// Disk → tree sync: like [`import`] but also stages removes for tree
/// entries missing on disk, and classifies adds vs updates.
pub(crate) fn sync_import(
    repo: &Repository,
    root: Oid,
    src: &Path,
    dest: &str,
    filter: &PathFilter,
    checksum: bool,
    report: &mut ChangeReport,
) -> Result<(Vec<(String, Stage)>, Vec<String>)> {
    let existing = subtree_leaves(repo, root, dest)?;

    let disk_files = walk_disk(src, &mut report.warnings)?;
    let disk_set: HashSet<&str> = disk_files.iter().map(|s| s.as_str()).collect();

    let mut writes = Vec::new();
    for rel in &disk_files {
        if !filter.admits(rel, false) {
            continue;
        }

        let disk_path = src.join(rel);
        let (data, mode) = match read_disk_entry(&disk_path) {
            Ok(v) => v,
            Err(e) => {
                report.errors.push(ChangeError {
                    path: rel.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        let blob = repo.blob(&data).map_err(Error::git)?;
        let prior = existing.get(rel);

        let changed = match prior {
            Some(&(old_id, old_mode)) => !checksum || old_id != blob || old_mode != mode,
            None => true,
        };
        if !changed {
            continue;
        }

        let store_path = tree::join(dest, rel);
        let ft = FileType::from_mode(mode).unwrap_or(FileType::Blob);
        if prior.is_some() {
            report
                .update
                .push(FileEntry::with_src(&store_path, ft, &disk_path));
        } else {
            report
                .add
                .push(FileEntry::with_src(&store_path, ft, &disk_path));
        }
        writes.push((store_path, Stage { id: blob, mode }));
    }

    let mut removes = Vec::new();
    for (rel, (_, mode)) in &existing {
        if disk_set.contains(rel.as_str()) || !filter.admits(rel, false) {
            continue;
        }
        let store_path = tree::join(dest, rel);
        let ft = FileType::from_mode(*mode).unwrap_or(FileType::Blob);
        report.delete.push(FileEntry::new(&store_path, ft));
        removes.push(store_path);
    }

    Ok((writes, removes))
}

/// Write one tree leaf to disk, preserving symlinks and the executable bit
/// where the platform supports them.
fn materialize(repo: &Repository, entry_id: Oid, mode: u32, dest_path: &Path) -> Result<()> {
    if let Some(parent) = dest_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
    }

    let blob = repo.find_blob(entry_id).map_err(Error::git)?;

    // Replace an existing symlink rather than writing through it.
    if let Ok(meta) = std::fs::symlink_metadata(dest_path) {
        if meta.file_type().is_symlink() {
            std::fs::remove_file(dest_path).map_err(|e| Error::io_at(dest_path, e))?;
        }
    }

    if mode == MODE_LINK {
        let target = String::from_utf8_lossy(blob.content()).into_owned();
        #[cfg(unix)]
        {
            let _ = std::fs::remove_file(dest_path);
            std::os::unix::fs::symlink(&target, dest_path)
                .map_err(|e| Error::io_at(dest_path, e))?;
        }
        #[cfg(not(unix))]
        {
            std::fs::write(dest_path, target.as_bytes())
                .map_err(|e| Error::io_at(dest_path, e))?;
        }
    } else {
        std::fs::write(dest_path, blob.content()).map_err(|e| Error::io_at(dest_path, e))?;

        #[cfg(unix)]
        if mode == crate::types::MODE_EXEC {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dest_path, std::fs::Permissions::from_mode(0o755))
                .map_err(|e| Error::io_at(dest_path, e))?;
        }
    }

    Ok(())
}

/// Tree → disk export. The repository is not modified.
pub(crate) fn export(
    repo: &Repository,
    root: Oid,
    src: &str,
    dest: &Path,
    filter: &PathFilter,
) -> Result<ChangeReport> {
    let mut report = ChangeReport::new();
    let subtree = tree::tree_at(repo, root, src)?;

    for (rel, entry) in tree::walk(repo, subtree)? {
        if !filter.admits(&rel, false) {
            continue;
        }
        let dest_path = dest.join(&rel);
        materialize(repo, entry.id, entry.mode, &dest_path)?;
        let ft = entry.file_type().unwrap_or(FileType::Blob);
        report.add.push(FileEntry::with_src(&rel, ft, &dest_path));
    }

    Ok(report)
}

/// Tree → disk sync: writes changed files, deletes filtered-in disk files
/// absent from the subtree, then prunes empty directories bottom-up. With
/// `dry_run` the report is computed and disk is left alone.
pub(crate) fn sync_export(
    repo: &Repository,
    root: Oid,
    src: &str,
    dest: &Path,
    filter: &PathFilter,
    checksum: bool,
    dry_run: bool,
) -> Result<ChangeReport> {
    let mut report = ChangeReport::new();
    let subtree = tree::tree_at(repo, root, src)?;

    let repo_entries = tree::walk(repo, subtree)?;
    let repo_set: HashSet<&str> = repo_entries.iter().map(|(p, _)| p.as_str()).collect();

    let disk_files = walk_disk(dest, &mut report.warnings)?;
    let disk_set: HashSet<&str> = disk_files.iter().map(|s| s.as_str()).collect();

    for (rel, entry) in &repo_entries {
        if !filter.admits(rel, false) {
            continue;
        }
        let dest_path = dest.join(rel);
        let on_disk = disk_set.contains(rel.as_str());

        let needs_write = if !on_disk {
            true
        } else if !checksum {
            true
        } else {
            // Prospective blob id of the current disk content, compared to
            // the tree entry's id and mode.
            match read_disk_entry(&dest_path) {
                Ok((data, disk_mode)) => {
                    let disk_blob = repo.blob(&data).map_err(Error::git)?;
                    disk_blob != entry.id || disk_mode != entry.mode
                }
                Err(_) => true,
            }
        };

        if needs_write {
            if !dry_run {
                if let Err(e) = materialize(repo, entry.id, entry.mode, &dest_path) {
                    report.errors.push(ChangeError {
                        path: rel.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            }
            let ft = entry.file_type().unwrap_or(FileType::Blob);
            if on_disk {
                report.update.push(FileEntry::with_src(rel, ft, &dest_path));
            } else {
                report.add.push(FileEntry::with_src(rel, ft, &dest_path));
            }
        }
    }

    for rel in &disk_files {
        if repo_set.contains(rel.as_str()) || !filter.admits(rel, false) {
            continue;
        }
        let dest_path = dest.join(rel);
        if !dry_run {
            if let Err(e) = std::fs::remove_file(&dest_path) {
                report.errors.push(ChangeError {
                    path: rel.clone(),
                    error: Error::io_at(&dest_path, e).to_string(),
                });
                continue;
            }
        }
        report
            .delete
            .push(FileEntry::with_src(rel, FileType::Blob, &dest_path));
    }

    if !dry_run {
        prune_empty_dirs(dest)?;
    }

    Ok(report)
}

/// Delete filtered-in files under `root` on disk.
pub(crate) fn remove_from_disk(root: &Path, filter: &PathFilter) -> Result<ChangeReport> {
    let mut report = ChangeReport::new();
    for rel in walk_disk(root, &mut report.warnings)? {
        if !filter.admits(&rel, false) {
            continue;
        }
        let full = root.join(&rel);
        if full.symlink_metadata().is_ok() {
            std::fs::remove_file(&full).map_err(|e| Error::io_at(&full, e))?;
            report
                .delete
                .push(FileEntry::with_src(&rel, FileType::Blob, &full));
        }
    }
    Ok(report)
}

/// Remove empty directories bottom-up; directories that still hold files
/// are left alone.
fn prune_empty_dirs(root: &Path) -> Result<()> {
    if !root.is_dir() {
        return Ok(());
    }

    let mut dirs: Vec<std::path::PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect();

    dirs.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
    for dir in dirs {
        let _ = std::fs::remove_dir(dir);
    }
    Ok(())
}
