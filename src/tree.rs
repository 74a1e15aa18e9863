//! Tree reading and rebuilding.
//!
//! Readers take a root tree id and an already-normalized path. The
//! rebuilder turns staged writes and removes into a new root tree id,
//! rewriting only the ancestor chain of each touched path; untouched
//! sibling subtrees are reused by id.

use std::collections::BTreeMap;
use std::path::Path;

use git2::{Oid, Repository};

use crate::error::{Error, Result};
#[cfg(unix)]
use crate::types::MODE_EXEC;
use crate::types::{DirListing, TreeEntry, MODE_BLOB, MODE_LINK, MODE_TREE};

/// A staged leaf write: the blob has already been written to the object
/// store, only its placement in the tree is pending.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Stage {
    pub id: Oid,
    pub mode: u32,
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Resolve `path` to `(id, mode)`, or `None` when any segment is missing or
/// an intermediate entry is not a tree. The root resolves to the tree itself.
pub(crate) fn entry_at(
    repo: &Repository,
    root: Oid,
    path: &str,
) -> Result<Option<(Oid, u32)>> {
    if path.is_empty() {
        return Ok(Some((root, MODE_TREE)));
    }

    let mut current = root;
    let mut segments = path.split('/').peekable();

    while let Some(segment) = segments.next() {
        let tree = repo.find_tree(current).map_err(Error::git)?;
        let (id, mode) = match tree.get_name(segment) {
            Some(e) => (e.id(), e.filemode() as u32),
            None => return Ok(None),
        };

        if segments.peek().is_none() {
            return Ok(Some((id, mode)));
        }
        if mode != MODE_TREE {
            return Ok(None);
        }
        current = id;
    }

    Ok(None)
}

/// Like [`entry_at`] but with directory-style error reporting: a missing
/// segment is `NotFound`, a non-tree intermediate is `NotADirectory`.
pub(crate) fn resolve(repo: &Repository, root: Oid, path: &str) -> Result<(Oid, u32)> {
    if path.is_empty() {
        return Ok((root, MODE_TREE));
    }

    let segments: Vec<&str> = path.split('/').collect();
    let mut current = root;

    for (i, segment) in segments.iter().enumerate() {
        let tree = repo.find_tree(current).map_err(Error::git)?;
        let (id, mode) = match tree.get_name(segment) {
            Some(e) => (e.id(), e.filemode() as u32),
            None => return Err(Error::not_found(segments[..=i].join("/"))),
        };

        if i == segments.len() - 1 {
            return Ok((id, mode));
        }
        if mode != MODE_TREE {
            return Err(Error::not_a_directory(segments[..=i].join("/")));
        }
        current = id;
    }

    unreachable!("path splits into at least one segment");
}

/// Read the blob at `path`.
pub(crate) fn blob_at(repo: &Repository, root: Oid, path: &str) -> Result<Vec<u8>> {
    let (id, mode) = resolve(repo, root, path)?;
    if mode == MODE_TREE {
        return Err(Error::is_a_directory(path));
    }
    let blob = repo.find_blob(id).map_err(Error::git)?;
    Ok(blob.content().to_vec())
}

/// Resolve `path` to a tree id, failing `NotFound`/`NotADirectory`.
pub(crate) fn tree_at(repo: &Repository, root: Oid, path: &str) -> Result<Oid> {
    if path.is_empty() {
        return Ok(root);
    }
    let (id, mode) = entry_at(repo, root, path)?.ok_or_else(|| Error::not_found(path))?;
    if mode != MODE_TREE {
        return Err(Error::not_a_directory(path));
    }
    Ok(id)
}

/// Direct entries of the tree at `path`, in object-store order.
pub(crate) fn entries_at(repo: &Repository, root: Oid, path: &str) -> Result<Vec<TreeEntry>> {
    let target = tree_at(repo, root, path)?;
    let tree = repo.find_tree(target).map_err(Error::git)?;
    Ok(tree
        .iter()
        .map(|e| TreeEntry {
            name: e.name().unwrap_or_default().to_string(),
            id: e.id(),
            mode: e.filemode() as u32,
        })
        .collect())
}

/// Depth-first pre-order walk of every non-tree leaf under `root`, as
/// `(relative path, entry)` pairs. Directory entries are not emitted.
pub(crate) fn walk(repo: &Repository, root: Oid) -> Result<Vec<(String, TreeEntry)>> {
    let mut out = Vec::new();
    walk_into(repo, root, "", &mut out)?;
    Ok(out)
}

fn walk_into(
    repo: &Repository,
    tree_id: Oid,
    prefix: &str,
    out: &mut Vec<(String, TreeEntry)>,
) -> Result<()> {
    let tree = repo.find_tree(tree_id).map_err(Error::git)?;
    for e in tree.iter() {
        let name = e.name().unwrap_or_default().to_string();
        let full = join(prefix, &name);
        let mode = e.filemode() as u32;
        if mode == MODE_TREE {
            walk_into(repo, e.id(), &full, out)?;
        } else {
            out.push((
                full,
                TreeEntry {
                    name,
                    id: e.id(),
                    mode,
                },
            ));
        }
    }
    Ok(())
}

/// os.walk-style traversal: one [`DirListing`] per directory, parents before
/// children.
pub(crate) fn walk_dirs(repo: &Repository, root: Oid) -> Result<Vec<DirListing>> {
    let mut out = Vec::new();
    walk_dirs_into(repo, root, "", &mut out)?;
    Ok(out)
}

fn walk_dirs_into(
    repo: &Repository,
    tree_id: Oid,
    prefix: &str,
    out: &mut Vec<DirListing>,
) -> Result<()> {
    let tree = repo.find_tree(tree_id).map_err(Error::git)?;

    let mut listing = DirListing {
        path: prefix.to_string(),
        dirs: Vec::new(),
        files: Vec::new(),
    };
    let mut subtrees: Vec<(String, Oid)> = Vec::new();

    for e in tree.iter() {
        let name = e.name().unwrap_or_default().to_string();
        let mode = e.filemode() as u32;
        if mode == MODE_TREE {
            listing.dirs.push(name.clone());
            subtrees.push((name, e.id()));
        } else {
            listing.files.push(TreeEntry {
                name,
                id: e.id(),
                mode,
            });
        }
    }

    out.push(listing);

    for (name, id) in subtrees {
        walk_dirs_into(repo, id, &join(prefix, &name), out)?;
    }
    Ok(())
}

/// Number of direct subtree entries; feeds `nlink` for directory stat.
pub(crate) fn subdir_count(repo: &Repository, tree_id: Oid) -> Result<u32> {
    let tree = repo.find_tree(tree_id).map_err(Error::git)?;
    Ok(tree
        .iter()
        .filter(|e| e.filemode() as u32 == MODE_TREE)
        .count() as u32)
}

pub(crate) fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

// ---------------------------------------------------------------------------
// Rebuilding
// ---------------------------------------------------------------------------

/// Apply staged writes and removes to `base` and return the new root tree
/// id. A zero `base` denotes the empty tree. Paths must be normalized; the
/// caller guarantees at most one action per path.
pub(crate) fn rebuild(
    repo: &Repository,
    base: Oid,
    writes: &[(String, Stage)],
    removes: &[String],
) -> Result<Oid> {
    let seg_writes: Vec<(Vec<&str>, Stage)> = writes
        .iter()
        .map(|(path, stage)| (path.split('/').collect(), *stage))
        .collect();
    let seg_removes: Vec<Vec<&str>> = removes
        .iter()
        .map(|path| path.split('/').collect())
        .collect();

    let write_refs: Vec<(&[&str], Stage)> = seg_writes
        .iter()
        .map(|(segs, stage)| (segs.as_slice(), *stage))
        .collect();
    let remove_refs: Vec<&[&str]> = seg_removes.iter().map(|segs| segs.as_slice()).collect();

    rebuild_level(repo, base, &write_refs, &remove_refs)
}

fn rebuild_level<'a>(
    repo: &Repository,
    base: Oid,
    writes: &[(&'a [&'a str], Stage)],
    removes: &[&'a [&'a str]],
) -> Result<Oid> {
    // Seed the builder from the existing subtree so untouched entries carry
    // over by id.
    let mut builder = if base.is_zero() {
        repo.treebuilder(None).map_err(Error::git)?
    } else {
        let tree = repo.find_tree(base).map_err(Error::git)?;
        repo.treebuilder(Some(&tree)).map_err(Error::git)?
    };

    // Partition by depth: single-segment operations act on this level,
    // deeper ones group under their leading segment.
    type Pending<'a> = (Vec<(&'a [&'a str], Stage)>, Vec<&'a [&'a str]>);
    let mut deeper: BTreeMap<&'a str, Pending<'a>> = BTreeMap::new();

    for segs in removes {
        if segs.len() == 1 {
            let name = segs[0];
            let present = builder.get(name).map_err(Error::git)?.is_some();
            if present {
                builder.remove(name).map_err(Error::git)?;
            }
        } else if let Some((head, rest)) = segs.split_first() {
            deeper.entry(*head).or_default().1.push(rest);
        }
    }


    for (segs, stage) in writes {
        if segs.len() == 1 {
            builder
                .insert(segs[0], stage.id, stage.mode as i32)
                .map_err(Error::git)?;
        } else if let Some((head, rest)) = segs.split_first() {
            deeper.entry(*head).or_default().0.push((rest, *stage));
        }
    }

    for (&name, (sub_writes, sub_removes)) in &deeper {
        let existing: Option<(Oid, u32)> = builder
            .get(name)
            .map_err(Error::git)?
            .map(|e| (e.id(), e.filemode() as u32));

        let sub_base = match existing {
            Some((id, mode)) if mode == MODE_TREE => id,
            Some(_) => {
                // A leaf occupies this name; the deeper write replaces it
                // with a subtree.
                builder.remove(name).map_err(Error::git)?;
                Oid::zero()
            }
            None => Oid::zero(),
        };

        let rebuilt = rebuild_level(repo, sub_base, sub_writes, sub_removes)?;
        let rebuilt_len = repo.find_tree(rebuilt).map_err(Error::git)?.len();

        if rebuilt_len == 0 {
            // Git trees do not hold empty directories; drop the entry.
            let present = builder.get(name).map_err(Error::git)?.is_some();
            if present {
                builder.remove(name).map_err(Error::git)?;
            }
        } else {
            builder
                .insert(name, rebuilt, MODE_TREE as i32)
                .map_err(Error::git)?;
        }
    }

    builder.write().map_err(Error::git)
}

// ---------------------------------------------------------------------------
// Disk modes
// ---------------------------------------------------------------------------

/// Tree-entry mode for a disk path: symlink, executable (Unix), or blob.
pub(crate) fn mode_from_disk(path: &Path) -> Result<u32> {
    let meta = std::fs::symlink_metadata(path).map_err(|e| Error::io_at(path, e))?;
    if meta.file_type().is_symlink() {
        return Ok(MODE_LINK);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 != 0 {
            return Ok(MODE_EXEC);
        }
    }
    Ok(MODE_BLOB)
}
