//! Per-commit notes.
//!
//! A namespace `<ns>` lives at `refs/notes/<ns>`: a parallel commit line
//! whose tree maps 40-hex commit ids to note blobs. Reads tolerate both the
//! flat layout (entry named by the full hash) and the two-character fanout
//! (`ab/cdef...`); writes always produce the flat layout, clearing any
//! stale fanout entry for the same hash.

use std::sync::Arc;

use git2::{Oid, Repository};

use crate::error::{Error, Result};
use crate::lock::with_write_lock;
use crate::path::is_hex40;
use crate::store::StoreInner;
use crate::types::{MODE_BLOB, MODE_TREE};

/// Handle to one notes namespace.
#[derive(Clone, Debug)]
pub struct Notes {
    inner: Arc<StoreInner>,
    namespace: String,
    refname: String,
}

impl Notes {
    pub(crate) fn new(inner: Arc<StoreInner>, namespace: &str) -> Self {
        Self {
            inner,
            namespace: namespace.to_string(),
            refname: format!("refs/notes/{}", namespace),
        }
    }

    /// The namespace name (without the `refs/notes/` prefix).
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn with_repo<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Repository) -> Result<T>,
    {
        let repo = self
            .inner
            .repo
            .lock()
            .map_err(|e| Error::git_msg(e.to_string()))?;
        f(&repo)
    }

    /// Accept a 40-hex commit id, or resolve a branch/tag name to its tip.
    fn resolve_key(&self, key: &str) -> Result<String> {
        if is_hex40(key) {
            return Ok(key.to_string());
        }
        self.with_repo(|repo| {
            for prefix in ["refs/heads/", "refs/tags/"] {
                if let Ok(r) = repo.find_reference(&format!("{}{}", prefix, key)) {
                    if let Some(id) = r.resolve().ok().and_then(|r| r.target()) {
                        return Ok(id.to_string());
                    }
                }
            }
            Err(Error::key_not_found(key))
        })
    }

    fn tip(&self, repo: &Repository) -> Option<Oid> {
        repo.find_reference(&self.refname)
            .ok()
            .and_then(|r| r.target())
    }

    fn tip_tree(&self, repo: &Repository) -> Result<Option<Oid>> {
        match self.tip(repo) {
            None => Ok(None),
            Some(tip) => {
                let commit = repo.find_commit(tip).map_err(Error::git)?;
                Ok(Some(commit.tree_id()))
            }
        }
    }

    fn entries(&self, repo: &Repository, tree_id: Oid) -> Result<Vec<(String, Oid, u32)>> {
        let tree = repo.find_tree(tree_id).map_err(Error::git)?;
        Ok(tree
            .iter()
            .map(|e| {
                (
                    e.name().unwrap_or_default().to_string(),
                    e.id(),
                    e.filemode() as u32,
                )
            })
            .collect())
    }

    /// Find the note blob for `hash`, trying flat first, then 2/38 fanout.
    fn locate(&self, repo: &Repository, tree_id: Oid, hash: &str) -> Result<Option<Oid>> {
        let tree = repo.find_tree(tree_id).map_err(Error::git)?;

        if let Some(entry) = tree.get_name(hash) {
            if entry.filemode() as u32 != MODE_TREE {
                return Ok(Some(entry.id()));
            }
        }

        let (prefix, suffix) = hash.split_at(2);
        if let Some(entry) = tree.get_name(prefix) {
            if entry.filemode() as u32 == MODE_TREE {
                let subtree = repo.find_tree(entry.id()).map_err(Error::git)?;
                let sub_id = subtree.get_name(suffix).map(|sub| sub.id());
                if let Some(sub_id) = sub_id {
                    return Ok(Some(sub_id));
                }
            }
        }

        Ok(None)
    }

    /// All `(hash, blob)` pairs across both layouts.
    fn collect(&self, repo: &Repository, tree_id: Oid) -> Result<Vec<(String, Oid)>> {
        let mut out = Vec::new();
        for (name, id, mode) in self.entries(repo, tree_id)? {
            if mode == MODE_TREE && name.len() == 2 {
                for (sub_name, sub_id, _) in self.entries(repo, id)? {
                    let full = format!("{}{}", name, sub_name);
                    if is_hex40(&full) {
                        out.push((full, sub_id));
                    }
                }
            } else if is_hex40(&name) {
                out.push((name, id));
            }
        }
        Ok(out)
    }

    /// Drop `hash`'s fanout entry if one exists, removing the fanout
    /// subtree entirely when it empties.
    fn clear_fanout(
        &self,
        repo: &Repository,
        builder: &mut git2::TreeBuilder<'_>,
        hash: &str,
    ) -> Result<bool> {
        let (prefix, suffix) = hash.split_at(2);

        let fanout = builder
            .get(prefix)
            .map_err(Error::git)?
            .filter(|e| e.filemode() as u32 == MODE_TREE)
            .map(|e| e.id());
        let Some(fanout_id) = fanout else {
            return Ok(false);
        };

        let subtree = repo.find_tree(fanout_id).map_err(Error::git)?;
        if subtree.get_name(suffix).is_none() {
            return Ok(false);
        }

        if subtree.len() == 1 {
            builder.remove(prefix).map_err(Error::git)?;
        } else {
            let mut sub_builder = repo.treebuilder(Some(&subtree)).map_err(Error::git)?;
            sub_builder.remove(suffix).map_err(Error::git)?;
            let new_sub = sub_builder.write().map_err(Error::git)?;
            builder
                .insert(prefix, new_sub, MODE_TREE as i32)
                .map_err(Error::git)?;
        }
        Ok(true)
    }

    /// Apply writes and deletes to the notes tree. Writes land flat.
    fn build_tree(
        &self,
        repo: &Repository,
        base: Option<Oid>,
        writes: &[(String, String)],
        deletes: &[String],
    ) -> Result<Oid> {
        let mut builder = match base {
            Some(id) => {
                let tree = repo.find_tree(id).map_err(Error::git)?;
                repo.treebuilder(Some(&tree)).map_err(Error::git)?
            }
            None => repo.treebuilder(None).map_err(Error::git)?,
        };

        for hash in deletes {
            let flat = builder
                .get(hash.as_str())
                .map_err(Error::git)?
                .map(|e| e.filemode() as u32 != MODE_TREE)
                .unwrap_or(false);
            if flat {
                builder.remove(hash.as_str()).map_err(Error::git)?;
            } else if !self.clear_fanout(repo, &mut builder, hash)? {
                return Err(Error::key_not_found(hash));
            }
        }

        for (hash, text) in writes {
            self.clear_fanout(repo, &mut builder, hash)?;
            let blob = repo.blob(text.as_bytes()).map_err(Error::git)?;
            builder
                .insert(hash.as_str(), blob, MODE_BLOB as i32)
                .map_err(Error::git)?;
        }

        builder.write().map_err(Error::git)
    }

    /// One notes commit: re-read the tip inside the repository lock, build
    /// the new tree from it, commit with the tip as parent, move the ref.
    fn commit_changes(
        &self,
        writes: &[(String, String)],
        deletes: &[String],
        message: &str,
    ) -> Result<()> {
        with_write_lock(&self.inner.path, || {
            let repo = self
                .inner
                .repo
                .lock()
                .map_err(|e| Error::git_msg(e.to_string()))?;

            let tip = self.tip(&repo);
            let base_tree = match tip {
                Some(t) => Some(repo.find_commit(t).map_err(Error::git)?.tree_id()),
                None => None,
            };

            let new_tree_id = self.build_tree(&repo, base_tree, writes, deletes)?;
            let new_tree = repo.find_tree(new_tree_id).map_err(Error::git)?;

            let sig = git2::Signature::now(&self.inner.signature.name, &self.inner.signature.email)
                .map_err(Error::git)?;
            let parent = tip.map(|t| repo.find_commit(t)).transpose().map_err(Error::git)?;
            let parents: Vec<&git2::Commit> = parent.iter().collect();

            let commit_id = repo
                .commit(None, &sig, &sig, message, &new_tree, &parents)
                .map_err(Error::git)?;

            match tip {
                Some(old) => {
                    repo.reference_matching(&self.refname, commit_id, true, old, message)
                        .map_err(Error::git)?;
                }
                None => {
                    repo.reference(&self.refname, commit_id, false, message)
                        .map_err(Error::git)?;
                }
            }
            Ok(())
        })
    }

    // -- Public API ----------------------------------------------------------

    /// The note text for `key` (a commit hash, branch, or tag name).
    pub fn get(&self, key: &str) -> Result<String> {
        let hash = self.resolve_key(key)?;
        self.with_repo(|repo| {
            let tree_id = self
                .tip_tree(repo)?
                .ok_or_else(|| Error::key_not_found(&hash))?;
            let blob_id = self
                .locate(repo, tree_id, &hash)?
                .ok_or_else(|| Error::key_not_found(&hash))?;
            let blob = repo.find_blob(blob_id).map_err(Error::git)?;
            String::from_utf8(blob.content().to_vec())
                .map_err(|e| Error::git_msg(format!("note is not UTF-8: {}", e)))
        })
    }

    /// Create or replace the note for `key`. One commit per call.
    pub fn set(&self, key: &str, text: &str) -> Result<()> {
        let hash = self.resolve_key(key)?;
        self.commit_changes(&[(hash, text.to_string())], &[], "Notes updated")
    }

    /// Delete the note for `key`, failing `KeyNotFound` when absent.
    pub fn delete(&self, key: &str) -> Result<()> {
        let hash = self.resolve_key(key)?;
        if self.with_repo(|repo| Ok(self.tip_tree(repo)?.is_none()))? {
            return Err(Error::key_not_found(&hash));
        }
        self.commit_changes(&[], &[hash], "Notes updated")
    }

    /// Whether a note exists for `key`.
    pub fn has(&self, key: &str) -> Result<bool> {
        let hash = self.resolve_key(key)?;
        self.with_repo(|repo| match self.tip_tree(repo)? {
            None => Ok(false),
            Some(tree_id) => Ok(self.locate(repo, tree_id, &hash)?.is_some()),
        })
    }

    /// Every noted hash, ascending, across both layouts.
    pub fn list(&self) -> Result<Vec<String>> {
        self.with_repo(|repo| {
            let Some(tree_id) = self.tip_tree(repo)? else {
                return Ok(Vec::new());
            };
            let mut hashes: Vec<String> =
                self.collect(repo, tree_id)?.into_iter().map(|(h, _)| h).collect();
            hashes.sort();
            Ok(hashes)
        })
    }

    /// Number of notes in the namespace.
    pub fn len(&self) -> Result<usize> {
        self.with_repo(|repo| match self.tip_tree(repo)? {
            None => Ok(0),
            Some(tree_id) => Ok(self.collect(repo, tree_id)?.len()),
        })
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// A [`NotesBatch`] staging writes and deletes for one commit.
    pub fn batch(&self) -> NotesBatch {
        NotesBatch {
            notes: self.clone(),
            writes: Vec::new(),
            deletes: Vec::new(),
        }
    }
}

impl std::fmt::Display for Notes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Notes({:?})", self.namespace)
    }
}

/// Accumulates note writes and deletes for a single commit, with the same
/// last-write-wins staging as the file [`Batch`](crate::Batch).
pub struct NotesBatch {
    notes: Notes,
    writes: Vec<(String, String)>,
    deletes: Vec<String>,
}

impl NotesBatch {
    /// Stage a note write for `key`.
    pub fn set(&mut self, key: &str, text: &str) -> Result<()> {
        let hash = self.notes.resolve_key(key)?;
        self.deletes.retain(|h| h != &hash);
        self.writes.retain(|(h, _)| h != &hash);
        self.writes.push((hash, text.to_string()));
        Ok(())
    }

    /// Stage a note delete for `key`.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        let hash = self.notes.resolve_key(key)?;
        self.writes.retain(|(h, _)| h != &hash);
        if !self.deletes.contains(&hash) {
            self.deletes.push(hash);
        }
        Ok(())
    }

    /// Number of staged operations.
    pub fn staged(&self) -> usize {
        self.writes.len() + self.deletes.len()
    }

    /// Apply everything staged in one commit. A batch with nothing staged
    /// is a no-op.
    pub fn commit(self) -> Result<()> {
        if self.writes.is_empty() && self.deletes.is_empty() {
            return Ok(());
        }
        let count = self.writes.len() + self.deletes.len();
        self.notes.commit_changes(
            &self.writes,
            &self.deletes,
            &format!("Notes batch update ({} changes)", count),
        )
    }
}
