use std::sync::Arc;

use crate::error::{Error, Result};
use crate::path::validate_ref_name;
use crate::snapshot::Snapshot;
use crate::store::Store;
use crate::types::ReflogEntry;

/// Typed view over the refs sharing one prefix.
///
/// `store.branches()` yields writable snapshots from `refs/heads/`;
/// `store.tags()` yields read-only ones from `refs/tags/`, and `set` there
/// refuses to overwrite an existing tag.
pub struct RefMap<'a> {
    store: &'a Store,
    prefix: &'static str,
}

impl<'a> RefMap<'a> {
    pub(crate) fn new(store: &'a Store, prefix: &'static str) -> Self {
        Self { store, prefix }
    }

    fn full_name(&self, name: &str) -> Result<String> {
        validate_ref_name(name)?;
        Ok(format!("{}{}", self.prefix, name))
    }

    fn is_branches(&self) -> bool {
        self.prefix == "refs/heads/"
    }

    fn snapshot_for(&self, id: git2::Oid, name: &str) -> Result<Snapshot> {
        Snapshot::from_commit(
            Arc::clone(&self.store.inner),
            id,
            Some(name.to_string()),
            Some(self.is_branches()),
        )
    }

    /// The snapshot at the named ref, or `KeyNotFound`.
    pub fn get(&self, name: &str) -> Result<Snapshot> {
        self.try_get(name)?
            .ok_or_else(|| Error::key_not_found(name))
    }

    /// The snapshot at the named ref, or `None` when absent.
    pub fn try_get(&self, name: &str) -> Result<Option<Snapshot>> {
        let refname = self.full_name(name)?;
        let id = {
            let repo = self
                .store
                .inner
                .repo
                .lock()
                .map_err(|e| Error::git_msg(e.to_string()))?;
            let resolved = match repo.find_reference(&refname) {
                Ok(r) => match r.resolve().map_err(Error::git)?.target() {
                    Some(id) => id,
                    None => return Ok(None),
                },
                Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
                Err(e) => return Err(Error::git(e)),
            };
            resolved
        };
        Ok(Some(self.snapshot_for(id, name)?))
    }

    /// Point the named ref at the commit of `snap`.
    ///
    /// Branch refs are overwritten; tag refs are created non-force and fail
    /// with `KeyExists` when the name is taken.
    pub fn set(&self, name: &str, snap: &Snapshot) -> Result<()> {
        let refname = self.full_name(name)?;
        let id = snap
            .commit_id
            .ok_or_else(|| Error::git_msg("snapshot has no commit"))?;

        let repo = self
            .store
            .inner
            .repo
            .lock()
            .map_err(|e| Error::git_msg(e.to_string()))?;

        let force = self.is_branches();
        let log = format!("{}: set {}", if force { "branch" } else { "tag" }, name);
        repo.reference(&refname, id, force, &log).map_err(|e| {
            if e.code() == git2::ErrorCode::Exists {
                Error::key_exists(name)
            } else {
                Error::git(e)
            }
        })?;
        Ok(())
    }

    /// [`set`](Self::set), then return the snapshot now bound to the ref.
    pub fn set_to(&self, name: &str, snap: &Snapshot) -> Result<Snapshot> {
        self.set(name, snap)?;
        self.get(name)
    }

    /// Delete the named ref, failing `KeyNotFound` when absent.
    pub fn delete(&self, name: &str) -> Result<()> {
        let refname = self.full_name(name)?;
        let repo = self
            .store
            .inner
            .repo
            .lock()
            .map_err(|e| Error::git_msg(e.to_string()))?;

        let mut reference = repo
            .find_reference(&refname)
            .map_err(|_| Error::key_not_found(name))?;
        reference.delete().map_err(Error::git)?;
        Ok(())
    }

    /// Whether the named ref exists.
    pub fn has(&self, name: &str) -> Result<bool> {
        let refname = self.full_name(name)?;
        let repo = self
            .store
            .inner
            .repo
            .lock()
            .map_err(|e| Error::git_msg(e.to_string()))?;
        let result = match repo.find_reference(&refname) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(false),
            Err(e) => Err(Error::git(e)),
        };
        result
    }

    /// All short names under this prefix, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.tips()?.into_iter().map(|(name, _)| name).collect();
        names.sort();
        Ok(names)
    }

    /// `(name, snapshot)` pairs for every ref under this prefix, sorted by
    /// name.
    pub fn iter(&self) -> Result<Vec<(String, Snapshot)>> {
        let mut tips = self.tips()?;
        tips.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out = Vec::with_capacity(tips.len());
        for (name, id) in tips {
            let snap = self.snapshot_for(id, &name)?;
            out.push((name, snap));
        }
        Ok(out)
    }

    fn tips(&self) -> Result<Vec<(String, git2::Oid)>> {
        let repo = self
            .store
            .inner
            .repo
            .lock()
            .map_err(|e| Error::git_msg(e.to_string()))?;

        let mut out = Vec::new();
        let glob = format!("{}*", self.prefix);
        for r in repo.references_glob(&glob).map_err(Error::git)? {
            let r = r.map_err(Error::git)?;
            let Some(full) = r.name() else { continue };
            let Some(short) = full.strip_prefix(self.prefix) else {
                continue;
            };
            let target = match r.target() {
                Some(id) => id,
                None => match r.resolve().ok().and_then(|r| r.target()) {
                    Some(id) => id,
                    None => continue,
                },
            };
            out.push((short.to_string(), target));
        }
        Ok(out)
    }

    /// The HEAD target's short name, when HEAD points inside this prefix.
    pub fn head(&self) -> Result<Option<String>> {
        let repo = self
            .store
            .inner
            .repo
            .lock()
            .map_err(|e| Error::git_msg(e.to_string()))?;

        let result = match repo.find_reference("HEAD") {
            Ok(head) => Ok(head
                .symbolic_target()
                .and_then(|t| t.strip_prefix(self.prefix))
                .map(|s| s.to_string())),
            Err(_) => Ok(None),
        };
        result
    }

    /// Point HEAD at the named ref within this prefix.
    pub fn set_head(&self, name: &str) -> Result<()> {
        let refname = self.full_name(name)?;
        let repo = self
            .store
            .inner
            .repo
            .lock()
            .map_err(|e| Error::git_msg(e.to_string()))?;
        repo.set_head(&refname).map_err(Error::git)?;
        Ok(())
    }

    /// Recorded movements of the named ref, most recent first. Empty when
    /// the repository records no reflog for it.
    pub fn reflog(&self, name: &str) -> Result<Vec<ReflogEntry>> {
        let refname = self.full_name(name)?;
        let repo = self
            .store
            .inner
            .repo
            .lock()
            .map_err(|e| Error::git_msg(e.to_string()))?;

        let reflog = match repo.reflog(&refname) {
            Ok(l) => l,
            Err(_) => return Ok(Vec::new()),
        };

        Ok(reflog
            .iter()
            .map(|entry| {
                let committer = entry.committer();
                ReflogEntry {
                    old_id: entry.id_old().to_string(),
                    new_id: entry.id_new().to_string(),
                    committer: format!(
                        "{} <{}>",
                        committer.name().unwrap_or_default(),
                        committer.email().unwrap_or_default()
                    ),
                    timestamp: committer.when().seconds().max(0) as u64,
                    message: entry.message().unwrap_or_default().to_string(),
                }
            })
            .collect())
    }
}
