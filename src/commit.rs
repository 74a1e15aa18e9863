//! The commit / compare-and-swap engine.
//!
//! Every mutation funnels through [`advance`]: under the cross-process
//! write lock and the store mutex it re-reads the branch tip, verifies the
//! snapshot is still the pre-image, rebuilds the tree, writes the commit,
//! and moves the ref. The (lock, CAS) pair makes branch history linear even
//! across OS processes sharing the repository directory.

use std::sync::Arc;

use git2::Oid;
use tracing::debug;

use crate::error::{Error, Result};
use crate::lock::with_write_lock;
use crate::snapshot::Snapshot;
use crate::tree::{self, Stage};

/// Commit `writes`/`removes` on top of `snap` and advance its branch.
///
/// Preconditions: `snap` is writable and branch-bound, and all paths are
/// normalized with at most one action per path. Always produces a commit
/// once called, even when the rebuilt tree equals the parent's.
pub(crate) fn advance(
    snap: &Snapshot,
    writes: &[(String, Stage)],
    removes: &[String],
    message: &str,
) -> Result<Snapshot> {
    let branch = snap.require_writable("commit through")?.to_string();
    let refname = format!("refs/heads/{}", branch);
    let inner = Arc::clone(&snap.inner);

    let (commit_id, tree_id) = with_write_lock(&inner.path, || {
        let repo = inner
            .repo
            .lock()
            .map_err(|e| Error::git_msg(e.to_string()))?;

        // CAS pre-image check: the branch must still point at this snapshot.
        let tip = match repo.find_reference(&refname) {
            Ok(r) => r.target(),
            Err(e) if e.code() == git2::ErrorCode::NotFound => None,
            Err(e) => return Err(Error::git(e)),
        };
        match (tip, snap.commit_id) {
            (Some(actual), expected) if expected != Some(actual) => {
                return Err(Error::stale_snapshot(format!(
                    "branch {:?} moved: expected {}, found {}",
                    branch,
                    expected.map(|o| o.to_string()).unwrap_or_else(|| "none".into()),
                    actual
                )));
            }
            _ => {}
        }

        let base = snap.tree_id.unwrap_or_else(Oid::zero);
        let new_tree_id = tree::rebuild(&repo, base, writes, removes)?;

        let sig = git2::Signature::now(&inner.signature.name, &inner.signature.email)
            .map_err(Error::git)?;
        let new_tree = repo.find_tree(new_tree_id).map_err(Error::git)?;

        let parent = snap
            .commit_id
            .map(|id| repo.find_commit(id))
            .transpose()
            .map_err(Error::git)?;
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        // Ref update is done separately below so the CAS stays explicit.
        let new_commit_id = repo
            .commit(None, &sig, &sig, message, &new_tree, &parents)
            .map_err(Error::git)?;

        let log = format!("commit: {}", message);
        match tip {
            Some(old) => {
                repo.reference_matching(&refname, new_commit_id, true, old, &log)
                    .map_err(Error::git)?;
            }
            None => {
                repo.reference(&refname, new_commit_id, false, &log)
                    .map_err(|e| {
                        if e.code() == git2::ErrorCode::Exists {
                            Error::stale_snapshot(format!(
                                "branch {:?} was created concurrently",
                                branch
                            ))
                        } else {
                            Error::git(e)
                        }
                    })?;
            }
        }

        debug!(
            branch = %branch,
            commit = %new_commit_id,
            writes = writes.len(),
            removes = removes.len(),
            "committed"
        );

        Ok((new_commit_id, new_tree_id))
    })?;

    Ok(Snapshot {
        inner,
        commit_id: Some(commit_id),
        tree_id: Some(tree_id),
        ref_name: snap.ref_name.clone(),
        writable: snap.writable,
        changes: None,
    })
}

/// Move `refname` through `chain` (one reflog'd update per element) if the
/// tip still equals `expected`. Undo walks its targets one commit at a
/// time so each step leaves a reflog entry redo can consume; redo passes a
/// single-element chain.
pub(crate) fn reset_chain(
    inner: &Arc<crate::store::StoreInner>,
    branch: &str,
    expected: Oid,
    chain: &[Oid],
    log_message: &str,
) -> Result<()> {
    let refname = format!("refs/heads/{}", branch);
    with_write_lock(&inner.path, || {
        let repo = inner
            .repo
            .lock()
            .map_err(|e| Error::git_msg(e.to_string()))?;

        let tip = repo
            .find_reference(&refname)
            .map_err(|_| Error::not_found(format!("branch {:?} not found", branch)))?
            .target()
            .ok_or_else(|| Error::git_msg("branch is unexpectedly symbolic"))?;
        if tip != expected {
            return Err(Error::stale_snapshot(format!(
                "branch {:?} moved: expected {}, found {}",
                branch, expected, tip
            )));
        }

        let mut current = tip;
        for &next in chain {
            repo.reference_matching(&refname, next, true, current, log_message)
                .map_err(Error::git)?;
            current = next;
        }
        debug!(branch = %branch, target = %current, msg = log_message, "ref reset");
        Ok(())
    })
}
