use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::notes::Notes;
use crate::refs::RefMap;
use crate::snapshot::Snapshot;
use crate::types::{BackupOptions, MirrorDiff, OpenOptions, RestoreOptions, Signature};

/// Shared state behind every [`Store`], [`Snapshot`], [`RefMap`], and
/// [`Notes`] value. The mutex serializes all libgit2 calls on the handle.
pub(crate) struct StoreInner {
    pub(crate) repo: Mutex<git2::Repository>,
    pub(crate) path: PathBuf,
    pub(crate) signature: Signature,
}

impl std::fmt::Debug for StoreInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreInner")
            .field("path", &self.path)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// A versioned filesystem backed by a bare git repository.
///
/// Named refs (branches, tags) map to immutable [`Snapshot`]s of a
/// directory tree; every mutation commits and advances a branch. Cheap to
/// clone — all clones share one repository handle.
///
/// # Example
///
/// ```rust,no_run
/// use vost::{Store, OpenOptions, WriteOptions};
///
/// let store = Store::open("/tmp/data.git", OpenOptions {
///     create: true,
///     branch: Some("main".into()),
///     ..Default::default()
/// }).unwrap();
///
/// let snap = store.branches().get("main").unwrap();
/// let snap = snap.write_text("greeting.txt", "hello", WriteOptions::default()).unwrap();
/// assert_eq!(snap.read_text("greeting.txt").unwrap(), "hello");
/// ```
#[derive(Clone, Debug)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

impl Store {
    /// Open a bare repository, creating it when `options.create` is set.
    ///
    /// Creation initializes the repository with reflog recording enabled
    /// (`core.logAllRefUpdates=always`, required for undo/redo), writes the
    /// signature into the repository config, and, when `options.branch` is
    /// given, creates that branch with an initial empty-tree commit and
    /// points `HEAD` at it.
    pub fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let signature = Signature {
            name: options.author.unwrap_or_else(|| Signature::default().name),
            email: options.email.unwrap_or_else(|| Signature::default().email),
        };

        let repo = if path.exists() {
            git2::Repository::open_bare(&path).map_err(Error::git)?
        } else if options.create {
            std::fs::create_dir_all(&path).map_err(|e| Error::io_at(&path, e))?;
            let repo = git2::Repository::init_bare(&path).map_err(Error::git)?;

            let mut config = repo.config().map_err(Error::git)?;
            // Bare repositories skip reflogs by default; undo/redo needs them,
            // recorded under our identity.
            config
                .set_str("core.logAllRefUpdates", "always")
                .map_err(Error::git)?;
            config
                .set_str("user.name", &signature.name)
                .map_err(Error::git)?;
            config
                .set_str("user.email", &signature.email)
                .map_err(Error::git)?;

            if let Some(ref branch) = options.branch {
                crate::path::validate_ref_name(branch)?;
                Self::bootstrap_branch(&repo, branch, &signature)?;
            }

            repo
        } else {
            return Err(Error::not_found(format!(
                "repository not found: {}",
                path.display()
            )));
        };

        Ok(Store {
            inner: Arc::new(StoreInner {
                repo: Mutex::new(repo),
                path,
                signature,
            }),
        })
    }

    /// First commit on a fresh branch: empty tree, no parents, HEAD attached.
    fn bootstrap_branch(
        repo: &git2::Repository,
        branch: &str,
        signature: &Signature,
    ) -> Result<()> {
        let mut builder = repo.treebuilder(None).map_err(Error::git)?;
        let tree_id = builder.write().map_err(Error::git)?;
        let tree = repo.find_tree(tree_id).map_err(Error::git)?;

        let sig = git2::Signature::now(&signature.name, &signature.email).map_err(Error::git)?;
        let refname = format!("refs/heads/{}", branch);
        repo.commit(
            Some(&refname),
            &sig,
            &sig,
            &format!("Initialize {}", branch),
            &tree,
            &[],
        )
        .map_err(Error::git)?;

        repo.set_head(&refname).map_err(Error::git)?;
        Ok(())
    }

    /// Branches under `refs/heads/`. Snapshots obtained here are writable.
    pub fn branches(&self) -> RefMap<'_> {
        RefMap::new(self, "refs/heads/")
    }

    /// Tags under `refs/tags/`. Snapshots obtained here are read-only, and
    /// `set` refuses to overwrite an existing tag.
    pub fn tags(&self) -> RefMap<'_> {
        RefMap::new(self, "refs/tags/")
    }

    /// The notes namespace backed by `refs/notes/<ns>`.
    pub fn notes(&self, namespace: &str) -> Result<Notes> {
        crate::path::validate_ref_name(namespace)?;
        Ok(Notes::new(Arc::clone(&self.inner), namespace))
    }

    /// A detached, read-only snapshot at the commit identified by `hash`.
    pub fn fs(&self, hash: &str) -> Result<Snapshot> {
        crate::path::validate_hash(hash)?;
        let id = git2::Oid::from_str(hash).map_err(|_| Error::invalid_hash(hash))?;
        Snapshot::from_commit(Arc::clone(&self.inner), id, None, Some(false))
    }

    /// Path of the bare repository directory.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The identity applied to every commit this store creates.
    pub fn signature(&self) -> &Signature {
        &self.inner.signature
    }

    /// Push refs to `dest` — another bare repository, a transport URL, or a
    /// `.bundle` file. Without a ref filter this is a full mirror (remote-only
    /// refs are deleted); with one, only the named refs are pushed.
    pub fn backup(&self, dest: &str, opts: &BackupOptions) -> Result<MirrorDiff> {
        crate::mirror::backup(&self.inner.path, dest, opts)
    }

    /// Fetch refs from `src` — a bare repository, a transport URL, or a
    /// `.bundle` file. Always additive: local refs are never deleted.
    pub fn restore(&self, src: &str, opts: &RestoreOptions) -> Result<MirrorDiff> {
        crate::mirror::restore(&self.inner.path, src, opts)
    }
}
