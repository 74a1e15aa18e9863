//! Mirror transport: enumerate refs on both sides, diff, push or fetch.
//!
//! `backup` without a ref filter is a full mirror (force-push everything,
//! delete remote-only refs); with a filter only the named refs move and
//! nothing is deleted. `restore` is always additive. `.bundle`
//! destinations/sources switch both directions to the bundle codec.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::debug;

use crate::bundle;
use crate::error::{Error, Result};
use crate::types::{BackupOptions, MirrorDiff, RefChange, RestoreOptions};

// ---------------------------------------------------------------------------
// URL handling
// ---------------------------------------------------------------------------

fn has_scheme(url: &str) -> bool {
    ["http://", "https://", "git://", "ssh://"]
        .iter()
        .any(|s| url.starts_with(s))
}

fn is_local(url: &str) -> bool {
    !has_scheme(url)
}

/// Strip a `file://` prefix, leaving plain paths untouched.
fn local_path(url: &str) -> &str {
    url.strip_prefix("file://").unwrap_or(url)
}

/// Reject scp-style `user@host:path` and `host:path` shorthand; callers
/// must spell out `ssh://`.
pub(crate) fn reject_scp_style(url: &str) -> Result<()> {
    if has_scheme(url) || url.starts_with("file://") {
        return Ok(());
    }

    let rest = url.split_once('@').map(|(_, r)| r).unwrap_or(url);
    if let Some(colon) = rest.find(':') {
        let host = &rest[..colon];
        if colon > 1 && !host.contains('/') && !host.contains('\\') {
            return Err(Error::invalid_path(format!(
                "scp-style URL {:?} is not supported; use ssh:// instead",
                url
            )));
        }
    }
    Ok(())
}

/// Create a bare repository at a local destination that does not exist yet.
fn ensure_local_repo(url: &str) -> Result<()> {
    if !is_local(url) && !url.starts_with("file://") {
        return Ok(());
    }
    let path = Path::new(local_path(url));
    if path.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|e| Error::io_at(path, e))?;
    git2::Repository::init_bare(path).map_err(Error::git)?;
    Ok(())
}

fn is_bundle_path(path: &str) -> bool {
    path.to_ascii_lowercase().ends_with(".bundle")
}

// ---------------------------------------------------------------------------
// Ref enumeration and name resolution
// ---------------------------------------------------------------------------

/// `{full ref name -> 40-hex id}` for a local bare repository, excluding
/// `HEAD` and peeled `^{}` markers; symbolic refs resolve to their targets.
pub(crate) fn local_refs(repo_path: &Path) -> Result<HashMap<String, String>> {
    let repo = git2::Repository::open_bare(repo_path).map_err(Error::git)?;
    let mut out = HashMap::new();

    for r in repo.references().map_err(Error::git)? {
        let r = match r {
            Ok(r) => r,
            Err(_) => continue,
        };
        let Some(name) = r.name() else { continue };
        if name == "HEAD" || name.ends_with("^{}") {
            continue;
        }
        let target = match r.target() {
            Some(id) => id,
            None => match r.resolve().ok().and_then(|r| r.target()) {
                Some(id) => id,
                None => continue,
            },
        };
        out.insert(name.to_string(), target.to_string());
    }

    Ok(out)
}

/// Ref advertisement of the other side: local paths open directly, remote
/// URLs go through the transport's ls. Unreachable remotes read as empty.
fn remote_refs(repo_path: &Path, url: &str) -> Result<HashMap<String, String>> {
    if is_local(url) || url.starts_with("file://") {
        let path = Path::new(local_path(url));
        if !path.exists() {
            return Ok(HashMap::new());
        }
        return local_refs(path);
    }

    let repo = git2::Repository::open_bare(repo_path).map_err(Error::git)?;
    let mut remote = match repo.remote_anonymous(url) {
        Ok(r) => r,
        Err(_) => return Ok(HashMap::new()),
    };
    if remote.connect(git2::Direction::Fetch).is_err() {
        return Ok(HashMap::new());
    }

    let mut out = HashMap::new();
    if let Ok(heads) = remote.list() {
        for head in heads {
            let name = head.name();
            if name == "HEAD" || name.ends_with("^{}") {
                continue;
            }
            out.insert(name.to_string(), head.oid().to_string());
        }
    }
    let _ = remote.disconnect();
    Ok(out)
}

/// Expand short ref names against the available set: `refs/...` names pass
/// through; otherwise the first hit among `refs/heads/`, `refs/tags/`,
/// `refs/notes/` wins, defaulting to `refs/heads/<name>`.
pub(crate) fn resolve_ref_filter(
    names: &[String],
    available: &HashMap<String, String>,
) -> HashSet<String> {
    let mut out = HashSet::new();
    for name in names {
        if name.starts_with("refs/") {
            out.insert(name.clone());
            continue;
        }
        let hit = ["refs/heads/", "refs/tags/", "refs/notes/"]
            .iter()
            .map(|prefix| format!("{}{}", prefix, name))
            .find(|candidate| available.contains_key(candidate));
        out.insert(hit.unwrap_or_else(|| format!("refs/heads/{}", name)));
    }
    out
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Ref-level diff: names only in `src` are adds, shared names with
/// different ids are updates, names only in `dest` are deletes.
pub(crate) fn diff_refs(
    src: &HashMap<String, String>,
    dest: &HashMap<String, String>,
) -> MirrorDiff {
    let mut diff = MirrorDiff::new();

    for (name, id) in src {
        match dest.get(name) {
            None => diff.add.push(RefChange {
                ref_name: name.clone(),
                old_id: None,
                new_id: Some(id.clone()),
            }),
            Some(old) if old != id => diff.update.push(RefChange {
                ref_name: name.clone(),
                old_id: Some(old.clone()),
                new_id: Some(id.clone()),
            }),
            Some(_) => {}
        }
    }

    for (name, id) in dest {
        if !src.contains_key(name) {
            diff.delete.push(RefChange {
                ref_name: name.clone(),
                old_id: Some(id.clone()),
                new_id: None,
            });
        }
    }

    diff
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Full-mirror push: force refspecs for every local ref plus empty-source
/// refspecs deleting remote-only names.
fn mirror_push(
    repo_path: &Path,
    url: &str,
    local: &HashMap<String, String>,
    remote_side: &HashMap<String, String>,
) -> Result<()> {
    let repo = git2::Repository::open_bare(repo_path).map_err(Error::git)?;
    let mut remote = repo.remote_anonymous(url).map_err(Error::git)?;

    let mut refspecs: Vec<String> = local.keys().map(|r| format!("+{}:{}", r, r)).collect();
    refspecs.extend(
        remote_side
            .keys()
            .filter(|name| !local.contains_key(*name))
            .map(|name| format!(":{}", name)),
    );

    debug!(url, refspecs = refspecs.len(), "mirror push");
    let refspec_strs: Vec<&str> = refspecs.iter().map(String::as_str).collect();
    remote.push(&refspec_strs, None).map_err(Error::git)?;
    Ok(())
}

/// Push only the named refs, force, no deletes.
fn filtered_push(repo_path: &Path, url: &str, refs: &HashSet<String>) -> Result<()> {
    let repo = git2::Repository::open_bare(repo_path).map_err(Error::git)?;
    let mut remote = repo.remote_anonymous(url).map_err(Error::git)?;

    let refspecs: Vec<String> = refs.iter().map(|r| format!("+{}:{}", r, r)).collect();
    let refspec_strs: Vec<&str> = refspecs.iter().map(String::as_str).collect();
    remote.push(&refspec_strs, None).map_err(Error::git)?;
    Ok(())
}

/// Fetch refs from `url`, optionally restricted by the filter. Never
/// deletes a local ref.
fn additive_fetch(repo_path: &Path, url: &str, filter: Option<&[String]>) -> Result<()> {
    let advertised = remote_refs(repo_path, url)?;
    if advertised.is_empty() {
        return Ok(());
    }

    let wanted: Vec<&String> = match filter {
        Some(names) => {
            let resolved = resolve_ref_filter(names, &advertised);
            advertised
                .keys()
                .filter(|k| resolved.contains(k.as_str()))
                .collect()
        }
        None => advertised.keys().collect(),
    };
    if wanted.is_empty() {
        return Ok(());
    }

    let repo = git2::Repository::open_bare(repo_path).map_err(Error::git)?;
    let mut remote = repo.remote_anonymous(url).map_err(Error::git)?;

    let refspecs: Vec<String> = wanted.iter().map(|r| format!("+{}:{}", r, r)).collect();
    debug!(url, refspecs = refspecs.len(), "additive fetch");
    let refspec_strs: Vec<&str> = refspecs.iter().map(String::as_str).collect();
    remote
        .fetch(&refspec_strs, None, None)
        .map_err(Error::git)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Push refs (or write a bundle) to `dest` and return the applied diff.
pub(crate) fn backup(repo_path: &Path, dest: &str, opts: &BackupOptions) -> Result<MirrorDiff> {
    reject_scp_style(dest)?;

    if opts.bundle || is_bundle_path(dest) {
        let diff = bundle::export_diff(repo_path, opts.refs.as_deref())?;
        if !opts.dry_run {
            bundle::export(repo_path, dest, opts.refs.as_deref())?;
        }
        return Ok(diff);
    }

    ensure_local_repo(dest)?;
    let local = local_refs(repo_path)?;
    let remote_side = remote_refs(repo_path, dest)?;

    if let Some(ref names) = opts.refs {
        let selected = resolve_ref_filter(names, &local);
        let mut diff = diff_refs(&local, &remote_side);
        diff.add.retain(|c| selected.contains(&c.ref_name));
        diff.update.retain(|c| selected.contains(&c.ref_name));
        diff.delete.clear();

        if !opts.dry_run && !diff.in_sync() {
            filtered_push(repo_path, dest, &selected)?;
        }
        return Ok(diff);
    }

    let diff = diff_refs(&local, &remote_side);
    if !opts.dry_run && !diff.in_sync() {
        mirror_push(repo_path, dest, &local, &remote_side)?;
    }
    Ok(diff)
}

/// Fetch refs (or import a bundle) from `src` and return the applied diff.
/// The reported diff never contains deletes.
pub(crate) fn restore(repo_path: &Path, src: &str, opts: &RestoreOptions) -> Result<MirrorDiff> {
    reject_scp_style(src)?;

    if opts.bundle || is_bundle_path(src) {
        let diff = bundle::import_diff(repo_path, src, opts.refs.as_deref())?;
        if !opts.dry_run && !diff.in_sync() {
            bundle::import(repo_path, src, opts.refs.as_deref())?;
        }
        return Ok(diff);
    }

    let local = local_refs(repo_path)?;
    let advertised = remote_refs(repo_path, src)?;

    let mut diff = diff_refs(&advertised, &local);
    if let Some(ref names) = opts.refs {
        let selected = resolve_ref_filter(names, &advertised);
        diff.add.retain(|c| selected.contains(&c.ref_name));
        diff.update.retain(|c| selected.contains(&c.ref_name));
    }
    diff.delete.clear();

    if !opts.dry_run && !diff.in_sync() {
        additive_fetch(repo_path, src, opts.refs.as_deref())?;
    }
    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scp_style_rejected() {
        assert!(reject_scp_style("user@host:path").is_err());
        assert!(reject_scp_style("host:path").is_err());
    }

    #[test]
    fn non_scp_accepted() {
        assert!(reject_scp_style("/tmp/repo.git").is_ok());
        assert!(reject_scp_style("relative/path").is_ok());
        assert!(reject_scp_style("file:///tmp/x.git").is_ok());
        assert!(reject_scp_style("ssh://user@host/path").is_ok());
        assert!(reject_scp_style("https://host/path").is_ok());
        assert!(reject_scp_style("C:\\repos\\x").is_ok());
    }

    #[test]
    fn short_names_resolve_in_prefix_order() {
        let mut available = HashMap::new();
        available.insert("refs/heads/main".to_string(), "a".repeat(40));
        available.insert("refs/tags/v1".to_string(), "b".repeat(40));

        let resolved = resolve_ref_filter(&["main".into(), "v1".into()], &available);
        assert!(resolved.contains("refs/heads/main"));
        assert!(resolved.contains("refs/tags/v1"));
    }

    #[test]
    fn unknown_short_name_defaults_to_heads() {
        let resolved = resolve_ref_filter(&["ghost".into()], &HashMap::new());
        assert!(resolved.contains("refs/heads/ghost"));
    }

    #[test]
    fn diff_classifies_add_update_delete() {
        let mut src = HashMap::new();
        src.insert("refs/heads/a".to_string(), "1".repeat(40));
        src.insert("refs/heads/b".to_string(), "2".repeat(40));
        let mut dest = HashMap::new();
        dest.insert("refs/heads/b".to_string(), "3".repeat(40));
        dest.insert("refs/heads/c".to_string(), "4".repeat(40));

        let diff = diff_refs(&src, &dest);
        assert_eq!(diff.add.len(), 1);
        assert_eq!(diff.add[0].ref_name, "refs/heads/a");
        assert_eq!(diff.update.len(), 1);
        assert_eq!(diff.update[0].ref_name, "refs/heads/b");
        assert_eq!(diff.delete.len(), 1);
        assert_eq!(diff.delete[0].ref_name, "refs/heads/c");
    }
}
