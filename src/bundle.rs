//! Self-contained bundle files: a v2 header listing ref tips followed by a
//! packfile covering their reachable history.
//!
//! ```text
//! # v2 git bundle\n
//! <40-hex> <ref-name>\n
//! ...
//! \n
//! <packfile bytes>
//! ```
//!
//! Prerequisite lines (leading `-`) are tolerated on read and ignored;
//! `HEAD` never appears in the table.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::mirror::{diff_refs, local_refs, resolve_ref_filter};
use crate::types::{MirrorDiff, RefChange};

const V2_SIGNATURE: &[u8] = b"# v2 git bundle\n";

/// Parse a v2 bundle header into `{ref name -> id}` plus the byte offset
/// where the packfile starts.
pub(crate) fn parse_header(data: &[u8]) -> Result<(HashMap<String, String>, usize)> {
    if data.len() < V2_SIGNATURE.len() || &data[..V2_SIGNATURE.len()] != V2_SIGNATURE {
        return Err(Error::git_msg("not a v2 git bundle"));
    }

    let header_end = data
        .windows(2)
        .position(|w| w == b"\n\n")
        .ok_or_else(|| Error::git_msg("bundle header missing blank-line terminator"))?;

    // An empty ref table makes the signature's newline half of the
    // terminator pair; clamp so the slice stays in bounds.
    let body = if header_end >= V2_SIGNATURE.len() {
        &data[V2_SIGNATURE.len()..header_end]
    } else {
        &[][..]
    };

    let mut refs = HashMap::new();
    let header = String::from_utf8_lossy(body);
    for line in header.lines() {
        if line.is_empty() || line.starts_with('-') {
            continue; // prerequisite lines are tolerated, not honored
        }
        let Some((id, name)) = line.split_once(' ') else {
            continue;
        };
        if id.is_empty() || name == "HEAD" || name.ends_with("^{}") {
            continue;
        }
        refs.insert(name.to_string(), id.to_string());
    }

    Ok((refs, header_end + 2))
}

fn select(
    all: HashMap<String, String>,
    filter: Option<&[String]>,
) -> HashMap<String, String> {
    match filter {
        Some(names) => {
            let resolved = resolve_ref_filter(names, &all);
            all.into_iter()
                .filter(|(name, _)| resolved.contains(name))
                .collect()
        }
        None => all,
    }
}

/// Write a bundle at `dest` covering the selected local refs and their
/// reachable history.
pub(crate) fn export(repo_path: &Path, dest: &str, filter: Option<&[String]>) -> Result<()> {
    let repo = git2::Repository::open_bare(repo_path).map_err(Error::git)?;
    let selected = select(local_refs(repo_path)?, filter);
    if selected.is_empty() {
        return Err(Error::git_msg("no refs to bundle"));
    }

    // Pack the full ancestry of every selected tip, not just the tip
    // objects themselves.
    let mut packer = repo.packbuilder().map_err(Error::git)?;
    let mut walk = repo.revwalk().map_err(Error::git)?;
    for id in selected.values() {
        let oid = git2::Oid::from_str(id).map_err(Error::git)?;
        walk.push(oid).map_err(Error::git)?;
    }
    packer.insert_walk(&mut walk).map_err(Error::git)?;

    let mut pack = git2::Buf::new();
    packer.write_buf(&mut pack).map_err(Error::git)?;

    let mut header = String::from_utf8_lossy(V2_SIGNATURE).into_owned();
    let mut names: Vec<&String> = selected.keys().collect();
    names.sort();
    for name in names {
        header.push_str(&selected[name]);
        header.push(' ');
        header.push_str(name);
        header.push('\n');
    }
    header.push('\n');

    let dest_path = Path::new(dest);
    let mut file = std::fs::File::create(dest_path).map_err(|e| Error::io_at(dest_path, e))?;
    file.write_all(header.as_bytes())
        .map_err(|e| Error::io_at(dest_path, e))?;
    file.write_all(&pack)
        .map_err(|e| Error::io_at(dest_path, e))?;

    debug!(dest, refs = selected.len(), pack_bytes = pack.len(), "bundle written");
    Ok(())
}

/// Index a bundle's packfile into the local object store and set the
/// selected refs (force). Local refs outside the bundle are preserved.
pub(crate) fn import(repo_path: &Path, src: &str, filter: Option<&[String]>) -> Result<()> {
    let src_path = Path::new(src);
    let data = std::fs::read(src_path).map_err(|e| Error::io_at(src_path, e))?;
    let (all_refs, pack_offset) = parse_header(&data)?;

    let selected = select(all_refs, filter);
    if selected.is_empty() {
        return Ok(());
    }

    // The indexer writes the pack and its .idx straight into objects/pack,
    // so the refs become resolvable as soon as it commits.
    let pack_dir = repo_path.join("objects").join("pack");
    std::fs::create_dir_all(&pack_dir).map_err(|e| Error::io_at(&pack_dir, e))?;

    let mut indexer = git2::Indexer::new(None, &pack_dir, 0, false).map_err(Error::git)?;
    indexer
        .write_all(&data[pack_offset..])
        .map_err(|e| Error::git_msg(format!("pack indexing failed: {}", e)))?;
    indexer.commit().map_err(Error::git)?;

    let repo = git2::Repository::open_bare(repo_path).map_err(Error::git)?;
    for (name, id) in &selected {
        let oid = git2::Oid::from_str(id).map_err(Error::git)?;
        repo.reference(name, oid, true, "bundle import")
            .map_err(Error::git)?;
    }

    debug!(src, refs = selected.len(), "bundle imported");
    Ok(())
}

/// Diff for a bundle export: every selected ref reads as an add (a bundle
/// file starts empty).
pub(crate) fn export_diff(repo_path: &Path, filter: Option<&[String]>) -> Result<MirrorDiff> {
    let selected = select(local_refs(repo_path)?, filter);
    Ok(MirrorDiff {
        add: selected
            .into_iter()
            .map(|(ref_name, id)| RefChange {
                ref_name,
                old_id: None,
                new_id: Some(id),
            })
            .collect(),
        update: Vec::new(),
        delete: Vec::new(),
    })
}

/// Diff for a bundle import against the local refs; additive, so deletes
/// are dropped.
pub(crate) fn import_diff(
    repo_path: &Path,
    src: &str,
    filter: Option<&[String]>,
) -> Result<MirrorDiff> {
    let src_path = Path::new(src);
    let data = std::fs::read(src_path).map_err(|e| Error::io_at(src_path, e))?;
    let (all_refs, _) = parse_header(&data)?;

    let selected = select(all_refs, filter);
    let local = local_refs(repo_path)?;
    let mut diff = diff_refs(&selected, &local);
    diff.delete.clear();
    Ok(diff)
}
