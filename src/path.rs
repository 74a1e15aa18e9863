//! Path normalization and name validation shared by every operation.

use crate::error::{Error, Result};

/// Canonicalize a store path.
///
/// Splits on `/`, drops empty segments (leading, trailing, and doubled
/// slashes) and `.` segments, and rejects `..`. The empty string and
/// all-slash inputs both denote the root and normalize to `""`; an input
/// with non-slash content that reduces to nothing (e.g. `"."`) is rejected.
pub fn normalize(path: &str) -> Result<String> {
    if path.is_empty() {
        return Ok(String::new());
    }

    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                return Err(Error::invalid_path(format!(
                    "'..' segment not allowed in {:?}",
                    path
                )))
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        if path.bytes().all(|b| b == b'/') {
            return Ok(String::new());
        }
        return Err(Error::invalid_path(format!(
            "path {:?} has no usable segments",
            path
        )));
    }

    Ok(segments.join("/"))
}

/// `true` for the root forms: empty string or slashes only.
pub fn is_root(path: &str) -> bool {
    path.bytes().all(|b| b == b'/')
}

/// Validate a reference name against the git `check-ref-format` subset this
/// crate enforces.
pub fn validate_ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_ref_name("ref name must not be empty"));
    }

    if let Some(bad) = name
        .chars()
        .find(|c| matches!(c, ':' | ' ' | '\t' | '\n' | '\r' | '\\' | '^' | '~' | '?' | '*' | '['))
    {
        return Err(Error::invalid_ref_name(format!(
            "ref name {:?} contains {:?}",
            name, bad
        )));
    }

    if name.contains("..") {
        return Err(Error::invalid_ref_name(format!(
            "ref name {:?} contains '..'",
            name
        )));
    }
    if name.contains("@{") {
        return Err(Error::invalid_ref_name(format!(
            "ref name {:?} contains '@{{'",
            name
        )));
    }
    if name.ends_with('.') {
        return Err(Error::invalid_ref_name(format!(
            "ref name {:?} ends with '.'",
            name
        )));
    }
    if name.ends_with(".lock") {
        return Err(Error::invalid_ref_name(format!(
            "ref name {:?} ends with '.lock'",
            name
        )));
    }

    Ok(())
}

/// Require exactly 40 lowercase hex characters.
pub fn validate_hash(hash: &str) -> Result<()> {
    if is_hex40(hash) {
        Ok(())
    } else {
        Err(Error::invalid_hash(hash))
    }
}

/// `true` when `s` is a well-formed 40-char lowercase hex id.
pub fn is_hex40(s: &str) -> bool {
    s.len() == 40
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
