//! Include/exclude filtering for copy and sync operations.
//!
//! Include patterns are plain globs checked against the basename and the
//! full repository-relative path. Exclude rules follow `.gitignore`
//! conventions: `!` re-includes a previously excluded path, a trailing `/`
//! restricts the rule to directories, comments and blank lines are skipped,
//! and the last matching rule wins. Exclude matching does not apply dotfile
//! protection, so `*.pyc` matches `.cached.pyc`.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::glob;

#[derive(Debug, Clone)]
struct Rule {
    /// Pattern with `!` prefix and `/` suffix stripped.
    pattern: String,
    negated: bool,
    dir_only: bool,
}

impl Rule {
    fn matches(&self, rel_path: &str) -> bool {
        if self.pattern.contains('/') {
            glob::wildcard_match(self.pattern.as_bytes(), rel_path.as_bytes())
        } else {
            let base = rel_path.rsplit('/').next().unwrap_or(rel_path);
            glob::wildcard_match(self.pattern.as_bytes(), base.as_bytes())
        }
    }
}

/// Ordered gitignore-style exclude rules.
#[derive(Debug, Clone, Default)]
pub struct ExcludeRules {
    rules: Vec<Rule>,
}

impl ExcludeRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and append patterns. Blank lines, comments, and patterns that
    /// are empty after stripping are skipped.
    pub fn add_patterns<S: AsRef<str>>(&mut self, patterns: &[S]) {
        for raw in patterns {
            let trimmed = raw.as_ref().trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let (negated, rest) = match trimmed.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, trimmed),
            };
            let (dir_only, pattern) = match rest.strip_suffix('/') {
                Some(stripped) => (true, stripped),
                None => (false, rest),
            };
            if pattern.is_empty() {
                continue;
            }

            self.rules.push(Rule {
                pattern: pattern.to_string(),
                negated,
                dir_only,
            });
        }
    }

    /// Append patterns from a file, one per line. A missing file is not an
    /// error, so callers can pass a path that may not exist yet.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let contents = fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
        let lines: Vec<&str> = contents.lines().map(|l| l.trim_end()).collect();
        self.add_patterns(&lines);
        Ok(())
    }

    /// Whether `rel_path` is excluded. Last matching rule wins; dir-only
    /// rules are skipped when `is_dir` is false.
    pub fn excluded(&self, rel_path: &str, is_dir: bool) -> bool {
        let mut out = false;
        for rule in &self.rules {
            if rule.dir_only && !is_dir {
                continue;
            }
            if rule.matches(rel_path) {
                out = !rule.negated;
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Combined include/exclude filter applied to repository-relative paths.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Vec<String>,
    exclude: ExcludeRules,
}

impl PathFilter {
    /// Build a filter from option-struct fields. Any argument may be `None`.
    pub fn build(
        include: Option<&[String]>,
        exclude: Option<&[String]>,
        exclude_from: Option<&Path>,
    ) -> Result<Self> {
        let mut rules = ExcludeRules::new();
        if let Some(pats) = exclude {
            rules.add_patterns(pats);
        }
        if let Some(path) = exclude_from {
            rules.load_file(path)?;
        }
        Ok(Self {
            include: include.map(|p| p.to_vec()).unwrap_or_default(),
            exclude: rules,
        })
    }

    /// Whether `rel_path` passes the filter. With no include patterns every
    /// path is a candidate; exclude rules are applied second.
    pub fn admits(&self, rel_path: &str, is_dir: bool) -> bool {
        if !self.include.is_empty() {
            let base = rel_path.rsplit('/').next().unwrap_or(rel_path);
            let included = self.include.iter().any(|pat| {
                glob::segment_match(pat, base) || glob::segment_match(pat, rel_path)
            });
            if !included {
                return false;
            }
        }
        !self.exclude.excluded(rel_path, is_dir)
    }
}
