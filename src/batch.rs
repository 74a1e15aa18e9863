use std::path::Path;

use crate::commit;
use crate::error::{Error, Result};
use crate::path;
use crate::snapshot::Snapshot;
use crate::stream::BatchWriter;
use crate::tree::{self, Stage};
use crate::types::{MODE_BLOB, MODE_LINK};

/// Accumulates writes and removes against one snapshot, committing them in
/// a single atomic commit.
///
/// Staging resolves conflicts per path: the last write wins, a later remove
/// supersedes an earlier write, and a write after a remove drops the
/// remove. `commit` consumes the batch, so further staging after the commit
/// is rejected at compile time. Batches are not meant to be shared across
/// threads; each holds a mutable staging buffer.
pub struct Batch {
    snap: Snapshot,
    writes: Vec<(String, Stage)>,
    removes: Vec<String>,
    message: Option<String>,
    operation: Option<String>,
    closed: bool,
}

impl Batch {
    pub(crate) fn new(snap: Snapshot, message: Option<String>, operation: Option<String>) -> Self {
        Self {
            snap,
            writes: Vec::new(),
            removes: Vec::new(),
            message,
            operation,
            closed: false,
        }
    }

    fn require_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::BatchClosed)
        } else {
            Ok(())
        }
    }

    fn stage_write(&mut self, norm: String, stage: Stage) {
        self.removes.retain(|p| p != &norm);
        self.writes.retain(|(p, _)| p != &norm);
        self.writes.push((norm, stage));
    }

    /// Stage a regular-file write.
    pub fn write(&mut self, path: &str, data: &[u8]) -> Result<()> {
        self.write_with_mode(path, data, MODE_BLOB)
    }

    /// Stage a write with an explicit tree-entry mode.
    pub fn write_with_mode(&mut self, path: &str, data: &[u8], mode: u32) -> Result<()> {
        self.require_open()?;
        let norm = path::normalize(path)?;
        if norm.is_empty() {
            return Err(Error::invalid_path("cannot write to the root"));
        }
        let stage = self.snap.stage_blob(data, mode)?;
        self.stage_write(norm, stage);
        Ok(())
    }

    /// Stage an import of one disk file, detecting executable/symlink modes.
    pub fn write_from_file(&mut self, path: &str, src: &Path) -> Result<()> {
        self.require_open()?;
        let mode = tree::mode_from_disk(src)?;
        let data = if mode == MODE_LINK {
            let target = std::fs::read_link(src).map_err(|e| Error::io_at(src, e))?;
            target.to_string_lossy().into_owned().into_bytes()
        } else {
            std::fs::read(src).map_err(|e| Error::io_at(src, e))?
        };
        self.write_with_mode(path, &data, mode)
    }

    /// Stage a symlink write.
    pub fn write_symlink(&mut self, path: &str, target: &str) -> Result<()> {
        self.write_with_mode(path, target.as_bytes(), MODE_LINK)
    }

    /// Stage a removal, superseding any pending write at the same path.
    pub fn remove(&mut self, path: &str) -> Result<()> {
        self.require_open()?;
        let norm = path::normalize(path)?;
        if norm.is_empty() {
            return Err(Error::invalid_path("cannot remove the root"));
        }
        self.writes.retain(|(p, _)| p != &norm);
        if !self.removes.contains(&norm) {
            self.removes.push(norm);
        }
        Ok(())
    }

    /// A buffered [`BatchWriter`] staging one write on close.
    pub fn writer(&mut self, path: &str) -> Result<BatchWriter<'_>> {
        self.require_open()?;
        let norm = path::normalize(path)?;
        if norm.is_empty() {
            return Err(Error::invalid_path("cannot write to the root"));
        }
        Ok(BatchWriter::new(self, norm))
    }

    /// Number of staged writes plus removes.
    pub fn staged(&self) -> usize {
        self.writes.len() + self.removes.len()
    }

    /// Whether the batch has been committed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Commit everything staged and return the new snapshot. A batch with
    /// nothing staged still commits, producing a commit that shares its
    /// parent's tree.
    pub fn commit(mut self) -> Result<Snapshot> {
        self.require_open()?;
        self.closed = true;

        let op = self.operation.as_deref().unwrap_or("batch");
        let message = self.message.take().unwrap_or_else(|| {
            format!(
                "{}: {} write(s), {} remove(s)",
                op,
                self.writes.len(),
                self.removes.len()
            )
        });

        commit::advance(&self.snap, &self.writes, &self.removes, &message)
    }
}
