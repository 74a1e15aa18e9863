//! Buffered streaming writers.
//!
//! [`SnapshotWriter`] buffers bytes in memory and commits a single write on
//! close; [`BatchWriter`] stages into a [`Batch`] instead. Both implement
//! [`std::io::Write`] and close themselves on drop.

use std::io;

use crate::batch::Batch;
use crate::error::Result;
use crate::snapshot::{Snapshot, WriteOptions};

/// Accumulates bytes and commits one write on [`close`](SnapshotWriter::close).
#[derive(Debug)]
pub struct SnapshotWriter {
    snap: Snapshot,
    path: String,
    buf: Vec<u8>,
    closed: bool,
}

impl SnapshotWriter {
    pub(crate) fn new(snap: Snapshot, path: String) -> Self {
        Self {
            snap,
            path,
            buf: Vec::new(),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Flush the buffer as one committed write and return the new snapshot.
    /// Closing twice returns the snapshot from the first close.
    pub fn close(&mut self) -> Result<Snapshot> {
        if self.closed {
            return Ok(self.snap.clone());
        }
        let data = std::mem::take(&mut self.buf);
        let next = self.snap.write(&self.path, &data, WriteOptions::default())?;
        self.snap = next.clone();
        self.closed = true;
        Ok(next)
    }
}

impl io::Write for SnapshotWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "write to closed writer",
            ));
        }
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

/// Accumulates bytes and stages one write into a [`Batch`] on
/// [`close`](BatchWriter::close).
pub struct BatchWriter<'a> {
    batch: &'a mut Batch,
    path: String,
    buf: Vec<u8>,
    closed: bool,
}

impl<'a> BatchWriter<'a> {
    pub(crate) fn new(batch: &'a mut Batch, path: String) -> Self {
        Self {
            batch,
            path,
            buf: Vec::new(),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Flush the buffer into the batch as one staged write.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let data = std::mem::take(&mut self.buf);
        self.batch.write(&self.path, &data)?;
        self.closed = true;
        Ok(())
    }
}

impl io::Write for BatchWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "write to closed writer",
            ));
        }
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for BatchWriter<'_> {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}
