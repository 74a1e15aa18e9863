//! Cross-process writer lock.
//!
//! Writers serialize on an advisory lock over `<repo>/vost.lock`. Readers
//! never touch it. Acquisition is non-blocking with a 50 ms retry interval
//! and a 30 s deadline so a crashed peer holding the file surfaces as a
//! descriptive error instead of a hang.

use std::fs::OpenOptions;
use std::path::Path;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{Error, Result};

const RETRY_INTERVAL: Duration = Duration::from_millis(50);
const ACQUIRE_DEADLINE: Duration = Duration::from_secs(30);

/// Run `f` while holding the repository write lock.
///
/// The lock is released on every exit path, including errors from `f`.
pub fn with_write_lock<F, T>(gitdir: &Path, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let lock_path = gitdir.join("vost.lock");

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| Error::io_at(&lock_path, e))?;

    let started = Instant::now();
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => break,
            Err(_) if started.elapsed() < ACQUIRE_DEADLINE => {
                std::thread::sleep(RETRY_INTERVAL);
            }
            Err(e) => {
                return Err(Error::io_at(
                    &lock_path,
                    std::io::Error::new(
                        e.kind(),
                        format!("could not acquire repository lock within 30s: {}", e),
                    ),
                ));
            }
        }
    }

    let result = f();
    let _ = fs2::FileExt::unlock(&file);
    result
}
