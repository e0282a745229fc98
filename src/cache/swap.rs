//! Atomic file replacement for small state files.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for unique temp file names within a process
static SWAP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Atomically replace the contents of `path`.
///
/// Writes to a temp file next to `path`, then renames it over the target.
/// The rename is atomic on POSIX, so readers see either the old or the new
/// contents and never a partial write.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    loop {
        // {path}.tmp.{pid}.{counter}; retry if left behind by a prior crash.
        let counter = SWAP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let unique_id = format!("{}.{}", std::process::id(), counter);
        let temp_path = path.with_extension(format!("tmp.{}", unique_id));

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        };

        let written = file.write_all(contents).and_then(|()| file.sync_all());
        drop(file);

        if let Err(e) = written.and_then(|()| std::fs::rename(&temp_path, path)) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }

        return Ok(());
    }
}
