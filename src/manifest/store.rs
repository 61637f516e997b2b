//! Exclusive read-modify-write access to the manifest document.
//!
//! `update` acquires an exclusive file lock on a sidecar lock file, reads
//! the manifest, invokes the mutator, writes the result atomically (temp
//! file + fsync + rename), then releases the lock. Reads outside of
//! `update` are lock-free and may observe a pre- or post-state, never a
//! torn write.

use std::fs::{self, File};
use std::io::Write;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use fs4::fs_std::FileExt;

use crate::error::PpgError;
use crate::paths::Paths;

use super::types::Manifest;

const LOCK_STALE_AFTER: Duration = Duration::from_secs(10);
const LOCK_MAX_RETRIES: u32 = 5;
const LOCK_BACKOFF_START: Duration = Duration::from_millis(100);
const LOCK_BACKOFF_MAX: Duration = Duration::from_millis(1000);

/// A held exclusive lock on the manifest's sidecar lock file. Released when
/// dropped.
struct ManifestLock {
    file: File,
}

impl Drop for ManifestLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_is_stale(lock_path: &std::path::Path) -> bool {
    let Ok(meta) = fs::metadata(lock_path) else {
        return false;
    };
    let Ok(modified) = meta.modified() else {
        return false;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age > LOCK_STALE_AFTER,
        Err(_) => false,
    }
}

fn acquire_lock(paths: &Paths) -> Result<ManifestLock> {
    let lock_path = paths.lock_path();
    let file = File::create(&lock_path)
        .with_context(|| format!("Failed to open lock file at {}", lock_path.display()))?;

    let mut backoff = LOCK_BACKOFF_START;
    for attempt in 0..=LOCK_MAX_RETRIES {
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => return Ok(ManifestLock { file }),
            Err(_) if attempt == LOCK_MAX_RETRIES => break,
            Err(_) => {
                if lock_is_stale(&lock_path) {
                    // Another holder is assumed dead; touch the file so we don't
                    // immediately re-declare it stale, and retry the lock attempt
                    // without counting down the backoff.
                    let _ = File::create(&lock_path);
                    continue;
                }
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(LOCK_BACKOFF_MAX);
            }
        }
    }

    Err(PpgError::ManifestLock.into())
}

/// Initialize the project's `.ppg/` directory tree and an empty manifest.
/// Idempotent: calling this on an already-initialized project is a no-op.
pub fn init(paths: &Paths, session_name: &str) -> Result<()> {
    for dir in paths.all_dirs() {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory at {}", dir.display()))?;
    }

    let manifest_path = paths.manifest_path();
    if manifest_path.exists() {
        return Ok(());
    }

    let manifest = Manifest::new(paths.project_root().to_path_buf(), session_name.to_string());
    write_atomic(&manifest_path, &manifest)
}

/// Read the manifest without taking the lock. Tolerates being called by
/// observers (dashboards, `status`) that accept eventual consistency.
pub fn read(paths: &Paths) -> Result<Manifest> {
    let manifest_path = paths.manifest_path();
    let contents = fs::read_to_string(&manifest_path)
        .map_err(|_| anyhow::Error::new(PpgError::NotInitialized))?;
    serde_json::from_str(&contents).map_err(|_| anyhow::Error::new(PpgError::NotInitialized))
}

fn write_atomic(manifest_path: &std::path::Path, manifest: &Manifest) -> Result<()> {
    let dir = manifest_path
        .parent()
        .ok_or_else(|| anyhow!("Manifest path has no parent directory"))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .context("Failed to create temp file for atomic manifest write")?;

    let json = serde_json::to_string_pretty(manifest).context("Failed to serialize manifest")?;
    tmp.write_all(json.as_bytes())
        .context("Failed to write manifest contents")?;
    tmp.as_file().sync_all().context("Failed to fsync manifest temp file")?;

    tmp.persist(manifest_path)
        .with_context(|| format!("Failed to rename manifest into place at {}", manifest_path.display()))?;
    Ok(())
}

/// Acquire the exclusive lock, read the manifest, invoke `mutate` with the
/// current state, write the (possibly new) state back atomically, and
/// release the lock. `mutate` may mutate the passed manifest in place and
/// return it, or build and return a new one.
pub fn update<F>(paths: &Paths, mutate: F) -> Result<Manifest>
where
    F: FnOnce(Manifest) -> Result<Manifest>,
{
    let _lock = acquire_lock(paths)?;

    let current = read(paths)?;
    let mut next = mutate(current)?;
    next.updated_at = Utc::now();

    write_atomic(&paths.manifest_path(), &next)?;
    Ok(next)
}
