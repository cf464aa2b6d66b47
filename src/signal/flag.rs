//! One-shot boolean flags shared between processes.
//!
//! A flag is a small file mapped into every process that holds a handle.
//! The first word of the mapping is used as an atomic; since every process
//! maps the same pages, a store in one process is visible to loads in all
//! others, and the value outlives the process that set it.

use crate::error::{RecorderError, Result};
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const FLAG_LEN: u64 = 8;
const SET: u32 = 1;

/// A cross-process flag that starts unset and can be set exactly once.
///
/// Cloning a handle shares the same mapping.
#[derive(Clone)]
pub struct SharedFlag {
    path: PathBuf,
    map: Arc<MmapMut>,
}

impl SharedFlag {
    /// Create a fresh, unset flag at `path`, replacing any existing file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| RecorderError::flag(&path, e))?;
        file.set_len(FLAG_LEN)
            .map_err(|e| RecorderError::flag(&path, e))?;
        Self::map(path, &file)
    }

    /// Attach to a flag created by another process.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| RecorderError::flag(&path, e))?;
        let len = file
            .metadata()
            .map_err(|e| RecorderError::flag(&path, e))?
            .len();
        if len < FLAG_LEN {
            return Err(RecorderError::flag(
                &path,
                std::io::Error::other(format!("flag file too short ({len} bytes)")),
            ));
        }
        Self::map(path, &file)
    }

    fn map(path: PathBuf, file: &std::fs::File) -> Result<Self> {
        // The file stays the same length for the lifetime of the mapping;
        // nothing in this crate truncates an open flag.
        let map = unsafe {
            MmapOptions::new()
                .len(FLAG_LEN as usize)
                .map_mut(file)
                .map_err(|e| RecorderError::flag(&path, e))?
        };
        Ok(Self {
            path,
            map: Arc::new(map),
        })
    }

    fn atomic(&self) -> &AtomicU32 {
        // Mappings are page aligned and at least FLAG_LEN bytes long, and all
        // access to the word goes through atomics.
        unsafe { &*(self.map.as_ptr() as *const AtomicU32) }
    }

    /// Set the flag. Setting an already-set flag is a no-op.
    pub fn set(&self) {
        self.atomic().store(SET, Ordering::Release);
    }

    /// Non-blocking read of the flag.
    pub fn is_set(&self) -> bool {
        self.atomic().load(Ordering::Acquire) == SET
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for SharedFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedFlag")
            .field("path", &self.path)
            .field("set", &self.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_starts_unset() {
        let dir = tempfile::tempdir().unwrap();
        let flag = SharedFlag::create(dir.path().join("stop.flag")).unwrap();
        assert!(!flag.is_set());
    }

    #[test]
    fn test_set_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let flag = SharedFlag::create(dir.path().join("stop.flag")).unwrap();
        flag.set();
        flag.set();
        assert!(flag.is_set());
    }

    #[test]
    fn test_set_visible_through_separate_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("first.flag");
        let owner = SharedFlag::create(&path).unwrap();
        let observer = SharedFlag::open(&path).unwrap();

        assert!(!observer.is_set());
        owner.set();
        assert!(observer.is_set());

        // Survives the setter going away.
        drop(owner);
        assert!(observer.is_set());
        assert!(SharedFlag::open(&path).unwrap().is_set());
    }

    #[test]
    fn test_set_visible_across_threads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stop.flag");
        let flag = SharedFlag::create(&path).unwrap();

        let remote = SharedFlag::open(&path).unwrap();
        let handle = std::thread::spawn(move || {
            while !remote.is_set() {
                std::thread::yield_now();
            }
        });

        flag.set();
        handle.join().unwrap();
    }

    #[test]
    fn test_create_resets_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stop.flag");
        SharedFlag::create(&path).unwrap().set();
        let fresh = SharedFlag::create(&path).unwrap();
        assert!(!fresh.is_set());
    }

    #[test]
    fn test_open_rejects_missing_or_short_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SharedFlag::open(dir.path().join("absent.flag")).is_err());

        let short = dir.path().join("short.flag");
        std::fs::write(&short, [0u8; 2]).unwrap();
        assert!(matches!(
            SharedFlag::open(&short),
            Err(RecorderError::Flag { .. })
        ));
    }
}
