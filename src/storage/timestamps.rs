//! Zip entries cannot carry modification times before 1980, so anything that
//! old is bumped to "now" before compression.

use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::Result;

/// 1981-01-01T00:00:00Z. Times strictly before this (any time in 1980 or
/// earlier) are rewritten.
const LEGACY_CUTOFF_SECS: u64 = 347_155_200;

pub fn legacy_cutoff() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(LEGACY_CUTOFF_SECS)
}

/// Touch every file and directory under `root` whose mtime is at or before
/// 1980. Symlinks are left alone. Returns the number of entries touched.
pub fn normalize_legacy_mtimes(root: &Path) -> Result<usize> {
    let cutoff = legacy_cutoff();
    let now = SystemTime::now();
    let mut touched = 0;

    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let meta = match fs::symlink_metadata(&path) {
                Ok(meta) => meta,
                Err(err) => {
                    log::warn!("cannot stat {}: {err}", path.display());
                    continue;
                }
            };
            if meta.file_type().is_symlink() {
                continue;
            }
            if meta.is_dir() {
                stack.push(path.clone());
            }

            let is_legacy = meta.modified().map_or(false, |modified| modified < cutoff);
            if !is_legacy {
                continue;
            }
            match File::open(&path).and_then(|file| file.set_modified(now)) {
                Ok(()) => touched += 1,
                Err(err) => log::warn!("cannot reset mtime of {}: {err}", path.display()),
            }
        }
    }
    Ok(touched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn set_mtime(path: &Path, when: SystemTime) {
        File::open(path).unwrap().set_modified(when).unwrap();
    }

    #[test]
    fn test_normalize_touches_only_legacy_entries() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let old_dir = root.join("old_dir");
        fs::create_dir(&old_dir).unwrap();
        let old_file = old_dir.join("old.txt");
        let late_1980 = root.join("late_1980.txt");
        let fresh = root.join("fresh.txt");
        fs::write(&old_file, b"x").unwrap();
        fs::write(&late_1980, b"x").unwrap();
        fs::write(&fresh, b"x").unwrap();

        let ancient = UNIX_EPOCH + Duration::from_secs(86_400);
        let fresh_time = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        set_mtime(&old_file, ancient);
        set_mtime(&late_1980, legacy_cutoff() - Duration::from_secs(60));
        set_mtime(&fresh, fresh_time);
        set_mtime(&old_dir, ancient);

        let touched = normalize_legacy_mtimes(root).unwrap();
        assert_eq!(touched, 3);

        for path in [&old_file, &late_1980, &old_dir] {
            let modified = fs::metadata(path).unwrap().modified().unwrap();
            assert!(modified >= legacy_cutoff(), "{} not touched", path.display());
        }
        assert_eq!(fs::metadata(&fresh).unwrap().modified().unwrap(), fresh_time);
    }
}
