//! Per-batch archival: stage, normalize, manifest, compress, clean up.
//!
//! Batches run strictly one after another. Failures inside a batch are
//! reported on its `BatchReport` and never stop the remaining batches.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::account::AccountRecord;
use crate::error::{Error, Result};
use crate::lifecycle::ArchiveBatch;
use crate::storage::compressor::compress_dir;
use crate::storage::layout::{ArchiveLayout, RunStamp};
use crate::storage::manifest::ArchiveManifest;
use crate::storage::timestamps::normalize_legacy_mtimes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// Artifact written and staging directory removed.
    Archived,
    /// The batch name was already taken or staging could not be created;
    /// nothing was moved.
    Skipped,
    /// Data is staged but uncompressed; needs manual compression.
    CompressionFailed,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub index: usize,
    pub status: BatchStatus,
    pub staging: PathBuf,
    pub artifact: Option<PathBuf>,
    pub manifest: Option<PathBuf>,
    /// Ids moved into staging, in batch order.
    pub archived: Vec<String>,
    /// Ids whose data could not be moved and was left in place.
    pub failed_moves: Vec<String>,
    pub size_mb: f64,
    pub compressed_bytes: u64,
    pub errors: Vec<String>,
}

impl BatchReport {
    fn new(index: usize, staging: PathBuf) -> Self {
        Self {
            index,
            status: BatchStatus::Skipped,
            staging,
            artifact: None,
            manifest: None,
            archived: Vec::new(),
            failed_moves: Vec::new(),
            size_mb: 0.0,
            compressed_bytes: 0,
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchivePipeline {
    layout: ArchiveLayout,
    stamp: RunStamp,
    verbose: bool,
}

impl ArchivePipeline {
    pub fn new(layout: ArchiveLayout, stamp: RunStamp) -> Self {
        Self {
            layout,
            stamp,
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn run(&self, batches: &[ArchiveBatch]) -> Vec<BatchReport> {
        batches
            .iter()
            .enumerate()
            .map(|(index, batch)| self.process(index, batch))
            .collect()
    }

    pub fn process(&self, index: usize, batch: &ArchiveBatch) -> BatchReport {
        let staging = self.layout.staging_dir(self.stamp, index);
        let mut report = BatchReport::new(index, staging.clone());
        log::info!(
            "archiving batch {index}: {} accounts, {:.3} MB",
            batch.len(),
            batch.size_mb
        );

        let manifest_path = self.layout.manifest_path(self.stamp, index);
        let artifact = self.layout.artifact_path(self.stamp, index);
        if let Err(err) = create_staging(&staging, &[&artifact, &manifest_path]) {
            log::error!("{err}; skipping batch {index}");
            report.errors.push(err.to_string());
            return report;
        }

        let mut moved: Vec<AccountRecord> = Vec::with_capacity(batch.len());
        for account in &batch.accounts {
            if self.verbose {
                log::info!("archiving account {}", account.id);
            }
            match move_into(&account.path, &staging) {
                Ok(_) => moved.push(account.clone()),
                Err(err) => {
                    log::error!(
                        "failed to move {} into {}: {err}",
                        account.path.display(),
                        staging.display()
                    );
                    report.failed_moves.push(account.id.clone());
                    report.errors.push(format!("{}: {err}", account.id));
                }
            }
        }
        report.archived = moved.iter().map(|account| account.id.clone()).collect();
        report.size_mb = moved.iter().map(AccountRecord::size_or_zero).sum();

        match normalize_legacy_mtimes(&staging) {
            Ok(0) => {}
            Ok(touched) => log::info!("reset {touched} pre-1980 modification times"),
            Err(err) => {
                log::warn!("failed to normalize timestamps under {}: {err}", staging.display());
                report.errors.push(err.to_string());
            }
        }

        log::info!("writing manifest {}", manifest_path.display());
        match ArchiveManifest::new(self.stamp, index, &moved).write(&manifest_path) {
            Ok(()) => report.manifest = Some(manifest_path),
            Err(err) => {
                log::error!("failed to write manifest {}: {err}", manifest_path.display());
                report.errors.push(format!("manifest: {err}"));
            }
        }

        log::info!("compressing {}", staging.display());
        match compress_dir(&staging, &artifact) {
            Ok(bytes) => {
                report.compressed_bytes = bytes;
                report.artifact = Some(artifact);
            }
            Err(err) => {
                log::error!(
                    "compressing archive failed: {err}; compress {} manually",
                    self.layout.batch_name(self.stamp, index)
                );
                report.status = BatchStatus::CompressionFailed;
                report.errors.push(format!("compression: {err}"));
                return report;
            }
        }

        if let Err(err) = fs::remove_dir_all(&staging) {
            log::warn!("failed to remove staging {}: {err}", staging.display());
            report.errors.push(format!("cleanup: {err}"));
        }
        report.status = BatchStatus::Archived;
        report
    }
}

/// Claim a batch slot. Any existing staging directory, artifact or manifest
/// for the same name belongs to an earlier run and is never reused.
fn create_staging(staging: &Path, outputs: &[&Path]) -> Result<()> {
    if let Some(existing) = outputs.iter().find(|path| fs::symlink_metadata(path).is_ok()) {
        return Err(Error::ArtifactExists {
            path: existing.to_path_buf(),
        });
    }
    match fs::create_dir(staging) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(Error::StagingExists {
            path: staging.to_path_buf(),
        }),
        Err(err) => Err(err.into()),
    }
}

/// Move `src` under `dir`, keeping its file name. Falls back to copy and
/// remove when `dir` lives on another filesystem.
pub fn move_into(src: &Path, dir: &Path) -> Result<PathBuf> {
    let name = src.file_name().ok_or_else(|| {
        Error::Io(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("{} has no file name", src.display()),
        ))
    })?;
    let dest = dir.join(name);

    match fs::rename(src, &dest) {
        Ok(()) => Ok(dest),
        Err(err) if err.raw_os_error() == Some(libc::EXDEV) => {
            relocate_by_copy(src, &dest)?;
            Ok(dest)
        }
        Err(err) => Err(err.into()),
    }
}

/// Copy `src` to `dest`, then remove `src`. A partial copy is removed again
/// so nothing unlisted in the manifest reaches the artifact.
fn relocate_by_copy(src: &Path, dest: &Path) -> Result<()> {
    if fs::symlink_metadata(dest).is_ok() {
        return Err(Error::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("{} already exists", dest.display()),
        )));
    }
    if let Err(err) = copy_tree(src, dest) {
        let cleanup = match fs::symlink_metadata(dest) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(dest),
            Ok(_) => fs::remove_file(dest),
            Err(_) => Ok(()),
        };
        if let Err(cleanup_err) = cleanup {
            log::error!("failed to remove partial copy {}: {cleanup_err}", dest.display());
        }
        return Err(err);
    }
    if fs::symlink_metadata(src)?.is_dir() {
        fs::remove_dir_all(src)?;
    } else {
        fs::remove_file(src)?;
    }
    Ok(())
}

fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(src)?;
    if meta.file_type().is_symlink() {
        copy_symlink(src, dest)?;
        return Ok(());
    }
    if meta.is_dir() {
        fs::create_dir(dest)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_tree(&entry.path(), &dest.join(entry.file_name()))?;
        }
        fs::set_permissions(dest, meta.permissions())?;
    } else {
        fs::copy(src, dest)?;
    }
    // Keep the source mtime; it feeds the legacy-timestamp check.
    File::open(dest)?.set_modified(meta.modified()?)?;
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(src)?, dest)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> std::io::Result<()> {
    fs::copy(src, dest).map(|_| ())
}
