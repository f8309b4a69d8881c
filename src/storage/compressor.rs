//! Zip compression of a staging directory into a single artifact.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Error, Result};

/// Compress `staging` into `artifact`. Entry names are prefixed with the
/// staging directory's own name so extraction recreates it.
///
/// The archive is built in `<artifact>.tmp` and moved into place only once
/// complete, never over an existing artifact. On failure the temp file is
/// removed and `staging` is untouched.
///
/// Returns the artifact size in bytes.
pub fn compress_dir(staging: &Path, artifact: &Path) -> Result<u64> {
    let base = staging
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::NonUtf8Path {
            path: staging.to_path_buf(),
        })?
        .to_string();
    let tmp = tmp_path_for(artifact);
    let _ = fs::remove_file(&tmp);

    match write_archive(staging, &base, &tmp).and_then(|()| publish(&tmp, artifact)) {
        Ok(()) => Ok(fs::metadata(artifact)?.len()),
        Err(err) => {
            let _ = fs::remove_file(&tmp);
            Err(err)
        }
    }
}

/// Move a finished temp file to `dest` without replacing anything already
/// there. The hard link fails atomically on an existing `dest`; filesystems
/// without hard links fall back to a checked rename.
pub(crate) fn publish(tmp: &Path, dest: &Path) -> Result<()> {
    match fs::hard_link(tmp, dest) {
        Ok(()) => {
            fs::remove_file(tmp)?;
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(Error::ArtifactExists {
            path: dest.to_path_buf(),
        }),
        Err(_) => {
            if fs::symlink_metadata(dest).is_ok() {
                return Err(Error::ArtifactExists {
                    path: dest.to_path_buf(),
                });
            }
            fs::rename(tmp, dest)?;
            Ok(())
        }
    }
}

fn write_archive(staging: &Path, base: &str, tmp: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(tmp)?;
    let mut writer = ZipWriter::new(BufWriter::new(file));

    writer.add_directory(format!("{base}/"), entry_options(staging)?)?;
    add_tree(&mut writer, staging, base)?;

    let buffered = writer.finish()?;
    let file = buffered
        .into_inner()
        .map_err(|err| Error::Io(err.into_error()))?;
    file.sync_all()?;
    Ok(())
}

fn add_tree<W>(writer: &mut ZipWriter<W>, dir: &Path, prefix: &str) -> Result<()>
where
    W: std::io::Write + std::io::Seek,
{
    let mut children: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<std::io::Result<_>>()?;
    children.sort();

    for path in children {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::NonUtf8Path { path: path.clone() })?;
        let entry_name = format!("{prefix}/{name}");
        let meta = fs::symlink_metadata(&path)?;
        let options = entry_options(&path)?;

        if meta.file_type().is_symlink() {
            let target = fs::read_link(&path)?;
            let target = target
                .to_str()
                .ok_or_else(|| Error::NonUtf8Path { path: path.clone() })?
                .to_string();
            writer.add_symlink(entry_name, target, options)?;
        } else if meta.is_dir() {
            writer.add_directory(format!("{entry_name}/"), options)?;
            add_tree(writer, &path, &entry_name)?;
        } else {
            writer.start_file(entry_name, options.large_file(meta.len() >= u32::MAX as u64))?;
            let mut input = File::open(&path)?;
            std::io::copy(&mut input, writer)?;
        }
    }
    Ok(())
}

fn entry_options(path: &Path) -> Result<SimpleFileOptions> {
    let meta = fs::symlink_metadata(path)?;
    let modified = OffsetDateTime::from(meta.modified()?);
    let stamp = match zip::DateTime::try_from(modified) {
        Ok(stamp) => stamp,
        // Link mtimes are not normalized; store them at the zip epoch.
        Err(_) if meta.file_type().is_symlink() => zip::DateTime::default(),
        Err(_) => {
            return Err(Error::InvalidDate(format!(
                "{} has a modification time zip cannot store: {modified}",
                path.display()
            )));
        }
    };

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(stamp);
    Ok(with_permissions(options, &meta))
}

#[cfg(unix)]
fn with_permissions(options: SimpleFileOptions, meta: &fs::Metadata) -> SimpleFileOptions {
    use std::os::unix::fs::PermissionsExt;
    options.unix_permissions(meta.permissions().mode())
}

#[cfg(not(unix))]
fn with_permissions(options: SimpleFileOptions, _meta: &fs::Metadata) -> SimpleFileOptions {
    options
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
