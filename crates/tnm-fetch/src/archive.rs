//! ZIP member extraction.

use crate::ArchiveError;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tnm_metrics::{metric_defs, metrics};
use tracing::{debug, warn};

/// Deletes the source archive when extraction ends, whatever the outcome.
struct ConsumeArchive<'a>(&'a Path);

impl Drop for ConsumeArchive<'_> {
    fn drop(&mut self) {
        match fs::remove_file(self.0) {
            Ok(()) => debug!(archive = %self.0.display(), "Removed archive"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(archive = %self.0.display(), error = %e, "Failed to remove archive"),
        }
    }
}

/// Extract the first member of `archive` whose name ends with `extension`.
///
/// The member is written directly under `dest_dir` (any directory structure
/// inside the archive is ignored) and named after the archive: extracting
/// `VECTOR_Foo_NE.zip` with extension `.gpkg` produces `dest_dir/VECTOR_Foo_NE.gpkg`.
///
/// The archive is deleted before this function returns, on success and on
/// every failure, so a broken download is never picked up again.
///
/// # Errors
/// * [`ArchiveError::MemberNotFound`] - no member matches the extension
/// * [`ArchiveError::CorruptArchive`] - the file is not a readable ZIP archive
/// * [`ArchiveError::Io`] - the destination could not be written
pub fn extract_member(
    archive: &Path,
    dest_dir: &Path,
    extension: &str,
) -> Result<PathBuf, ArchiveError> {
    let result = {
        let _consume = ConsumeArchive(archive);
        extract(archive, dest_dir, extension)
    };

    match &result {
        Ok(path) => {
            metrics::counter!(metric_defs::EXTRACT_COMPLETED.name).increment(1);
            debug!(archive = %archive.display(), target = %path.display(), "Extracted member");
        }
        Err(e) => {
            metrics::counter!(metric_defs::EXTRACT_FAILED.name, "reason" => e.kind_label())
                .increment(1);
        }
    }
    result
}

fn extract(archive: &Path, dest_dir: &Path, extension: &str) -> Result<PathBuf, ArchiveError> {
    let io_error = |source: io::Error| ArchiveError::Io {
        archive: archive.to_path_buf(),
        source,
    };
    let corrupt = |reason: String| ArchiveError::CorruptArchive {
        archive: archive.to_path_buf(),
        reason,
    };

    let stem = archive
        .file_stem()
        .ok_or_else(|| corrupt("archive path has no file name".to_string()))?;
    let mut target_name = stem.to_os_string();
    target_name.push(extension);
    let target = dest_dir.join(&target_name);

    let file = File::open(archive).map_err(io_error)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| corrupt(e.to_string()))?;

    let mut found = None;
    for index in 0..zip.len() {
        let member = zip.by_index(index).map_err(|e| corrupt(e.to_string()))?;
        if !member.is_dir() && member.name().ends_with(extension) {
            found = Some(index);
            break;
        }
    }
    let index = found.ok_or_else(|| ArchiveError::MemberNotFound {
        archive: archive.to_path_buf(),
        extension: extension.to_string(),
    })?;

    fs::create_dir_all(dest_dir).map_err(io_error)?;

    let mut partial_name = target_name.clone();
    partial_name.push(".part");
    let partial = dest_dir.join(partial_name);

    let copied = (|| -> Result<(), ArchiveError> {
        let mut member = zip.by_index(index).map_err(|e| corrupt(e.to_string()))?;
        let mut out = File::create(&partial).map_err(io_error)?;
        // Decompression errors surface here as io::Error.
        io::copy(&mut member, &mut out).map_err(|e| corrupt(e.to_string()))?;
        Ok(())
    })();

    if let Err(e) = copied {
        if let Err(remove_err) = fs::remove_file(&partial) {
            warn!(
                path = %partial.display(),
                error = %remove_err,
                "Failed to remove partial member"
            );
        }
        return Err(e);
    }

    fs::rename(&partial, &target).map_err(io_error)?;
    Ok(target)
}
