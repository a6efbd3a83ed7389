use std::fs::{self, File};
use std::io;
use std::path::Path;

use tracing::{debug, info};

use super::ArchiveError;

/// Data file the results viewer loads from the top of the serving directory.
pub const STUDY_DATA_FILE: &str = "study_data.js";

/// What [`unpack`] extracted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackReport {
    /// Number of files written.
    pub files: usize,
    /// Whether `html/study_data.js` was moved to the top level.
    pub promoted_study_data: bool,
}

/// Extracts the zip at `archive` into `dest`, then moves
/// `html/study_data.js` to `dest/study_data.js` when present.
///
/// Blocking; call from `spawn_blocking` in async code. Existing files are
/// overwritten.
pub fn unpack(archive: &Path, dest: &Path) -> Result<UnpackReport, ArchiveError> {
    let file = File::open(archive).map_err(|e| ArchiveError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| ArchiveError::Invalid {
        path: archive.to_path_buf(),
        reason: e.to_string(),
    })?;

    fs::create_dir_all(dest).map_err(|e| ArchiveError::io(dest, e))?;

    let mut report = UnpackReport::default();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| ArchiveError::Invalid {
            path: archive.to_path_buf(),
            reason: e.to_string(),
        })?;

        let relative = entry
            .enclosed_name()
            .ok_or_else(|| ArchiveError::UnsafeEntry(entry.name().to_string()))?;
        let outpath = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath).map_err(|e| ArchiveError::io(&outpath, e))?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
        }
        let mut outfile = File::create(&outpath).map_err(|e| ArchiveError::io(&outpath, e))?;
        io::copy(&mut entry, &mut outfile).map_err(|e| ArchiveError::io(&outpath, e))?;
        debug!("Extracted {}", outpath.display());
        report.files += 1;
    }

    let nested = dest.join("html").join(STUDY_DATA_FILE);
    if nested.is_file() {
        let promoted = dest.join(STUDY_DATA_FILE);
        fs::rename(&nested, &promoted).map_err(|e| ArchiveError::io(&nested, e))?;
        report.promoted_study_data = true;
    }

    info!(
        "Extracted {} files from {} to {}",
        report.files,
        archive.display(),
        dest.display()
    );
    Ok(report)
}
