//! File inspection helpers: extensions and archive listings

use std::fs::File;
use std::path::Path;
use tracing::warn;

use crate::error::E2eError;

/// Return the substring after the last `.`, or `""` when there is none.
///
/// Works on plain file names, paths and URLs alike.
pub fn extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(i) => &name[i + 1..],
        None => "",
    }
}

/// Extension of a path's file name, using the same rule as [`extension`]
pub fn path_extension(path: &Path) -> String {
    path.file_name()
        .map(|name| extension(&name.to_string_lossy()).to_string())
        .unwrap_or_default()
}

/// MIME type sent for an image attachment
pub fn image_mime_type(ext: &str) -> String {
    format!("image/{}", ext)
}

pub const ARCHIVE_MIME_TYPE: &str = "application/zip";

/// Outcome of listing an archive's entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveListing {
    /// Entry names in stored order (possibly none)
    Entries(Vec<String>),
    /// The archive could not be opened or parsed
    Unreadable { reason: String },
}

impl ArchiveListing {
    /// Entries, or an error carrying the read failure
    pub fn into_entries(self, path: &Path) -> Result<Vec<String>, E2eError> {
        match self {
            ArchiveListing::Entries(entries) => Ok(entries),
            ArchiveListing::Unreadable { reason } => Err(E2eError::Fixture(format!(
                "cannot read archive {}: {}",
                path.display(),
                reason
            ))),
        }
    }
}

/// List the entry names of the ZIP archive at `path`
pub fn archive_entries(path: &Path) -> ArchiveListing {
    match read_entry_names(path) {
        Ok(entries) => ArchiveListing::Entries(entries),
        Err(e) => {
            warn!("Error reading ZIP file {}: {}", path.display(), e);
            ArchiveListing::Unreadable { reason: e.to_string() }
        }
    }
}

fn read_entry_names(path: &Path) -> Result<Vec<String>, E2eError> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        names.push(entry.name().to_string());
    }

    Ok(names)
}
