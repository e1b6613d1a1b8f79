//! Data-file discovery for the working directory's `Data` folder.
//!
//! Lists candidate master/plugin files by extension so a caller can offer
//! them for opening. An empty data directory is an advisory condition, not a
//! fatal one; callers typically surface it and move on.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// File extensions recognized as loadable data files
pub const PLUGIN_EXTENSIONS: [&str; 2] = ["esm", "esp"];

#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Advisory: the data directory holds no candidate files
    #[error("no .esm or .esp files were found in {dir}")]
    NoFilesFound { dir: Utf8PathBuf },

    #[error("failed to read data directory {dir}: {source}")]
    Io {
        dir: Utf8PathBuf,
        source: std::io::Error,
    },
}

/// True if `path` has a recognized plugin extension (case-insensitive).
pub fn is_plugin_file(path: &Utf8Path) -> bool {
    path.extension()
        .map(|ext| {
            PLUGIN_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// List `*.esm`/`*.esp` files in `data_dir`, sorted by file name.
///
/// Returns [`DiscoveryError::NoFilesFound`] when the directory exists but
/// holds no candidates.
pub fn discover_data_files(data_dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, DiscoveryError> {
    let entries = data_dir
        .read_dir_utf8()
        .map_err(|source| DiscoveryError::Io {
            dir: data_dir.to_owned(),
            source,
        })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DiscoveryError::Io {
            dir: data_dir.to_owned(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && is_plugin_file(path) {
            files.push(path.to_owned());
        }
    }

    if files.is_empty() {
        return Err(DiscoveryError::NoFilesFound {
            dir: data_dir.to_owned(),
        });
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    tracing::debug!("Found {} data file(s) in {}", files.len(), data_dir);
    Ok(files)
}
