//! Code archive staging
//!
//! Packaged code (`.zip`, `.jar`, `.war`) cannot be bind-mounted directly, so
//! it is unpacked into a fresh directory under the temp root first. The
//! directory belongs to the caller from then on.

use crate::error::{InvokeError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

const ARCHIVE_EXTENSIONS: [&str; 3] = [".zip", ".jar", ".war"];

/// Whether the code location denotes a packaged archive
pub fn is_zip_archive(code_uri: &Path) -> bool {
    let name = code_uri.to_string_lossy();
    ARCHIVE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Unpack `code_uri` into `<temp_root>/<uuid>` when it is an archive.
///
/// Returns `Ok(None)` when no staging is needed.
pub async fn stage_code_if_necessary(
    code_uri: Option<&Path>,
    temp_root: &Path,
) -> Result<Option<PathBuf>> {
    let Some(code_uri) = code_uri.filter(|uri| is_zip_archive(uri)) else {
        return Ok(None);
    };

    let staged_dir = temp_root.join(Uuid::new_v4().to_string());
    tokio::fs::create_dir_all(&staged_dir).await?;

    info!(
        archive = %code_uri.display(),
        dir = %staged_dir.display(),
        "codeUri is an archive, unzipping"
    );

    let archive = code_uri.to_path_buf();
    let target = staged_dir.clone();
    let extracted = tokio::task::spawn_blocking(move || extract_archive(&archive, &target))
        .await
        .map_err(|e| InvokeError::ArchiveExtraction {
            path: code_uri.to_path_buf(),
            reason: e.to_string(),
        })
        .and_then(|result| result);

    if let Err(e) = extracted {
        if let Err(cleanup) = tokio::fs::remove_dir_all(&staged_dir).await {
            warn!(
                dir = %staged_dir.display(),
                error = %cleanup,
                "Failed to remove partially staged code dir"
            );
        }
        return Err(e);
    }

    Ok(Some(staged_dir))
}

fn extract_archive(archive: &Path, target: &Path) -> Result<()> {
    let to_error = |reason: String| InvokeError::ArchiveExtraction {
        path: archive.to_path_buf(),
        reason,
    };

    let file = File::open(archive).map_err(|e| to_error(e.to_string()))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| to_error(e.to_string()))?;
    debug!(entries = zip.len(), archive = %archive.display(), "Extracting archive");

    // Rejects entries whose names escape `target`.
    zip.extract(target).map_err(|e| to_error(e.to_string()))
}
