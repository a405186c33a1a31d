//! Zip packaging of a batch's results.

use std::io::{Cursor, Write};
use std::path::Path;

use tracing::debug;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::batch::ProcessedResult;
use crate::error::Result;

/// Batch name used when the caller does not pick one.
pub const DEFAULT_ARCHIVE_NAME: &str = "watermarked";

/// File name of the archive for `batch`, e.g. `"watermarked.zip"`.
#[must_use]
pub fn archive_file_name(batch: &str) -> String {
    if batch.to_ascii_lowercase().ends_with(".zip") {
        batch.to_string()
    } else {
        format!("{batch}.zip")
    }
}

/// Strip directory components so entries cannot escape the extraction root.
fn entry_name(file_name: &str) -> &str {
    Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or(file_name)
}

/// Build a deflate-compressed zip holding every result under its own name.
///
/// # Errors
///
/// Returns [`crate::Error::Archive`] or [`crate::Error::Io`] if writing an
/// entry fails.
pub fn build_zip(results: &[ProcessedResult]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        for result in results {
            let name = entry_name(&result.file_name);
            zip.start_file(name, options)?;
            zip.write_all(&result.data)?;
        }

        zip.finish()?;
    }

    debug!(entries = results.len(), bytes = buffer.len(), "built zip archive");
    Ok(buffer)
}
