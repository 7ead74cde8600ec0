use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use tempfile::{Builder, NamedTempFile, TempPath};

/// Create a temporary file next to `output`. Results are written there and renamed into place
/// only when complete, so a failed stage never leaves a plausible looking output behind.
pub(crate) fn create_output_file(output: &Path) -> Result<BufWriter<NamedTempFile>, anyhow::Error> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file = Builder::new()
        .prefix(".partial-")
        .suffix(".tar")
        .tempfile_in(&dir)
        .with_context(|| anyhow!("Failed to create temp file in {}", dir.display()))?;
    Ok(BufWriter::new(file))
}

/// Flush and close a finished output. The temporary file stays on disk until it is persisted
/// or the returned path is dropped.
pub(crate) fn close_output(writer: BufWriter<NamedTempFile>) -> Result<TempPath, anyhow::Error> {
    let path = writer.get_ref().path().to_path_buf();
    let file = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| anyhow!("Flush {}", path.display()))?;
    Ok(file.into_temp_path())
}

pub(crate) fn persist_path(path: TempPath, output: &Path) -> Result<(), anyhow::Error> {
    path.persist(output)
        .with_context(|| anyhow!("Rename temp file to {}", output.display()))?;
    Ok(())
}

pub(crate) fn persist_output(writer: BufWriter<NamedTempFile>, output: &Path) -> Result<(), anyhow::Error> {
    persist_path(close_output(writer)?, output)
}

pub(crate) fn open_input(path: &Path) -> Result<BufReader<File>, anyhow::Error> {
    let file = File::open(path).with_context(|| anyhow!("path: {}", path.display()))?;
    Ok(BufReader::new(file))
}
