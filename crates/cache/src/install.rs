//! Atomic installation of downloaded artifacts.

use std::path::Path;

use futures::StreamExt;
use relshim_core::{ByteStream, CancellationToken, Error, Result, cancel};
use tokio::io::AsyncWriteExt;
use tracing::trace;

/// Mode of installed artifacts.
#[cfg(unix)]
const EXECUTABLE_MODE: u32 = 0o755;

/// Stream `body` into `dest` atomically and return the number of bytes
/// written.
///
/// Bytes go to a temporary file in `dest`'s directory, which is synced,
/// marked executable and renamed over `dest` only once the stream ends
/// cleanly. On any failure (or cancellation) the temporary file is removed
/// and `dest` is untouched.
///
/// # Errors
///
/// Returns [`Error::Io`] for stream, write or rename failures and
/// [`Error::Cancelled`] when `cancel` fires mid-download.
pub async fn install(cancel: &CancellationToken, mut body: ByteStream, dest: &Path) -> Result<u64> {
    let dir = dest
        .parent()
        .ok_or_else(|| Error::internal(format!("cache path {} has no parent", dest.display())))?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::io(e, dir, "create directory"))?;

    let temp = tempfile::Builder::new()
        .prefix(".relshim-")
        .suffix(".partial")
        .tempfile_in(dir)
        .map_err(|e| Error::io(e, dir, "create temporary file"))?;
    let (file, temp_path) = temp.into_parts();
    let mut file = tokio::fs::File::from_std(file);
    trace!(temp = %temp_path.display(), "Writing artifact");

    let written = cancel::run(cancel, "downloading artifact", async {
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::io(e, dest, "download"))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::io(e, &temp_path, "write"))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| Error::io(e, &temp_path, "flush"))?;
        file.sync_all()
            .await
            .map_err(|e| Error::io(e, &temp_path, "sync"))?;
        Ok(written)
    })
    .await?;
    drop(file);

    set_executable(&temp_path)?;
    temp_path
        .persist(dest)
        .map_err(|e| Error::io(e.error, dest, "rename"))?;

    Ok(written)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(EXECUTABLE_MODE))
        .map_err(|e| Error::io(e, path, "set permissions"))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}
