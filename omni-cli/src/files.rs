//! Local side of file transfers: saving downloads, verified uploads,
//! progress display.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use omni_core::{DownloadedFile, FileTransfer, OmniError};
use tracing::{info, warn};

/// Write a download to `dest` and stamp it with the remote mtime.
///
/// If `dest` is a directory the remote file name is appended.
pub fn save(file: &DownloadedFile, dest: &Path) -> Result<PathBuf, OmniError> {
    let target = if dest.is_dir() {
        dest.join(file.file_name())
    } else {
        dest.to_path_buf()
    };

    let mut out = File::create(&target)?;
    out.write_all(&file.data)?;
    out.set_modified(file.modified())?;

    if !file.is_complete() {
        warn!(
            "{} is incomplete: {} of {} bytes",
            target.display(),
            file.data.len(),
            file.expected_size
        );
    }
    Ok(target)
}

/// Upload `data`, then optionally download it again and compare hashes.
pub async fn upload(
    files: &FileTransfer<'_>,
    remote: &str,
    data: Bytes,
    verify: bool,
    on_progress: impl FnMut(f64),
) -> Result<(), OmniError> {
    files.upload_file(remote, data.clone(), on_progress).await?;
    if !verify {
        return Ok(());
    }

    let expected = blake3::hash(&data);
    let echoed = files.download_file(remote, |_| {}).await?;
    let actual = blake3::hash(&echoed.data);
    if actual != expected {
        return Err(OmniError::FileIntegrityFailed(format!(
            "{remote}: expected {expected}, got {actual}"
        )));
    }
    info!(remote, hash = %expected, "upload verified");
    Ok(())
}

/// Progress callback that redraws one status line on stderr.
pub fn progress_line(label: impl Into<String>) -> impl FnMut(f64) {
    let label = label.into();
    let mut last = -1i64;
    move |percent| {
        let whole = percent.floor() as i64;
        if whole == last {
            return;
        }
        last = whole;
        let mut err = std::io::stderr();
        let _ = write!(err, "\r{label} {whole:>3}%");
        if whole >= 100 {
            let _ = writeln!(err);
        }
        let _ = err.flush();
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    fn downloaded(path: &str, data: &[u8], expected_size: u64) -> DownloadedFile {
        DownloadedFile {
            path: path.into(),
            mtime: 1_700_000_000,
            expected_size,
            data: data.to_vec(),
        }
    }

    #[test]
    fn save_into_directory_uses_remote_name() {
        let dir = tempfile::tempdir().unwrap();
        let target = save(&downloaded("/etc/hostname", b"box\n", 4), dir.path()).unwrap();
        assert_eq!(target, dir.path().join("hostname"));
        assert_eq!(std::fs::read(&target).unwrap(), b"box\n");
    }

    #[test]
    fn save_stamps_remote_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("copy.bin");
        save(&downloaded("/a/b.bin", &[1, 2, 3], 3), &dest).unwrap();

        let modified = std::fs::metadata(&dest).unwrap().modified().unwrap();
        assert_eq!(
            modified.duration_since(UNIX_EPOCH).unwrap(),
            Duration::from_secs(1_700_000_000)
        );
    }

    #[test]
    fn save_keeps_partial_download() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("partial");
        save(&downloaded("/log", b"half", 8), &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"half");
    }
}
