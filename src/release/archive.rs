//! ZIP extraction for multi-track releases.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use tracing::{debug, warn};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::Error;

/// Extracts every entry of `archive` into `destination`.
///
/// Entries whose name would escape `destination` are skipped. Returns the
/// number of files written.
///
/// Blocking; call from `spawn_blocking`.
///
/// # Errors
///
/// Returns [`Error::Archive`] for an unreadable, truncated or corrupted archive and
/// [`Error::Io`] when writing an entry fails.
pub(crate) fn extract_archive(archive: &Path, destination: &Path) -> Result<usize, Error> {
    let file = File::open(archive).map_err(|e| Error::io(archive, e))?;
    let mut zip = ZipArchive::new(file).map_err(|e| archive_error(archive, &e))?;

    let mut written = 0;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| archive_error(archive, &e))?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!(archive = %archive.display(), entry = entry.name(), "skipping entry with unsafe path");
            continue;
        };
        let target = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| Error::io(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| Error::io(&target, e))?;
        copy_entry(&mut entry, &mut out, archive, &target)?;
        written += 1;
    }

    debug!(archive = %archive.display(), files = written, "archive extracted");
    Ok(written)
}

/// Copies one entry to `out`.
///
/// Any failure reading the entry (short data, bad checksum) means the archive
/// itself is damaged and maps to [`Error::Archive`]; failures writing `out`
/// stay [`Error::Io`].
fn copy_entry(
    entry: &mut impl Read,
    out: &mut impl Write,
    archive: &Path,
    target: &Path,
) -> Result<u64, Error> {
    let mut buffer = [0u8; 64 * 1024];
    let mut copied = 0u64;
    loop {
        let read = match entry.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(Error::Archive {
                    path: archive.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };
        out.write_all(&buffer[..read])
            .map_err(|e| Error::io(target, e))?;
        copied += read as u64;
    }
    out.flush().map_err(|e| Error::io(target, e))?;
    Ok(copied)
}

fn archive_error(archive: &Path, error: &ZipError) -> Error {
    Error::Archive {
        path: archive.to_path_buf(),
        reason: error.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zip::CompressionMethod;
    use zip::write::FileOptions;

    fn build_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, content) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_extract_archive_writes_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("release.zip");
        build_zip(
            &archive,
            &[("01 - Intro.flac", b"one"), ("nested/cover.jpg", b"jpg")],
        );

        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        assert_eq!(extract_archive(&archive, &out).unwrap(), 2);
        assert_eq!(fs::read(out.join("01 - Intro.flac")).unwrap(), b"one");
        assert!(out.join("nested/cover.jpg").is_file());
    }

    #[test]
    fn test_extract_archive_skips_escaping_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.zip");
        build_zip(&archive, &[("../escape.txt", b"x"), ("ok.txt", b"y")]);

        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        assert_eq!(extract_archive(&archive, &out).unwrap(), 1);
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_extract_archive_rejects_non_zip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("truncated.zip");
        fs::write(&archive, b"PK\x03\x04 definitely not complete").unwrap();
        let err = extract_archive(&archive, dir.path()).unwrap_err();
        assert!(matches!(err, Error::Archive { .. }), "got: {err:?}");
    }

    #[test]
    fn test_extract_archive_checksum_mismatch_is_archive_error() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("corrupt.zip");
        let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
        writer
            .start_file(
                "01 - Intro.flac",
                FileOptions::default().compression_method(CompressionMethod::Stored),
            )
            .unwrap();
        writer.write_all(b"fLaC original payload").unwrap();
        writer.finish().unwrap();

        // Flip one stored byte so the entry no longer matches its CRC.
        let mut bytes = fs::read(&archive).unwrap();
        let at = bytes
            .windows(8)
            .position(|w| w == b"original")
            .unwrap();
        bytes[at] = b'O';
        fs::write(&archive, bytes).unwrap();

        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let err = extract_archive(&archive, &out).unwrap_err();
        assert!(matches!(err, Error::Archive { .. }), "got: {err:?}");
    }

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("no space left"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_copy_entry_write_failure_is_io_error() {
        let mut entry: &[u8] = b"payload";
        let err = copy_entry(
            &mut entry,
            &mut FullDisk,
            Path::new("release.zip"),
            Path::new("out/01.flac"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Io { .. }), "got: {err:?}");
    }
}
