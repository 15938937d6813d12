use std::io;
use std::path::Path;

use filetime::FileTime;
use tracing::{debug, instrument};

use crate::{FileattrError, FileattrResult};

use super::platform;
use super::raw::{LinkMode, Platform, RawLinkTarget, RawStat};
use super::traits::Pal;
use super::umask::process_umask;

/// Concrete PAL implementation for the operating system this binary was built for.
///
/// POSIX systems go through `std::fs` plus `chflags` where BSD flags exist; Windows
/// goes through `FindFirstFileW`, `FSCTL_GET_REPARSE_POINT` and `SetFileAttributesW`.
#[derive(Debug)]
pub struct RealPal {
    platform: Platform,
}

impl RealPal {
    pub fn new() -> Self {
        Self {
            platform: Platform::current(),
        }
    }
}

impl Default for RealPal {
    fn default() -> Self {
        Self::new()
    }
}

impl Pal for RealPal {
    fn platform(&self) -> Platform {
        self.platform
    }

    #[instrument(skip(self))]
    fn probe_symlink_support(&self) -> bool {
        let supported = platform::symlinks_supported();
        debug!(supported, "probed symbolic link support");
        supported
    }

    #[instrument(skip(self))]
    fn umask(&self) -> FileattrResult<u32> {
        process_umask().map_err(|e| {
            debug!(error = %e, "umask probe failed");
            Box::new(FileattrError::message(format!(
                "Failed to determine process umask: {}",
                e
            )))
        })
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    fn stat(&self, path: &Path, link_mode: LinkMode) -> io::Result<RawStat> {
        let result = platform::stat(path, link_mode);
        match &result {
            Ok(raw) => debug!(?raw, "stat succeeded"),
            Err(e) => debug!(error = %e, kind = ?e.kind(), "stat failed"),
        }
        result
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    fn read_link(&self, path: &Path) -> io::Result<RawLinkTarget> {
        let result = platform::read_link(path);
        if let Err(e) = &result {
            debug!(error = %e, "failed to read link target");
        }
        result
    }

    #[instrument(skip(self), fields(path = %path.display(), mode = %format!("{:o}", mode)))]
    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        platform::set_mode(path, mode)
    }

    #[instrument(skip(self), fields(path = %path.display(), flags = %format!("{:#x}", flags)))]
    fn set_flags(&self, path: &Path, flags: u32) -> io::Result<()> {
        platform::set_flags(path, flags)
    }

    #[instrument(skip(self), fields(path = %path.display(), attributes = %format!("{:#x}", attributes)))]
    fn set_windows_attributes(&self, path: &Path, attributes: u32) -> io::Result<()> {
        platform::set_windows_attributes(path, attributes)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    fn set_modified(&self, path: &Path, millis: i64) -> io::Result<()> {
        let secs = millis.div_euclid(1000);
        let nanos = (millis.rem_euclid(1000) * 1_000_000) as u32;
        filetime::set_file_mtime(path, FileTime::from_unix_time(secs, nanos))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::pal::raw::mode;
    use std::fs;

    fn posix(raw: RawStat) -> crate::pal::PosixStat {
        match raw {
            RawStat::Posix(stat) => stat,
            RawStat::Windows(_) => panic!("expected a POSIX record"),
        }
    }

    #[test]
    fn test_stat_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        fs::write(&path, b"12345").unwrap();

        let stat = posix(RealPal::new().stat(&path, LinkMode::Follow).unwrap());
        assert_eq!(stat.mode & mode::S_IFMT, mode::S_IFREG);
        assert_eq!(stat.size, 5);
    }

    #[test]
    fn test_stat_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = RealPal::new()
            .stat(&dir.path().join("missing"), LinkMode::NoFollow)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_lstat_and_read_link() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.txt");
        let link = dir.path().join("link");
        fs::write(&target, b"abc").unwrap();
        std::os::unix::fs::symlink("target.txt", &link).unwrap();

        let pal = RealPal::new();
        assert!(pal.stat(&link, LinkMode::NoFollow).unwrap().is_symlink());
        assert!(!pal.stat(&link, LinkMode::Follow).unwrap().is_symlink());
        assert_eq!(
            pal.read_link(&link).unwrap(),
            RawLinkTarget::Path("target.txt".to_string())
        );
    }

    #[test]
    fn test_set_mode_replaces_permission_bits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.sh");
        fs::write(&path, b"#!/bin/sh").unwrap();

        let pal = RealPal::new();
        pal.set_mode(&path, 0o751).unwrap();
        let stat = posix(pal.stat(&path, LinkMode::Follow).unwrap());
        assert_eq!(stat.mode & mode::PERMISSION_BITS, 0o751);
    }

    #[test]
    fn test_set_modified_round_trips_millis() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.txt");
        fs::write(&path, b"x").unwrap();

        let pal = RealPal::new();
        pal.set_modified(&path, 1_600_000_000_123).unwrap();
        let stat = posix(pal.stat(&path, LinkMode::Follow).unwrap());
        assert_eq!(stat.mtime_secs, 1_600_000_000);
        assert_eq!(stat.mtime_nanos / 1_000_000, 123);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_has_no_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"").unwrap();

        let pal = RealPal::new();
        assert_eq!(posix(pal.stat(&path, LinkMode::Follow).unwrap()).flags, None);
        let err = pal.set_flags(&path, 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        let err = pal.set_windows_attributes(&path, 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
