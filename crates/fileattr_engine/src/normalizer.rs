/* 📖 # How are raw records turned into FileInfo?

The normalizer is a pure function of one raw record and the capability set. It never
issues a native call, which is what lets the same code decode a Windows find-data
record on a Linux test host.

Read-only is the one attribute with two sources on the BSDs: a file without the
owner-write bit is read-only, and so is a file carrying UF_IMMUTABLE regardless of
its mode. Both collapse into READ_ONLY; the immutable flag is never surfaced on
its own.
*/

use std::io;
use std::path::Path;

use fileattr_base::pal::{PosixStat, RawStat, WindowsFindData, bsd_flags, mode, win};
use fileattr_base::{FileattrError, FileattrResult};
use tracing::debug;

use crate::capability::{Attributes, CapabilitySet};
use crate::file_info::FileInfo;

/// Converts one raw stat record into a [`FileInfo`].
///
/// `dir_hint` is only consulted when a POSIX record carries no file type bits.
pub fn normalize(raw: &RawStat, caps: &CapabilitySet, dir_hint: Option<bool>) -> FileInfo {
    match raw {
        RawStat::Posix(stat) => normalize_posix(stat, caps, dir_hint),
        RawStat::Windows(data) => normalize_windows(data, caps),
    }
}

/// Normalizes the outcome of a stat call.
///
/// A missing path (or a path component that is not a directory) yields
/// [`FileInfo::not_found`]; any other failure is a Stat error for `path`.
pub fn normalize_result(
    path: &Path,
    result: io::Result<RawStat>,
    caps: &CapabilitySet,
    dir_hint: Option<bool>,
) -> FileattrResult<FileInfo> {
    match result {
        Ok(raw) => Ok(normalize(&raw, caps, dir_hint)),
        Err(e) if is_absent(&e) => {
            debug!(path = %path.display(), "path does not exist");
            Ok(FileInfo::not_found())
        }
        Err(e) => Err(Box::new(FileattrError::stat(path, e))),
    }
}

/// Whether a stat failure means "nothing there".
pub fn is_absent(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

/// Milliseconds since the Unix epoch from `st_mtime` seconds and nanoseconds.
pub fn unix_millis(secs: i64, nanos: u32) -> i64 {
    secs.saturating_mul(1000)
        .saturating_add(i64::from(nanos / 1_000_000))
}

/// Milliseconds since the Unix epoch from FILETIME ticks (100ns since 1601).
pub fn filetime_to_unix_millis(ticks: u64) -> i64 {
    (ticks / 10_000) as i64 - win::FILETIME_UNIX_EPOCH_MILLIS
}

fn normalize_posix(stat: &PosixStat, caps: &CapabilitySet, dir_hint: Option<bool>) -> FileInfo {
    let file_type = stat.mode & mode::S_IFMT;
    let is_directory = if file_type == 0 {
        dir_hint.unwrap_or(false)
    } else {
        file_type == mode::S_IFDIR
    };
    let flags = stat.flags.unwrap_or(0);

    let mut attributes = Attributes::empty();
    let immutable = caps.immutable_flag && flags & bsd_flags::UF_IMMUTABLE != 0;
    if stat.mode & mode::S_IWUSR == 0 || immutable {
        attributes |= Attributes::READ_ONLY;
    }
    if stat.mode & mode::S_IXUSR != 0 {
        attributes |= Attributes::EXECUTABLE;
    }
    if flags & bsd_flags::UF_HIDDEN != 0 {
        attributes |= Attributes::HIDDEN;
    }
    if flags & bsd_flags::UF_ARCHIVE != 0 {
        attributes |= Attributes::ARCHIVE;
    }

    FileInfo::existing(
        is_directory,
        unix_millis(stat.mtime_secs, stat.mtime_nanos),
        stat.size,
        attributes & caps.reportable,
    )
}

fn normalize_windows(data: &WindowsFindData, caps: &CapabilitySet) -> FileInfo {
    let is_directory = data.attributes & win::FILE_ATTRIBUTE_DIRECTORY != 0;

    let mut attributes = Attributes::empty();
    for (bit, attribute) in [
        (win::FILE_ATTRIBUTE_READONLY, Attributes::READ_ONLY),
        (win::FILE_ATTRIBUTE_HIDDEN, Attributes::HIDDEN),
        (win::FILE_ATTRIBUTE_ARCHIVE, Attributes::ARCHIVE),
    ] {
        if data.attributes & bit != 0 {
            attributes |= attribute;
        }
    }

    FileInfo::existing(
        is_directory,
        filetime_to_unix_millis(data.last_write_time),
        i64::try_from(data.size).unwrap_or(i64::MAX),
        attributes & caps.reportable,
    )
}
