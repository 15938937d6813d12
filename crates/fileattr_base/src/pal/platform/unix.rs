use std::fs;
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use crate::pal::raw::{LinkMode, Platform, PosixStat, RawLinkTarget, RawStat, mode};
use crate::pal::traits::unsupported;

pub fn symlinks_supported() -> bool {
    true
}

pub fn stat(path: &Path, link_mode: LinkMode) -> io::Result<RawStat> {
    let meta = match link_mode {
        LinkMode::Follow => fs::metadata(path)?,
        LinkMode::NoFollow => fs::symlink_metadata(path)?,
    };
    Ok(RawStat::Posix(PosixStat {
        mode: meta.mode(),
        flags: st_flags(&meta),
        size: meta.size() as i64,
        mtime_secs: meta.mtime(),
        mtime_nanos: meta.mtime_nsec() as u32,
    }))
}

pub fn read_link(path: &Path) -> io::Result<RawLinkTarget> {
    let target = fs::read_link(path)?;
    Ok(RawLinkTarget::Path(target.to_string_lossy().into_owned()))
}

pub fn set_mode(path: &Path, new_mode: u32) -> io::Result<()> {
    fs::set_permissions(
        path,
        fs::Permissions::from_mode(new_mode & mode::PERMISSION_BITS),
    )
}

#[cfg(any(target_os = "macos", target_os = "freebsd"))]
pub fn set_flags(path: &Path, flags: u32) -> io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let cstr = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
    let res = unsafe { libc::chflags(cstr.as_ptr(), flags as _) };
    if res < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(any(target_os = "macos", target_os = "freebsd")))]
pub fn set_flags(_path: &Path, _flags: u32) -> io::Result<()> {
    Err(unsupported("chflags", Platform::current()))
}

pub fn set_windows_attributes(_path: &Path, _attributes: u32) -> io::Result<()> {
    Err(unsupported("SetFileAttributes", Platform::current()))
}

#[cfg(target_os = "macos")]
fn st_flags(meta: &fs::Metadata) -> Option<u32> {
    use std::os::macos::fs::MetadataExt;
    Some(meta.st_flags())
}

#[cfg(target_os = "freebsd")]
fn st_flags(meta: &fs::Metadata) -> Option<u32> {
    use std::os::freebsd::fs::MetadataExt;
    Some(meta.st_flags())
}

#[cfg(not(any(target_os = "macos", target_os = "freebsd")))]
fn st_flags(_meta: &fs::Metadata) -> Option<u32> {
    None
}
