use std::fs;
use std::io;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::fs::{MetadataExt, OpenOptionsExt};
use std::os::windows::io::AsRawHandle;
use std::path::Path;
use std::ptr;

use windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE;
use windows_sys::Win32::Storage::FileSystem::{
    FILE_FLAG_BACKUP_SEMANTICS, FILE_FLAG_OPEN_REPARSE_POINT, FindClose, FindFirstFileW,
    SetFileAttributesW, WIN32_FIND_DATAW,
};
use windows_sys::Win32::System::IO::DeviceIoControl;
use windows_sys::Win32::System::Ioctl::FSCTL_GET_REPARSE_POINT;
use windows_sys::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};

use crate::pal::raw::{LinkMode, Platform, RawLinkTarget, RawStat, WindowsFindData};
use crate::pal::reparse::parse_reparse_buffer;
use crate::pal::traits::unsupported;

const MAXIMUM_REPARSE_DATA_BUFFER_SIZE: usize = 16 * 1024;

fn to_wide(path: &Path) -> Vec<u16> {
    path.as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// `CreateSymbolicLinkW` appeared with Vista; look it up instead of assuming it.
pub fn symlinks_supported() -> bool {
    let module_name = to_wide(Path::new("kernel32.dll"));
    unsafe {
        let module = GetModuleHandleW(module_name.as_ptr());
        if module.is_null() {
            return false;
        }
        GetProcAddress(module, b"CreateSymbolicLinkW\0".as_ptr()).is_some()
    }
}

pub fn stat(path: &Path, link_mode: LinkMode) -> io::Result<RawStat> {
    match link_mode {
        LinkMode::Follow => Ok(metadata_stat(&fs::metadata(path)?)),
        // FindFirstFileW cannot enumerate volume roots such as `C:\`
        LinkMode::NoFollow if path.file_name().is_none() => {
            Ok(metadata_stat(&fs::symlink_metadata(path)?))
        }
        LinkMode::NoFollow => find_first_file(path),
    }
}

fn metadata_stat(meta: &fs::Metadata) -> RawStat {
    RawStat::Windows(WindowsFindData {
        attributes: meta.file_attributes(),
        reparse_tag: 0,
        size: meta.file_size(),
        last_write_time: meta.last_write_time(),
    })
}

fn find_first_file(path: &Path) -> io::Result<RawStat> {
    let wide = to_wide(path);
    let mut data: WIN32_FIND_DATAW = unsafe { mem::zeroed() };
    let handle = unsafe { FindFirstFileW(wide.as_ptr(), &mut data) };
    if handle == INVALID_HANDLE_VALUE {
        return Err(io::Error::last_os_error());
    }
    unsafe { FindClose(handle) };
    Ok(RawStat::Windows(WindowsFindData {
        attributes: data.dwFileAttributes,
        reparse_tag: data.dwReserved0,
        size: ((data.nFileSizeHigh as u64) << 32) | data.nFileSizeLow as u64,
        last_write_time: ((data.ftLastWriteTime.dwHighDateTime as u64) << 32)
            | data.ftLastWriteTime.dwLowDateTime as u64,
    }))
}

pub fn read_link(path: &Path) -> io::Result<RawLinkTarget> {
    let file = fs::OpenOptions::new()
        .access_mode(0)
        .custom_flags(FILE_FLAG_OPEN_REPARSE_POINT | FILE_FLAG_BACKUP_SEMANTICS)
        .open(path)?;
    let mut buf = vec![0u8; MAXIMUM_REPARSE_DATA_BUFFER_SIZE];
    let mut returned = 0u32;
    let ok = unsafe {
        DeviceIoControl(
            file.as_raw_handle() as _,
            FSCTL_GET_REPARSE_POINT,
            ptr::null(),
            0,
            buf.as_mut_ptr().cast(),
            buf.len() as u32,
            &mut returned,
            ptr::null_mut(),
        )
    };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    buf.truncate(returned as usize);
    parse_reparse_buffer(&buf)
}

pub fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Err(unsupported("chmod", Platform::Windows))
}

pub fn set_flags(_path: &Path, _flags: u32) -> io::Result<()> {
    Err(unsupported("chflags", Platform::Windows))
}

pub fn set_windows_attributes(path: &Path, attributes: u32) -> io::Result<()> {
    let wide = to_wide(path);
    if unsafe { SetFileAttributesW(wide.as_ptr(), attributes) } == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
