/* 📖 # What are raw records?

The PAL returns metadata exactly as the operating system reports it: a POSIX mode word
plus optional BSD flags, or a Windows find-data record. Interpretation (read-only,
hidden, timestamps) happens in the engine's normalizer, so the same logic runs against
the real filesystem and against `MockPal` pretending to be another platform.

The native constants below are spelled out rather than taken from `libc`/`windows-sys`
for that reason: a Windows find-data record must be decodable on a Linux test host.
*/

/// POSIX mode bits.
pub mod mode {
    pub const S_IFMT: u32 = 0o170000;
    pub const S_IFDIR: u32 = 0o040000;
    pub const S_IFREG: u32 = 0o100000;
    pub const S_IFLNK: u32 = 0o120000;

    pub const S_IWUSR: u32 = 0o200;
    pub const S_IXUSR: u32 = 0o100;
    pub const S_IWGRP: u32 = 0o020;
    pub const S_IXGRP: u32 = 0o010;
    pub const S_IWOTH: u32 = 0o002;
    pub const S_IXOTH: u32 = 0o001;

    pub const PERMISSION_BITS: u32 = 0o7777;
    pub const ALL_WRITE: u32 = S_IWUSR | S_IWGRP | S_IWOTH;
    pub const ALL_EXECUTE: u32 = S_IXUSR | S_IXGRP | S_IXOTH;
}

/// BSD `st_flags` user flags (macOS and FreeBSD share these values).
pub mod bsd_flags {
    pub const UF_IMMUTABLE: u32 = 0x0000_0002;
    /// FreeBSD only.
    pub const UF_ARCHIVE: u32 = 0x0000_0800;
    pub const UF_HIDDEN: u32 = 0x0000_8000;
}

/// Windows file attribute bits and reparse tags.
pub mod win {
    pub const FILE_ATTRIBUTE_READONLY: u32 = 0x0000_0001;
    pub const FILE_ATTRIBUTE_HIDDEN: u32 = 0x0000_0002;
    pub const FILE_ATTRIBUTE_SYSTEM: u32 = 0x0000_0004;
    pub const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x0000_0010;
    pub const FILE_ATTRIBUTE_ARCHIVE: u32 = 0x0000_0020;
    pub const FILE_ATTRIBUTE_NORMAL: u32 = 0x0000_0080;
    pub const FILE_ATTRIBUTE_TEMPORARY: u32 = 0x0000_0100;
    pub const FILE_ATTRIBUTE_REPARSE_POINT: u32 = 0x0000_0400;
    pub const FILE_ATTRIBUTE_OFFLINE: u32 = 0x0000_1000;
    pub const FILE_ATTRIBUTE_NOT_CONTENT_INDEXED: u32 = 0x0000_2000;

    /// Bits `SetFileAttributesW` accepts; everything else is read-only state.
    pub const SETTABLE_ATTRIBUTES: u32 = FILE_ATTRIBUTE_READONLY
        | FILE_ATTRIBUTE_HIDDEN
        | FILE_ATTRIBUTE_SYSTEM
        | FILE_ATTRIBUTE_ARCHIVE
        | FILE_ATTRIBUTE_NORMAL
        | FILE_ATTRIBUTE_TEMPORARY
        | FILE_ATTRIBUTE_OFFLINE
        | FILE_ATTRIBUTE_NOT_CONTENT_INDEXED;

    pub const IO_REPARSE_TAG_MOUNT_POINT: u32 = 0xA000_0003;
    pub const IO_REPARSE_TAG_SYMLINK: u32 = 0xA000_000C;

    /// 100ns ticks between 1601-01-01 and 1970-01-01.
    pub const FILETIME_UNIX_EPOCH_TICKS: u64 = 116_444_736_000_000_000;
    /// Milliseconds between 1601-01-01 and 1970-01-01.
    pub const FILETIME_UNIX_EPOCH_MILLIS: i64 = 11_644_473_600_000;
}

/// Operating system family a PAL implementation speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux,
    MacOs,
    FreeBsd,
    Windows,
    /// Any other unix without BSD file flags.
    OtherUnix,
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "linux") || cfg!(target_os = "android") {
            Platform::Linux
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "freebsd") {
            Platform::FreeBsd
        } else {
            Platform::OtherUnix
        }
    }

    pub fn is_windows_family(self) -> bool {
        self == Platform::Windows
    }

    /// Whether the platform carries BSD-style `st_flags`.
    pub fn has_bsd_flags(self) -> bool {
        matches!(self, Platform::MacOs | Platform::FreeBsd)
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
            Platform::FreeBsd => "freebsd",
            Platform::Windows => "windows",
            Platform::OtherUnix => "unix",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a stat call follows a trailing symbolic link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkMode {
    /// `stat`: report the link's target.
    Follow,
    /// `lstat` / `FindFirstFile`: report the link itself.
    NoFollow,
}

/// Result of a POSIX `stat`/`lstat` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosixStat {
    /// Full `st_mode`, including the file type bits.
    pub mode: u32,
    /// `st_flags` where the platform has them.
    pub flags: Option<u32>,
    pub size: i64,
    pub mtime_secs: i64,
    pub mtime_nanos: u32,
}

/// The parts of a `WIN32_FIND_DATAW` record the normalizer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowsFindData {
    pub attributes: u32,
    /// `dwReserved0`; only meaningful when the reparse-point attribute is set.
    pub reparse_tag: u32,
    pub size: u64,
    /// FILETIME: 100ns ticks since 1601-01-01 UTC.
    pub last_write_time: u64,
}

/// Raw metadata as returned by a platform stat adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawStat {
    Posix(PosixStat),
    Windows(WindowsFindData),
}

impl RawStat {
    /// Whether this record describes a symbolic link (or junction) rather than its target.
    pub fn is_symlink(&self) -> bool {
        match self {
            RawStat::Posix(stat) => stat.mode & mode::S_IFMT == mode::S_IFLNK,
            RawStat::Windows(data) => {
                data.attributes & win::FILE_ATTRIBUTE_REPARSE_POINT != 0
                    && matches!(
                        data.reparse_tag,
                        win::IO_REPARSE_TAG_SYMLINK | win::IO_REPARSE_TAG_MOUNT_POINT
                    )
            }
        }
    }
}

/// Raw link target as read from the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawLinkTarget {
    /// `readlink` result.
    Path(String),
    /// Both name slots of a reparse point; either may be missing or empty.
    Reparse {
        print_name: Option<String>,
        substitute_name: Option<String>,
    },
}
