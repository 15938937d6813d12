use std::io;

use super::raw::{RawLinkTarget, win};

/// Size of the `REPARSE_DATA_BUFFER` header: tag, data length, reserved.
const HEADER_LEN: usize = 8;

/// Parses the output of `FSCTL_GET_REPARSE_POINT` for symlinks and mount points.
///
/// Offsets and lengths inside the buffer are in bytes, relative to the start of the
/// path buffer, and the names are UTF-16 without terminators. A slot whose range
/// falls outside the buffer is reported as missing rather than failing the whole
/// parse; some third-party link tools only fill one of the two names.
pub fn parse_reparse_buffer(buf: &[u8]) -> io::Result<RawLinkTarget> {
    let tag = read_u32(buf, 0).ok_or_else(|| invalid("reparse buffer too short"))?;
    let path_buffer_start = match tag {
        // SubstituteNameOffset/Length, PrintNameOffset/Length, Flags
        win::IO_REPARSE_TAG_SYMLINK => HEADER_LEN + 12,
        // same without Flags
        win::IO_REPARSE_TAG_MOUNT_POINT => HEADER_LEN + 8,
        other => {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("reparse tag {:#010x} is not a link", other),
            ));
        }
    };
    if buf.len() < path_buffer_start {
        return Err(invalid("reparse buffer truncated"));
    }

    let substitute_offset = read_u16(buf, HEADER_LEN).unwrap_or(0);
    let substitute_length = read_u16(buf, HEADER_LEN + 2).unwrap_or(0);
    let print_offset = read_u16(buf, HEADER_LEN + 4).unwrap_or(0);
    let print_length = read_u16(buf, HEADER_LEN + 6).unwrap_or(0);

    let path_buffer = &buf[path_buffer_start..];
    Ok(RawLinkTarget::Reparse {
        print_name: read_name(path_buffer, print_offset, print_length),
        substitute_name: read_name(path_buffer, substitute_offset, substitute_length),
    })
}

fn read_name(path_buffer: &[u8], offset: u16, length: u16) -> Option<String> {
    let start = offset as usize;
    let end = start.checked_add(length as usize)?;
    if length == 0 || length % 2 != 0 || end > path_buffer.len() {
        return None;
    }
    let units: Vec<u16> = path_buffer[start..end]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Some(String::from_utf16_lossy(&units))
}

fn read_u16(buf: &[u8], at: usize) -> Option<u16> {
    buf.get(at..at + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    buf.get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

/// Builds a `REPARSE_DATA_BUFFER` for a symbolic link.
#[cfg(test)]
pub(crate) fn encode_symlink_buffer(substitute_name: &str, print_name: &str) -> Vec<u8> {
    let substitute: Vec<u8> = substitute_name
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect();
    let print: Vec<u8> = print_name.encode_utf16().flat_map(u16::to_le_bytes).collect();

    let mut buf = Vec::new();
    buf.extend_from_slice(&win::IO_REPARSE_TAG_SYMLINK.to_le_bytes());
    let data_length = 12 + substitute.len() + print.len();
    buf.extend_from_slice(&(data_length as u16).to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&(substitute.len() as u16).to_le_bytes());
    buf.extend_from_slice(&(substitute.len() as u16).to_le_bytes());
    buf.extend_from_slice(&(print.len() as u16).to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&substitute);
    buf.extend_from_slice(&print);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_symlink_with_both_names() {
        let buf = encode_symlink_buffer(r"\??\C:\data\target.txt", r"C:\data\target.txt");
        let parsed = parse_reparse_buffer(&buf).unwrap();
        assert_eq!(
            parsed,
            RawLinkTarget::Reparse {
                print_name: Some(r"C:\data\target.txt".to_string()),
                substitute_name: Some(r"\??\C:\data\target.txt".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_symlink_with_empty_print_name() {
        let buf = encode_symlink_buffer(r"\??\C:\only\substitute", "");
        let parsed = parse_reparse_buffer(&buf).unwrap();
        assert_eq!(
            parsed,
            RawLinkTarget::Reparse {
                print_name: None,
                substitute_name: Some(r"\??\C:\only\substitute".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_mount_point() {
        let name: Vec<u8> = r"\??\D:\mnt"
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect();
        let mut buf = Vec::new();
        buf.extend_from_slice(&win::IO_REPARSE_TAG_MOUNT_POINT.to_le_bytes());
        buf.extend_from_slice(&((8 + name.len()) as u16).to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&name);

        let parsed = parse_reparse_buffer(&buf).unwrap();
        assert_eq!(
            parsed,
            RawLinkTarget::Reparse {
                print_name: None,
                substitute_name: Some(r"\??\D:\mnt".to_string()),
            }
        );
    }

    #[test]
    fn test_out_of_range_slot_is_missing() {
        let mut buf = encode_symlink_buffer(r"\??\C:\x", r"C:\x");
        // point the print name past the end of the buffer
        buf[HEADER_LEN + 4..HEADER_LEN + 6].copy_from_slice(&0x4000u16.to_le_bytes());
        let parsed = parse_reparse_buffer(&buf).unwrap();
        assert_eq!(
            parsed,
            RawLinkTarget::Reparse {
                print_name: None,
                substitute_name: Some(r"\??\C:\x".to_string()),
            }
        );
    }

    #[test]
    fn test_unknown_tag_is_unsupported() {
        let mut buf = encode_symlink_buffer("a", "a");
        buf[0..4].copy_from_slice(&0x8000_0013u32.to_le_bytes());
        let err = parse_reparse_buffer(&buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn test_truncated_buffer_is_invalid() {
        let err = parse_reparse_buffer(&[0x0C, 0x00]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let buf = encode_symlink_buffer("a", "a");
        let err = parse_reparse_buffer(&buf[..12]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
