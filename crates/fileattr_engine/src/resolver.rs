use std::io;
use std::path::Path;

use fileattr_base::pal::{LinkMode, Pal, RawLinkTarget};
use fileattr_base::{FileattrError, FileattrResult};
use tracing::{debug, instrument, warn};

use crate::capability::{Attributes, CapabilitySet};
use crate::file_info::FileInfo;
use crate::normalizer::{is_absent, normalize, normalize_result};

/// Prefix of NT object-manager paths in a reparse point's substitute name.
const NT_PATH_PREFIX: &str = r"\??\";

/// Fetches a [`FileInfo`] for `path`, describing links and their targets.
///
/// The link itself is inspected first. For a link, the target text is read and
/// the path is stat'ed again following the link; if that fails for any reason
/// the snapshot still exists and carries SYMLINK and the target text, but no
/// length, timestamp or other attributes.
#[instrument(skip(pal, caps), fields(path = %path.display()))]
pub fn resolve_and_stat(
    pal: &dyn Pal,
    caps: &CapabilitySet,
    path: &Path,
) -> FileattrResult<FileInfo> {
    if !caps.can_report(Attributes::SYMLINK) {
        return normalize_result(path, pal.stat(path, LinkMode::Follow), caps, None);
    }

    let link_record = match pal.stat(path, LinkMode::NoFollow) {
        Ok(raw) => raw,
        Err(e) if is_absent(&e) => return Ok(FileInfo::not_found()),
        Err(e) => return Err(Box::new(FileattrError::stat(path, e))),
    };
    if !link_record.is_symlink() {
        return Ok(normalize(&link_record, caps, None));
    }

    let target = pal
        .read_link(path)
        .and_then(link_target_text)
        .map_err(|e| Box::new(FileattrError::stat(path, e).context("reading link target")))?;
    debug!(%target, "path is a symbolic link");

    match pal.stat(path, LinkMode::Follow) {
        Ok(target_record) => Ok(normalize(&target_record, caps, None).with_link_target(target)),
        Err(e) => {
            warn!(%target, error = %e, "symbolic link target is unreachable");
            Ok(FileInfo::broken_link(target))
        }
    }
}

/// Picks the text to report for a link target.
///
/// Reparse points prefer the print name; without one the substitute name is used
/// with its `\??\` prefix removed.
pub fn link_target_text(raw: RawLinkTarget) -> io::Result<String> {
    match raw {
        RawLinkTarget::Path(target) => Ok(target),
        RawLinkTarget::Reparse {
            print_name,
            substitute_name,
        } => {
            if let Some(print) = print_name.filter(|name| !name.is_empty()) {
                return Ok(print);
            }
            match substitute_name.filter(|name| !name.is_empty()) {
                Some(substitute) => Ok(substitute
                    .strip_prefix(NT_PATH_PREFIX)
                    .map(str::to_string)
                    .unwrap_or(substitute)),
                None => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "reparse point carries no target name",
                )),
            }
        }
    }
}
