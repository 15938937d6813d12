use serde::Serialize;

use crate::capability::Attributes;

/// Canonical metadata snapshot of one path.
///
/// For a symbolic link, `is_directory`, `length` and `last_modified` describe the
/// target while the SYMLINK attribute and `link_target` describe the link itself.
/// `link_target` is present exactly when SYMLINK is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    exists: bool,
    is_directory: bool,
    /// Milliseconds since 1970-01-01 UTC.
    last_modified: Option<i64>,
    length: Option<i64>,
    attributes: Attributes,
    link_target: Option<String>,
}

impl FileInfo {
    /// Snapshot of a path that does not exist.
    pub fn not_found() -> Self {
        Self {
            exists: false,
            is_directory: false,
            last_modified: None,
            length: None,
            attributes: Attributes::empty(),
            link_target: None,
        }
    }

    /// Snapshot of an existing non-link entry. SYMLINK is stripped from `attributes`.
    pub fn existing(
        is_directory: bool,
        last_modified: i64,
        length: i64,
        attributes: Attributes,
    ) -> Self {
        Self {
            exists: true,
            is_directory,
            last_modified: Some(last_modified),
            length: Some(if is_directory { 0 } else { length }),
            attributes: attributes - Attributes::SYMLINK,
            link_target: None,
        }
    }

    /// Snapshot of a link whose target cannot be reached.
    pub fn broken_link(target: impl Into<String>) -> Self {
        Self {
            exists: true,
            is_directory: false,
            last_modified: None,
            length: None,
            attributes: Attributes::SYMLINK,
            link_target: Some(target.into()),
        }
    }

    /// Marks this snapshot as reached through a link pointing at `target`.
    pub fn with_link_target(mut self, target: impl Into<String>) -> Self {
        self.attributes |= Attributes::SYMLINK;
        self.link_target = Some(target.into());
        self
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn last_modified(&self) -> Option<i64> {
        self.last_modified
    }

    pub fn length(&self) -> Option<i64> {
        self.length
    }

    pub fn attributes(&self) -> Attributes {
        self.attributes
    }

    pub fn link_target(&self) -> Option<&str> {
        self.link_target.as_deref()
    }

    pub fn is_read_only(&self) -> bool {
        self.attributes.contains(Attributes::READ_ONLY)
    }

    pub fn is_executable(&self) -> bool {
        self.attributes.contains(Attributes::EXECUTABLE)
    }

    pub fn is_hidden(&self) -> bool {
        self.attributes.contains(Attributes::HIDDEN)
    }

    pub fn is_archive(&self) -> bool {
        self.attributes.contains(Attributes::ARCHIVE)
    }

    pub fn is_symlink(&self) -> bool {
        self.attributes.contains(Attributes::SYMLINK)
    }
}
