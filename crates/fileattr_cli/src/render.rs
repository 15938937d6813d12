use std::fmt::Write;
use std::path::Path;

use fileattr_engine::{AttributeDelta, Attributes, CapabilitySet, FileInfo, MutationModel};
use serde::Serialize;

/// JSON form of one `stat` result.
#[derive(Debug, Serialize)]
pub struct StatEntry<'a> {
    pub path: &'a Path,
    #[serde(flatten)]
    pub info: &'a FileInfo,
}

/// JSON form of the `caps` output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsView {
    pub platform: String,
    pub reportable: Attributes,
    pub settable: Attributes,
    pub link_target: bool,
    pub immutable_flag: bool,
    pub mutation_model: MutationModel,
    pub umask: String,
}

impl CapsView {
    pub fn new(caps: &CapabilitySet, umask: u32) -> Self {
        Self {
            platform: caps.platform.to_string(),
            reportable: caps.reportable,
            settable: caps.settable,
            link_target: caps.link_target,
            immutable_flag: caps.immutable_flag,
            mutation_model: caps.mutation_model,
            umask: format!("{:03o}", umask),
        }
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn attribute_list(attributes: Attributes) -> String {
    if attributes.is_empty() {
        return "-".to_string();
    }
    attributes
        .iter_names()
        .map(|(name, _)| name.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn render_info(path: &Path, info: &FileInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", path.display());
    if !info.exists() {
        let _ = writeln!(out, "  exists:        no");
        return out;
    }
    let _ = writeln!(out, "  exists:        yes");
    let _ = writeln!(out, "  directory:     {}", yes_no(info.is_directory()));
    let _ = writeln!(
        out,
        "  length:        {}",
        info.length().map_or("-".to_string(), |len| len.to_string())
    );
    let _ = writeln!(
        out,
        "  last modified: {}",
        info.last_modified()
            .map_or("-".to_string(), |ms| ms.to_string())
    );
    let _ = writeln!(out, "  attributes:    {}", attribute_list(info.attributes()));
    if let Some(target) = info.link_target() {
        let _ = writeln!(out, "  link target:   {}", target);
    }
    out
}

pub fn render_caps(view: &CapsView) -> String {
    let model = match view.mutation_model {
        MutationModel::PermissionMask => "permission mask",
        MutationModel::PermissionMaskWithFlags => "permission mask with file flags",
        MutationModel::AttributeWord => "attribute word",
    };
    let mut out = String::new();
    let _ = writeln!(out, "platform:       {}", view.platform);
    let _ = writeln!(out, "reportable:     {}", attribute_list(view.reportable));
    let _ = writeln!(out, "settable:       {}", attribute_list(view.settable));
    let _ = writeln!(out, "link targets:   {}", yes_no(view.link_target));
    let _ = writeln!(out, "immutable flag: {}", yes_no(view.immutable_flag));
    let _ = writeln!(out, "mutation model: {}", model);
    let _ = writeln!(out, "umask:          {}", view.umask);
    out
}

pub fn render_delta(path: &Path, delta: &AttributeDelta) -> String {
    if delta.is_empty() {
        return format!("{}: attributes unchanged\n", path.display());
    }
    let mut out = String::new();
    for op in delta.ops() {
        let _ = writeln!(out, "{}: {}", path.display(), op);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;
    use fileattr_base::Platform;
    use fileattr_engine::{capabilities_for, compute_delta};
    use fileattr_base::pal::{PosixStat, RawStat, mode};

    #[test]
    fn test_render_existing_link() {
        let info = FileInfo::existing(false, 1_700_000_000_000, 42, Attributes::READ_ONLY)
            .with_link_target("../real.txt");
        expect![[r#"
            /tmp/link.txt
              exists:        yes
              directory:     no
              length:        42
              last modified: 1700000000000
              attributes:    read_only, symlink
              link target:   ../real.txt
        "#]]
        .assert_eq(&render_info(Path::new("/tmp/link.txt"), &info));
    }

    #[test]
    fn test_render_missing() {
        expect![[r#"
            /tmp/none
              exists:        no
        "#]]
        .assert_eq(&render_info(Path::new("/tmp/none"), &FileInfo::not_found()));
    }

    #[test]
    fn test_render_broken_link() {
        expect![[r#"
            /l
              exists:        yes
              directory:     no
              length:        -
              last modified: -
              attributes:    symlink
              link target:   gone
        "#]]
        .assert_eq(&render_info(Path::new("/l"), &FileInfo::broken_link("gone")));
    }

    #[test]
    fn test_render_caps() {
        let view = CapsView::new(&capabilities_for(Platform::Windows), 0);
        expect![[r#"
            platform:       windows
            reportable:     read_only, hidden, archive, symlink
            settable:       read_only, hidden, archive
            link targets:   yes
            immutable flag: no
            mutation model: attribute word
            umask:          000
        "#]]
        .assert_eq(&render_caps(&view));
    }

    #[test]
    fn test_caps_json() {
        let view = CapsView::new(&capabilities_for(Platform::Linux), 0o022);
        expect![[r#"{"platform":"linux","reportable":"READ_ONLY | EXECUTABLE | SYMLINK","settable":"READ_ONLY | EXECUTABLE","linkTarget":true,"immutableFlag":false,"mutationModel":"permission_mask","umask":"022"}"#]]
            .assert_eq(&serde_json::to_string(&view).unwrap());
    }

    #[test]
    fn test_stat_entry_json_flattens_info() {
        let info = FileInfo::existing(true, 0, 4096, Attributes::EXECUTABLE);
        let entry = StatEntry {
            path: Path::new("/srv"),
            info: &info,
        };
        expect![[r#"{"path":"/srv","exists":true,"isDirectory":true,"lastModified":0,"length":0,"attributes":"EXECUTABLE","linkTarget":null}"#]]
            .assert_eq(&serde_json::to_string(&entry).unwrap());
    }

    #[test]
    fn test_render_delta() {
        let raw = RawStat::Posix(PosixStat {
            mode: mode::S_IFREG | 0o644,
            flags: None,
            size: 0,
            mtime_secs: 0,
            mtime_nanos: 0,
        });
        let caps = capabilities_for(Platform::Linux);
        let delta = compute_delta(&raw, Attributes::READ_ONLY, &caps, 0o022);
        assert_eq!(render_delta(Path::new("/a"), &delta), "/a: chmod 0444\n");

        let unchanged = compute_delta(&raw, Attributes::empty(), &caps, 0o022);
        assert_eq!(
            render_delta(Path::new("/a"), &unchanged),
            "/a: attributes unchanged\n"
        );
    }
}
