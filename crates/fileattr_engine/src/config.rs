use std::path::Path;

use fileattr_base::{FileattrError, FileattrResult};
use serde::{Deserialize, Deserializer};
use tracing::debug;

/// Configuration loaded from a `fileattr.toml` file.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Default tracing filter, overridden by `RUST_LOG`.
    #[serde(default)]
    pub log_filter: Option<String>,
    #[serde(default)]
    pub attributes: AttributesConfig,
}

/// Settings of the `[attributes]` table.
#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct AttributesConfig {
    /// When false, links are followed without being reported as links.
    #[serde(default = "default_resolve_symlinks")]
    pub resolve_symlinks: bool,
    /// Octal umask used instead of the process umask, e.g. `"022"`.
    #[serde(default, deserialize_with = "deserialize_umask")]
    pub umask: Option<u32>,
}

impl Default for AttributesConfig {
    fn default() -> Self {
        Self {
            resolve_symlinks: default_resolve_symlinks(),
            umask: None,
        }
    }
}

fn default_resolve_symlinks() -> bool {
    true
}

fn deserialize_umask<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(text) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    parse_umask(&text).map(Some).map_err(serde::de::Error::custom)
}

/// Parses an octal umask such as `"022"` or `"0o077"`.
pub fn parse_umask(text: &str) -> Result<u32, String> {
    let digits = text.trim();
    let digits = digits.strip_prefix("0o").unwrap_or(digits);
    match u32::from_str_radix(digits, 8) {
        Ok(mask) if mask <= 0o777 => Ok(mask),
        Ok(_) => Err(format!("umask '{}' is larger than 0777", text)),
        Err(_) => Err(format!("umask '{}' is not an octal number", text)),
    }
}

/// Parses configuration text; `path` is only used for error reporting.
pub fn parse_config(path: &Path, text: &str) -> FileattrResult<Config> {
    toml::from_str(text).map_err(|e| Box::new(FileattrError::config(path, e.to_string())))
}

/// Loads configuration from `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> FileattrResult<Config> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Config::default());
        }
        Err(e) => {
            return Err(Box::new(FileattrError::config(
                path,
                format!("cannot read file: {}", e),
            )));
        }
    };
    parse_config(path, &text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fileattr_base::error::ErrorKind;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config(Path::new("fileattr.toml"), "").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.attributes.resolve_symlinks);
        assert_eq!(config.attributes.umask, None);
    }

    #[test]
    fn test_full_config() {
        let config = parse_config(
            Path::new("fileattr.toml"),
            r#"
log_filter = "fileattr_engine=debug"

[attributes]
resolve_symlinks = false
umask = "077"
"#,
        )
        .unwrap();
        assert_eq!(config.log_filter.as_deref(), Some("fileattr_engine=debug"));
        assert!(!config.attributes.resolve_symlinks);
        assert_eq!(config.attributes.umask, Some(0o077));
    }

    #[test]
    fn test_invalid_umask_is_config_error() {
        let err = parse_config(
            Path::new("fileattr.toml"),
            "[attributes]\numask = \"999\"\n",
        )
        .unwrap_err();
        match err.kind() {
            ErrorKind::Config { path, message } => {
                assert_eq!(path, Path::new("fileattr.toml"));
                assert!(message.contains("not an octal number"), "{}", message);
            }
            other => panic!("Expected Config variant, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = parse_config(Path::new("x.toml"), "log_filter = ").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Config { .. }));
    }

    #[test]
    fn test_parse_umask() {
        assert_eq!(parse_umask("022"), Ok(0o022));
        assert_eq!(parse_umask("0o002"), Ok(0o002));
        assert_eq!(parse_umask(" 0777 "), Ok(0o777));
        assert!(parse_umask("1000").is_err());
        assert!(parse_umask("").is_err());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("fileattr.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fileattr.toml");
        std::fs::write(&path, "[attributes]\numask = \"002\"\n").unwrap();
        assert_eq!(load_config(&path).unwrap().attributes.umask, Some(0o002));
    }
}
