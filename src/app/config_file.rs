//! Config file loading for server and run defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// `key = value` file configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Remote directory every path layout is rooted at.
    pub base_path: Option<String>,
    /// Default station list.
    pub stations: Option<Vec<String>>,
    /// Default local root directory.
    pub local_root: Option<PathBuf>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    /// Default worker cap (1..=64).
    pub max_workers: Option<u16>,
    /// Default retries after the first attempt (0..=10).
    pub retry_attempts: Option<u32>,
    /// Base delay between attempts in milliseconds.
    pub retry_delay_ms: Option<u64>,
    /// Accepted file extensions; empty or absent accepts all.
    pub extensions: Option<Vec<String>>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if self.port == Some(0) {
            bail!("Invalid config value for `port`: 0. Expected range: 1..=65535");
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;

        if let Some(max_workers) = self.max_workers
            && !(1..=64).contains(&max_workers)
        {
            bail!("Invalid config value for `max_workers`: {max_workers}. Expected range: 1..=64");
        }
        if let Some(retries) = self.retry_attempts
            && retries > 10
        {
            bail!("Invalid config value for `retry_attempts`: {retries}. Expected range: 0..=10");
        }
        if let Some(delay) = self.retry_delay_ms
            && delay > 60_000
        {
            bail!("Invalid config value for `retry_delay_ms`: {delay}. Expected range: 0..=60000");
        }
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/station-downloader/config.toml`
/// 2. `$HOME/.config/station-downloader/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("station-downloader")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("station-downloader")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the explicit config file, or the default one if it exists.
///
/// An explicit path that does not exist is an error; a missing default file
/// is not.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return read_file_config(path).map(Some);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => read_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let line_no = line_index + 1;

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "host" => cfg.host = Some(parse_string_literal(value).with_context(invalid)?),
            "port" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let port = u16::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("port out of range for u16"))
                    .with_context(invalid)?;
                cfg.port = Some(port);
            }
            "username" => cfg.username = Some(parse_string_literal(value).with_context(invalid)?),
            "password" => cfg.password = Some(parse_string_literal(value).with_context(invalid)?),
            "base_path" => cfg.base_path = Some(parse_string_literal(value).with_context(invalid)?),
            "stations" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.stations = Some(split_list(&parsed));
            }
            "local_root" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.local_root = Some(PathBuf::from(parsed));
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "max_workers" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = u16::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("max_workers out of range for u16"))
                    .with_context(invalid)?;
                cfg.max_workers = Some(n);
            }
            "retry_attempts" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("retry_attempts out of range for u32"))
                    .with_context(invalid)?;
                cfg.retry_attempts = Some(n);
            }
            "retry_delay_ms" => {
                cfg.retry_delay_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "extensions" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.extensions = Some(split_list(&parsed));
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Comma-separated list with blanks dropped.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_full() {
        let cfg = parse_config_str(
            r#"
# station server
host = "ftp.example.com"
port = 2121
username = "ops"
password = "p#ss" # hash inside quotes is kept
base_path = "/rtutrg"
stations = "STATION1, STATION1RF,,"
local_root = "/data/stations"
connect_timeout_secs = 15
read_timeout_secs = 120
max_workers = 6
retry_attempts = 2
retry_delay_ms = 500
extensions = "txt,csv"
"#,
        )
        .expect("full config should parse");
        assert_eq!(cfg.host.as_deref(), Some("ftp.example.com"));
        assert_eq!(cfg.port, Some(2121));
        assert_eq!(cfg.password.as_deref(), Some("p#ss"));
        assert_eq!(
            cfg.stations,
            Some(vec!["STATION1".to_string(), "STATION1RF".to_string()])
        );
        assert_eq!(cfg.local_root, Some(PathBuf::from("/data/stations")));
        assert_eq!(cfg.max_workers, Some(6));
        assert_eq!(cfg.retry_attempts, Some(2));
        assert_eq!(cfg.retry_delay_ms, Some(500));
        assert_eq!(
            cfg.extensions,
            Some(vec!["txt".to_string(), "csv".to_string()])
        );
    }

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str("host = \"h\"").expect("partial config should parse");
        assert_eq!(cfg.host.as_deref(), Some("h"));
        assert!(cfg.port.is_none());
        assert!(cfg.stations.is_none());
    }

    #[test]
    fn test_parse_config_rejects_port_zero_and_overflow() {
        let err = parse_config_str("port = 0").expect_err("port 0 rejected");
        assert!(err.to_string().contains("port"));
        let err = parse_config_str("port = 70000").expect_err("port overflow rejected");
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_max_workers() {
        let err = parse_config_str("max_workers = 65").expect_err("invalid max_workers expected");
        assert!(err.to_string().contains("max_workers"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_retry_attempts() {
        let err = parse_config_str("retry_attempts = 11").expect_err("invalid retries expected");
        assert!(err.to_string().contains("retry_attempts"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_timeout_value() {
        let err =
            parse_config_str("connect_timeout_secs = 0").expect_err("invalid timeout expected");
        assert!(err.to_string().contains("connect_timeout_secs"));
        let err =
            parse_config_str("read_timeout_secs = 3601").expect_err("invalid timeout expected");
        assert!(err.to_string().contains("read_timeout_secs"));
    }

    #[test]
    fn test_parse_config_rejects_unquoted_string() {
        let err = parse_config_str("host = ftp.example.com").expect_err("quotes required");
        assert!(format!("{err:#}").contains("double-quoted"));
    }

    #[test]
    fn test_parse_config_rejects_numeric_values_with_trailing_tokens() {
        let err = parse_config_str("max_workers = 4 trailing")
            .expect_err("expected trailing token error");
        assert!(err.to_string().contains("max_workers"));
    }

    #[test]
    fn test_parse_config_rejects_missing_equals() {
        let err = parse_config_str("host").expect_err("syntax error expected");
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_keys() {
        let err = parse_config_str("unknown_key = 123").expect_err("unknown key error expected");
        assert!(err.to_string().contains("Unknown configuration key"));
        assert!(err.to_string().contains("unknown_key"));
    }

    #[test]
    fn test_load_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.toml");
        assert!(load_file_config(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "host = \"ftp.example.com\"\n").expect("write config");
        let cfg = load_file_config(Some(&path))
            .expect("config loads")
            .expect("config present");
        assert_eq!(cfg.host.as_deref(), Some("ftp.example.com"));
    }
}
