//! File configuration for engine defaults and proxy routing.
//!
//! The file uses a minimal `key = value` syntax with `#` comments and
//! double-quoted strings:
//!
//! ```text
//! window_size = 8
//! timeout_secs = 120
//! proxy_address = "proxy.corp.net"
//! proxy_port = 3128
//! internal_addresses = "10.0.0.5, storage.local"
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::options::EngineConfig;
use crate::proxy::{self, EnvProxySource, ProxySettings, ProxySource, StaticProxySource};
use crate::request::OptionOverrides;

/// Errors raised while loading a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config syntax on line {line}: expected key = value")]
    Syntax { line: usize },

    #[error("unknown configuration key '{key}' on line {line}")]
    UnknownKey { key: String, line: usize },

    #[error("invalid `{key}` value on line {line}: {reason}")]
    InvalidValue {
        key: String,
        line: usize,
        reason: String,
    },

    #[error("invalid config value for `{key}`: {value}. Expected range: {expected}")]
    OutOfRange {
        key: &'static str,
        value: u64,
        expected: &'static str,
    },
}

/// Settings read from `config.toml`. Unset keys keep the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub window_size: Option<usize>,
    pub connect_timeout_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub verify_tls: Option<bool>,
    pub follow_redirects: Option<bool>,
    pub proxy_address: Option<String>,
    pub proxy_port: Option<u16>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    /// Comma-separated hosts that bypass the proxy.
    pub internal_addresses: Option<String>,
}

impl FileConfig {
    /// Checks every set value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first value out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(window) = self.window_size
            && !(2..=100).contains(&window)
        {
            return Err(ConfigError::OutOfRange {
                key: "window_size",
                value: u64::try_from(window).unwrap_or(u64::MAX),
                expected: "2..=100",
            });
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("timeout_secs", self.timeout_secs)?;
        if self.proxy_port == Some(0) {
            return Err(ConfigError::OutOfRange {
                key: "proxy_port",
                value: 0,
                expected: "1..=65535",
            });
        }
        Ok(())
    }

    /// Engine configuration with this file's values layered over the defaults.
    #[must_use]
    pub fn to_engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if let Some(window) = self.window_size {
            config.window_size = window;
        }
        if let Some(follow) = self.follow_redirects {
            config.sandboxed = !follow;
        }
        let overrides = OptionOverrides {
            verify_tls: self.verify_tls,
            connect_timeout: self.connect_timeout_secs.map(Duration::from_secs),
            timeout: self.timeout_secs.map(Duration::from_secs),
            ..OptionOverrides::default()
        };
        config.merge_options(&overrides);
        config
    }

    /// Proxy source for the engine.
    ///
    /// A configured `proxy_address` takes precedence; otherwise proxy
    /// settings come from the environment.
    #[must_use]
    pub fn proxy_source(&self) -> Arc<dyn ProxySource> {
        let internal = self
            .internal_addresses
            .as_deref()
            .map(proxy::split_address_list)
            .unwrap_or_default();

        match &self.proxy_address {
            Some(address) if !address.trim().is_empty() => {
                let settings = ProxySettings {
                    address: address.trim().to_string(),
                    port: self.proxy_port.unwrap_or(DEFAULT_PROXY_PORT),
                    username: self.proxy_username.clone(),
                    password: self.proxy_password.clone(),
                };
                Arc::new(StaticProxySource::new(Some(settings), internal))
            }
            _ if !internal.is_empty() => Arc::new(StaticProxySource::new(
                EnvProxySource::from_env().proxy_settings(),
                internal,
            )),
            _ => Arc::new(EnvProxySource::from_env()),
        }
    }
}

const DEFAULT_PROXY_PORT: u16 = 8080;

fn validate_timeout_secs(key: &'static str, value: Option<u64>) -> Result<(), ConfigError> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=86_400).contains(&value) {
        return Err(ConfigError::OutOfRange {
            key,
            value,
            expected: "1..=86400",
        });
    }
    Ok(())
}

/// Default config location.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/batchfetch/config.toml`
/// 2. `$HOME/.config/batchfetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("batchfetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("batchfetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads `path`, or the default location when `path` is `None`.
///
/// A missing file yields the defaults.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file exists but cannot be read, parsed
/// or validated.
pub fn load(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let resolved = match path {
        Some(path) => Some(path.to_path_buf()),
        None => resolve_default_config_path(),
    };
    let Some(resolved) = resolved else {
        return Ok(FileConfig::default());
    };
    if !resolved.exists() {
        debug!(path = %resolved.display(), "no config file, using defaults");
        return Ok(FileConfig::default());
    }

    let raw = fs::read_to_string(&resolved).map_err(|source| ConfigError::Read {
        path: resolved.clone(),
        source,
    })?;
    let config = parse_config_str(&raw)?;
    debug!(path = %resolved.display(), "config file loaded");
    Ok(config)
}

/// Parses config file contents.
///
/// # Errors
///
/// Returns [`ConfigError`] for malformed lines, unknown keys, bad values or
/// values out of range.
pub fn parse_config_str(raw: &str) -> Result<FileConfig, ConfigError> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            return Err(ConfigError::Syntax { line: line_no });
        };
        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = |reason: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            line: line_no,
            reason: reason.to_string(),
        };

        match key {
            "window_size" => {
                let parsed = parse_integer(value).map_err(invalid)?;
                cfg.window_size = Some(usize::try_from(parsed).map_err(|_| invalid("too large"))?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer(value).map_err(invalid)?);
            }
            "timeout_secs" => cfg.timeout_secs = Some(parse_integer(value).map_err(invalid)?),
            "verify_tls" => cfg.verify_tls = Some(parse_boolean(value).map_err(invalid)?),
            "follow_redirects" => {
                cfg.follow_redirects = Some(parse_boolean(value).map_err(invalid)?);
            }
            "proxy_address" => {
                cfg.proxy_address = Some(parse_string_literal(value).map_err(invalid)?);
            }
            "proxy_port" => {
                let parsed = parse_integer(value).map_err(invalid)?;
                cfg.proxy_port =
                    Some(u16::try_from(parsed).map_err(|_| invalid("expected 1..=65535"))?);
            }
            "proxy_username" => {
                cfg.proxy_username = Some(parse_string_literal(value).map_err(invalid)?);
            }
            "proxy_password" => {
                cfg.proxy_password = Some(parse_string_literal(value).map_err(invalid)?);
            }
            "internal_addresses" => {
                cfg.internal_addresses = Some(parse_string_literal(value).map_err(invalid)?);
            }
            unknown => {
                return Err(ConfigError::UnknownKey {
                    key: unknown.to_string(),
                    line: line_no,
                });
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
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

fn parse_string_literal(raw_value: &str) -> Result<String, &'static str> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        return Err("expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer(raw_value: &str) -> Result<u64, &'static str> {
    let token = raw_value.trim();
    if token.is_empty() {
        return Err("expected integer value");
    }
    if token.starts_with('-') {
        return Err("expected non-negative integer");
    }
    token.parse::<u64>().map_err(|_| "expected integer value")
}

fn parse_boolean(raw_value: &str) -> Result<bool, &'static str> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err("expected 'true' or 'false'"),
    }
}
