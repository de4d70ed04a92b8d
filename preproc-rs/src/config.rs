//! Engine configuration file parser.
//!
//! The file is a list of `key = value` lines:
//!
//! | Key | Meaning | Default |
//! |-----|---------|---------|
//! | `max_call_depth` | nested calls before `RecursionLimitExceeded` (at most 256) | 100 |
//! | `max_loop_iterations` | iterations of one loop before `LoopLimitExceeded` | 10000 |
//! | `default_charset` | charset for `%load_csv` / `%load_json` | `UTF-8` |
//! | `allow_resource_loading` | whether resources may be read at all | `true` |
//!
//! Lines starting with `#` or `;` are comments.

use std::path::Path;

use crate::loader::is_supported_charset;

// ── Public API ────────────────────────────────────────────────────────────────

/// Largest accepted `max_call_depth`.  Every call level recurses through
/// several Rust frames, so deeper limits would exhaust the thread stack
/// before the recursion guard fires.
pub const MAX_CALL_DEPTH: usize = 256;

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

/// Engine limits and resource settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_call_depth: usize,
    pub max_loop_iterations: usize,
    pub default_charset: String,
    pub allow_resource_loading: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 100,
            max_loop_iterations: 10_000,
            default_charset: "UTF-8".into(),
            allow_resource_loading: true,
        }
    }
}

impl EngineConfig {
    /// Parse a config string.
    ///
    /// Bad lines are reported and skipped; the setting keeps its default.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = EngineConfig::default();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                errors.push(ConfigError { line: lineno, message: format!("expected key = value, got {line:?}") });
                continue;
            };
            if let Err(message) = config.apply(key.trim(), value.trim()) {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "max_call_depth" => {
                let depth = parse_positive(key, value)?;
                if depth > MAX_CALL_DEPTH {
                    return Err(format!("{key} must be at most {MAX_CALL_DEPTH}, got {depth}"));
                }
                self.max_call_depth = depth;
            }
            "max_loop_iterations" => self.max_loop_iterations = parse_positive(key, value)?,
            "default_charset" => {
                if !is_supported_charset(value) {
                    return Err(format!("unsupported charset {value:?}"));
                }
                self.default_charset = value.to_owned();
            }
            "allow_resource_loading" => self.allow_resource_loading = parse_bool(key, value)?,
            _ => return Err(format!("unknown setting {key:?}")),
        }
        Ok(())
    }
}

fn parse_positive(key: &str, value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("{key} must be a positive integer, got {value:?}")),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(format!("{key} must be a boolean, got {value:?}")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
