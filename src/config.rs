//! Environment configuration.
//!
//! Defaults can be overridden from the process environment:
//!
//! - `TYPECORE_DEPRECATE_LEVEL`: `0`/`stop`/`reject`, `1`/`warn`, `2`/`ignore`
//! - `TYPECORE_USER_NAMESPACE`: `1`/`true`/`on` or `0`/`false`/`off`

use std::env;
use std::fmt;

/// What to do when a deprecated name is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeprecateLevel {
    Reject,
    Warn,
    Ignore,
}

impl DeprecateLevel {
    /// Maps the numeric strictness level (0 = error, 1 = warning, 2 = allowed).
    /// Out-of-range values clamp to the nearest level.
    pub fn from_level(level: i64) -> Self {
        match level {
            i64::MIN..=0 => DeprecateLevel::Reject,
            1 => DeprecateLevel::Warn,
            _ => DeprecateLevel::Ignore,
        }
    }

    pub fn as_level(self) -> i64 {
        match self {
            DeprecateLevel::Reject => 0,
            DeprecateLevel::Warn => 1,
            DeprecateLevel::Ignore => 2,
        }
    }

    pub fn parse(spec: &str) -> Option<Self> {
        match spec.trim().to_ascii_lowercase().as_str() {
            "0" | "stop" | "reject" | "error" => Some(Self::Reject),
            "1" | "warn" | "warning" => Some(Self::Warn),
            "2" | "ignore" | "allow" => Some(Self::Ignore),
            _ => None,
        }
    }
}

impl fmt::Display for DeprecateLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DeprecateLevel::Reject => "reject",
            DeprecateLevel::Warn => "warn",
            DeprecateLevel::Ignore => "ignore",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvConfig {
    pub deprecate_level: DeprecateLevel,
    /// Create the intermediate user namespace between the built-ins and
    /// loaded fragments.
    pub load_user_namespace: bool,
}

impl EnvConfig {
    pub const DEFAULT: Self = Self {
        deprecate_level: DeprecateLevel::Warn,
        load_user_namespace: true,
    };

    #[must_use]
    pub fn from_env() -> Self {
        let level = env::var_os("TYPECORE_DEPRECATE_LEVEL")
            .map(|value| value.to_string_lossy().to_string());
        let user = env::var_os("TYPECORE_USER_NAMESPACE")
            .map(|value| value.to_string_lossy().to_string());
        apply_env_overrides(Self::DEFAULT, level.as_deref(), user.as_deref())
    }

    #[must_use]
    pub fn with_deprecate_level(self, deprecate_level: DeprecateLevel) -> Self {
        Self {
            deprecate_level,
            ..self
        }
    }

    #[must_use]
    pub fn with_user_namespace(self, load_user_namespace: bool) -> Self {
        Self {
            load_user_namespace,
            ..self
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn parse_flag(spec: &str) -> Option<bool> {
    match spec.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

fn apply_env_overrides(
    mut config: EnvConfig,
    level: Option<&str>,
    user: Option<&str>,
) -> EnvConfig {
    if let Some(spec) = level.and_then(DeprecateLevel::parse) {
        config.deprecate_level = spec;
    }
    if let Some(flag) = user.and_then(parse_flag) {
        config.load_user_namespace = flag;
    }
    config
}
