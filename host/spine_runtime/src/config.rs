use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_OUTBOUND_QUEUE_CAP: usize = 256;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;
pub const DEFAULT_FRAME_MS: u64 = 16;
pub const DEFAULT_LOCATION: &str = "/";

pub const ADDR_VAR: &str = "SPINE_HOST_ADDR";
pub const OUTBOUND_QUEUE_CAP_VAR: &str = "SPINE_HOST_OUTBOUND_QUEUE_CAP";
pub const RECONNECT_VAR: &str = "SPINE_HOST_RECONNECT";
pub const RECONNECT_DELAY_VAR: &str = "SPINE_HOST_RECONNECT_DELAY_MS";
pub const FRAME_MS_VAR: &str = "SPINE_HOST_FRAME_MS";
pub const LOCATION_VAR: &str = "SPINE_HOST_LOCATION";
pub const SNAPSHOT_VAR: &str = "SPINE_HOST_SNAPSHOT";
pub const LOG_VAR: &str = "SPINE_HOST_LOG";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown reconnect policy '{0}' (expected always, on-close or never)")]
    UnknownReconnectPolicy(String),
    #[error("SPINE_HOST_ADDR must be host:port, got '{0}'")]
    InvalidAddress(String),
}

/// What to do after the connection goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    Always,
    #[default]
    OnClose,
    Never,
}

impl ReconnectPolicy {
    /// `failed` distinguishes a transport error from an orderly close.
    pub fn should_reconnect(self, failed: bool) -> bool {
        match self {
            Self::Always => true,
            Self::OnClose => !failed,
            Self::Never => false,
        }
    }
}

impl FromStr for ReconnectPolicy {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "on-close" | "on_close" => Ok(Self::OnClose),
            "never" => Ok(Self::Never),
            _ => Err(ConfigError::UnknownReconnectPolicy(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Frames on stdin/stdout. A single connection for the process lifetime.
    Stdio,
    Tcp(String),
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub endpoint: Endpoint,
    pub outbound_queue_cap: usize,
    pub reconnect: ReconnectPolicy,
    pub reconnect_delay: Duration,
    pub frame_interval: Duration,
    pub initial_location: String,
    pub snapshot: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Stdio,
            outbound_queue_cap: DEFAULT_OUTBOUND_QUEUE_CAP,
            reconnect: ReconnectPolicy::Never,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            frame_interval: Duration::from_millis(DEFAULT_FRAME_MS),
            initial_location: DEFAULT_LOCATION.to_string(),
            snapshot: None,
        }
    }
}

impl HostConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Numeric values that are
    /// missing, unparsable or zero fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let endpoint = match lookup(ADDR_VAR).filter(|raw| !raw.trim().is_empty()) {
            None => Endpoint::Stdio,
            Some(raw) => Endpoint::Tcp(parse_address(&raw)?),
        };

        let requested = lookup(RECONNECT_VAR)
            .map(|raw| raw.parse::<ReconnectPolicy>())
            .transpose()?;
        // stdio cannot be reopened.
        let reconnect = match endpoint {
            Endpoint::Stdio => ReconnectPolicy::Never,
            Endpoint::Tcp(_) => requested.unwrap_or_default(),
        };

        Ok(Self {
            endpoint,
            outbound_queue_cap: parse_positive(lookup(OUTBOUND_QUEUE_CAP_VAR))
                .unwrap_or(DEFAULT_OUTBOUND_QUEUE_CAP),
            reconnect,
            reconnect_delay: Duration::from_millis(
                parse_positive(lookup(RECONNECT_DELAY_VAR)).unwrap_or(DEFAULT_RECONNECT_DELAY_MS),
            ),
            frame_interval: Duration::from_millis(
                parse_positive(lookup(FRAME_MS_VAR)).unwrap_or(DEFAULT_FRAME_MS),
            ),
            initial_location: lookup(LOCATION_VAR)
                .filter(|raw| raw.starts_with('/'))
                .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            snapshot: lookup(SNAPSHOT_VAR)
                .filter(|raw| !raw.is_empty())
                .map(PathBuf::from),
        })
    }
}

fn parse_positive<T>(raw: Option<String>) -> Option<T>
where
    T: FromStr + PartialEq + Default,
{
    raw.and_then(|raw| raw.trim().parse::<T>().ok())
        .filter(|value| *value != T::default())
}

fn parse_address(raw: &str) -> Result<String, ConfigError> {
    let raw = raw.trim();
    match raw.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Ok(raw.to_string())
        }
        _ => Err(ConfigError::InvalidAddress(raw.to_string())),
    }
}
