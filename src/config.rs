//! # Configuration Management
//!
//! Connection settings for InSim hosts, the relay gateway and telemetry
//! listeners, plus engine tuning and logging.
//!
//! ## Configuration Sources
//! - TOML files via [`ProtocolConfig::from_file`]
//! - `INSIM_*` environment variables via [`ProtocolConfig::from_env`]
//! - Direct instantiation with defaults
//!
//! Durations are written as integer milliseconds.

use crate::core::constants::{
    DEFAULT_INSIM_PORT, DEFAULT_TELEMETRY_PORT, RELAY_HOST, RELAY_PORT,
};
use crate::core::wire::FixedStr;
use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProtocolConfig {
    #[serde(default)]
    pub insim: InSimConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ProtocolConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by `INSIM_*` variables. Unparsable values are ignored.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("INSIM_HOST") {
            config.insim.host = host;
        }

        if let Ok(port) = std::env::var("INSIM_PORT") {
            if let Ok(val) = port.parse::<u16>() {
                config.insim.port = val;
            }
        }

        if let Ok(admin) = std::env::var("INSIM_ADMIN") {
            config.insim.admin = admin;
        }

        if let Ok(port) = std::env::var("INSIM_UDP_PORT") {
            if let Ok(val) = port.parse::<u16>() {
                config.insim.udp_port = val;
            }
        }

        if let Ok(hname) = std::env::var("INSIM_RELAY_HOST_NAME") {
            config.relay.hname = Some(hname);
        }

        if let Ok(interval) = std::env::var("INSIM_POLL_INTERVAL_MS") {
            if let Ok(val) = interval.parse::<u64>() {
                config.engine.poll_interval = Duration::from_millis(val);
            }
        }

        if let Ok(interval) = std::env::var("INSIM_TELEMETRY_TIMEOUT_MS") {
            if let Ok(val) = interval.parse::<u64>() {
                config.telemetry.timeout = Duration::from_millis(val);
            }
        }

        Ok(config)
    }

    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Every problem found; empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.insim.validate());
        errors.extend(self.relay.validate());
        errors.extend(self.telemetry.validate());
        errors.extend(self.engine.validate());
        errors.extend(self.logging.validate());
        errors
    }

    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn check_host(section: &str, host: &str, port: u16, errors: &mut Vec<String>) {
    if host.is_empty() {
        errors.push(format!("{section} host cannot be empty"));
    }
    if port == 0 {
        errors.push(format!("{section} port cannot be 0"));
    }
}

fn check_fits<const N: usize>(section: &str, field: &str, value: &str, errors: &mut Vec<String>) {
    if value.len() > FixedStr::<N>::CAPACITY {
        errors.push(format!(
            "{section} {field} too long: {} bytes (maximum: {})",
            value.len(),
            FixedStr::<N>::CAPACITY
        ));
    }
}

/// Settings for a direct InSim connection. Fields after `port` go into
/// the ISI handshake.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InSimConfig {
    pub host: String,
    pub port: u16,

    /// Diagnostic name of the connection.
    pub name: String,

    pub req_i: u8,

    /// Port the host sends UDP packets to. 0 means no UDP channel.
    pub udp_port: u16,

    /// Address the UDP channel binds on.
    pub udp_bind: String,

    /// ISF_* option bits.
    pub flags: u16,

    /// Host command prefix character.
    pub prefix: Option<char>,

    /// MCI/NLP interval in ms, 0 for none.
    pub interval: u16,

    pub admin: String,

    /// Program name shown to the host.
    pub iname: String,
}

impl Default for InSimConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: DEFAULT_INSIM_PORT,
            name: String::from("insim"),
            req_i: 0,
            udp_port: 0,
            udp_bind: String::from("0.0.0.0"),
            flags: 0,
            prefix: None,
            interval: 0,
            admin: String::new(),
            iname: String::from("insim-protocol"),
        }
    }
}

impl InSimConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        check_host("InSim", &self.host, self.port, &mut errors);
        check_fits::<16>("InSim", "admin password", &self.admin, &mut errors);
        check_fits::<16>("InSim", "program name", &self.iname, &mut errors);

        if let Some(prefix) = self.prefix {
            if !prefix.is_ascii() {
                errors.push(format!("InSim prefix must be an ASCII character, got '{prefix}'"));
            }
        }

        if self.udp_port != 0 && self.udp_bind.parse::<std::net::IpAddr>().is_err() {
            errors.push(format!(
                "Invalid UDP bind address: '{}' (expected an IP such as '0.0.0.0')",
                self.udp_bind
            ));
        }

        errors
    }
}

/// Settings for the relay gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub req_i: u8,

    /// Host to select once connected.
    pub hname: Option<String>,

    pub admin: String,

    /// Spectator password of the selected host.
    pub spec: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: String::from(RELAY_HOST),
            port: RELAY_PORT,
            name: String::from("relay"),
            req_i: 0,
            hname: None,
            admin: String::new(),
            spec: String::new(),
        }
    }
}

impl RelayConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        check_host("Relay", &self.host, self.port, &mut errors);
        if let Some(hname) = &self.hname {
            if hname.is_empty() {
                errors.push("Relay host name cannot be empty when set".to_string());
            }
            check_fits::<32>("Relay", "host name", hname, &mut errors);
        }
        check_fits::<16>("Relay", "admin password", &self.admin, &mut errors);
        check_fits::<16>("Relay", "spectator password", &self.spec, &mut errors);
        errors
    }
}

/// Settings for an OutSim or OutGauge listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Address to bind.
    pub host: String,
    pub port: u16,
    pub name: String,

    /// Idle time before the listener gives up. Zero waits forever.
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: DEFAULT_TELEMETRY_PORT,
            name: String::from("telemetry"),
            timeout: timeout::TELEMETRY_TIMEOUT,
        }
    }
}

impl TelemetryConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.host.is_empty() {
            errors.push("Telemetry host cannot be empty".to_string());
        }
        if !self.timeout.is_zero() && self.timeout.as_millis() < 100 {
            errors.push("Telemetry timeout too short (minimum: 100ms, or 0 to disable)".to_string());
        }
        errors
    }
}

/// I/O loop tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Longest a tick waits for readiness.
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,

    /// Cap on unsent TCP bytes per connection.
    pub max_outbound_bytes: usize,

    /// Read buffer growth step for TCP.
    pub tcp_read_size: usize,

    /// Receive buffer for one UDP datagram.
    pub udp_buffer_size: usize,

    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: timeout::POLL_INTERVAL,
            max_outbound_bytes: 64 * 1024,
            tcp_read_size: 2048,
            udp_buffer_size: 512,
            connect_timeout: timeout::CONNECT_TIMEOUT,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.poll_interval.is_zero() {
            errors.push("Poll interval cannot be 0".to_string());
        } else if self.poll_interval.as_secs() > 1 {
            errors.push("Poll interval too long (maximum: 1s)".to_string());
        }

        if self.max_outbound_bytes < 252 {
            errors.push(format!(
                "Outbound queue cap too small: {} bytes (minimum: one packet, 252)",
                self.max_outbound_bytes
            ));
        }

        if self.tcp_read_size == 0 {
            errors.push("TCP read size cannot be 0".to_string());
        }

        if self.udp_buffer_size < 96 {
            errors.push(format!(
                "UDP buffer too small: {} bytes (minimum: 96, one OutGauge datagram)",
                self.udp_buffer_size
            ));
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        }

        errors
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub app_name: String,

    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    pub log_to_console: bool,

    pub log_to_file: bool,

    /// Required when `log_to_file` is set.
    pub log_file_path: Option<String>,

    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("insim-protocol"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        level.as_str().to_lowercase().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
