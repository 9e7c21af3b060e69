//! # Client Configuration Module
//!
//! Provides configuration management for the playback client.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! [`ClientConfig`]. Settings can be layered: defaults, then an optional TOML
//! file, then explicit builder calls (the command line). Validation is
//! fail-fast and every error message says which setting to fix.
//!
//! ## Device Identity
//!
//! The device identifier (the ANF) addresses this device's room on the
//! control server. When it is not set directly it is read from a JSON
//! identity file (`/boot/pharmacy.json` by default):
//!
//! ```json
//! { "ANF": "01234" }
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{ClientConfig, FileConfig};
//!
//! let file = FileConfig::load("/etc/piradio.toml")?;
//! let config = ClientConfig::builder()
//!     .with_file_config(file)
//!     .device_id("01234")
//!     .build()?;
//! ```
//!
//! ## File Format
//!
//! ```toml
//! device_id = "01234"
//!
//! [remote]
//! server_url = "https://control.example.org"
//! socket_path = "/piradio"
//! reconnect_interval_secs = 5
//!
//! [cache]
//! root = "/var/cache/piradio"
//! budget_bytes = 5000000000
//! retention = "calendar_month"
//!
//! [player]
//! backend = "file"
//! watchdog_interval_secs = 15
//! ```

use crate::error::{Error, Result};
use bridge_traits::playback::BackendKind;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "https://servicos.maisfarmacia.org";
pub const DEFAULT_SOCKET_PATH: &str = "/piradio";
pub const DEFAULT_IDENTITY_PATH: &str = "/boot/pharmacy.json";
pub const DEFAULT_CACHE_BUDGET_BYTES: u64 = 5_000_000_000;

/// Fully resolved client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Device identifier (ANF)
    pub device_id: String,

    /// Connection to the control server
    pub remote: RemoteSettings,

    /// Offline cache
    pub cache: CacheSettings,

    /// Player backend selection and timers
    pub player: PlayerSettings,

    /// Output gain rule
    pub mixer: MixerSettings,
}

impl ClientConfig {
    /// Start building a configuration from defaults.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        if self.device_id.trim().is_empty() {
            return Err(Error::Config(
                "device_id cannot be empty. Set it explicitly or provide an identity \
                 file with an ANF field"
                    .to_string(),
            ));
        }
        self.remote.validate()?;
        self.cache.validate()?;
        self.player.validate()?;
        self.mixer.validate()?;
        Ok(())
    }
}

/// Control server connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteSettings {
    /// Base URL of the control server (http, https, ws or wss)
    pub server_url: String,

    /// Path the Socket.IO endpoint is mounted on
    pub socket_path: String,

    /// Delay between reconnect attempts while disconnected (default: 5s)
    #[serde(rename = "reconnect_interval_secs", with = "duration_secs")]
    pub reconnect_interval: Duration,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            reconnect_interval: Duration::from_secs(5),
        }
    }
}

impl RemoteSettings {
    fn validate(&self) -> Result<()> {
        let scheme_ok = ["http://", "https://", "ws://", "wss://"]
            .iter()
            .any(|scheme| self.server_url.starts_with(scheme));
        if !scheme_ok {
            return Err(Error::Config(format!(
                "remote.server_url '{}' must start with http://, https://, ws:// or wss://",
                self.server_url
            )));
        }
        if !self.socket_path.starts_with('/') {
            return Err(Error::Config(format!(
                "remote.socket_path '{}' must start with '/'",
                self.socket_path
            )));
        }
        if self.reconnect_interval.is_zero() {
            return Err(Error::Config(
                "remote.reconnect_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// How old a cached file may get before the startup sweep removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionSetting {
    /// Remove files born in an earlier calendar month than the current one.
    CalendarMonth,
    /// Remove files older than this many days.
    MaxAgeDays(u32),
}

/// Offline cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    /// Cache root directory
    pub root: PathBuf,

    /// No new download starts once the cache holds this many bytes (default: 5GB)
    pub budget_bytes: u64,

    /// Clear the whole cache at startup when it holds more than this
    pub hard_ceiling_bytes: Option<u64>,

    /// Index of the URL path segment used as the group directory
    pub group_segment: usize,

    /// Retention rule applied by the startup sweep
    pub retention: RetentionSetting,

    /// Redirects followed per download (default: 1)
    pub max_redirects: usize,

    /// Upper bound for a single download (default: 600s)
    #[serde(rename = "download_timeout_secs", with = "duration_secs")]
    pub download_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("../cache"),
            budget_bytes: DEFAULT_CACHE_BUDGET_BYTES,
            hard_ceiling_bytes: None,
            group_segment: 1,
            retention: RetentionSetting::CalendarMonth,
            max_redirects: 1,
            download_timeout: Duration::from_secs(600),
        }
    }
}

impl CacheSettings {
    fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(Error::Config("cache.root cannot be empty".to_string()));
        }
        if self.budget_bytes == 0 {
            return Err(Error::Config(
                "cache.budget_bytes must be greater than 0".to_string(),
            ));
        }
        if let Some(ceiling) = self.hard_ceiling_bytes {
            if ceiling < self.budget_bytes {
                return Err(Error::Config(format!(
                    "cache.hard_ceiling_bytes ({ceiling}) must not be below cache.budget_bytes ({})",
                    self.budget_bytes
                )));
            }
        }
        if let RetentionSetting::MaxAgeDays(0) = self.retention {
            return Err(Error::Config(
                "cache.retention max_age_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Player backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlayerSettings {
    /// `queue` (mpg123) or `file` (mpv with a scratch playlist)
    pub backend: BackendKind,

    /// Player executable; defaults to `mpg123` or `mpv` on PATH
    pub binary: Option<PathBuf>,

    /// Scratch playlist written before each load by the file-backed player
    pub scratch_playlist: PathBuf,

    /// IPC socket used to talk to the file-backed player
    pub ipc_socket: PathBuf,

    /// Re-issue load+play this often until playback starts (default: 15s)
    #[serde(rename = "watchdog_interval_secs", with = "duration_secs")]
    pub watchdog_interval: Duration,

    /// Pause-to-advance delay when skipping (default: 2000ms)
    #[serde(rename = "advance_grace_ms", with = "duration_millis")]
    pub advance_grace: Duration,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Queue,
            binary: None,
            scratch_playlist: PathBuf::from("/tmp/piradio-playlist.txt"),
            ipc_socket: PathBuf::from("/tmp/piradio-mpv.sock"),
            watchdog_interval: Duration::from_secs(15),
            advance_grace: Duration::from_millis(2000),
        }
    }
}

impl PlayerSettings {
    /// Executable to launch for the configured backend.
    pub fn resolved_binary(&self) -> PathBuf {
        self.binary.clone().unwrap_or_else(|| match self.backend {
            BackendKind::Queue => PathBuf::from("mpg123"),
            BackendKind::File => PathBuf::from("mpv"),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.watchdog_interval.is_zero() {
            return Err(Error::Config(
                "player.watchdog_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.backend == BackendKind::File && self.scratch_playlist.as_os_str().is_empty() {
            return Err(Error::Config(
                "player.scratch_playlist is required for the file backend".to_string(),
            ));
        }
        Ok(())
    }
}

/// Output gain rule applied whenever a track starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MixerSettings {
    /// Mixer executable
    pub program: String,

    /// Fixed device/selector arguments placed before the decibel delta
    pub args: Vec<String>,

    /// Track names containing this are sponsor spots
    pub spot_marker: String,

    /// Gain change for sponsor spots
    pub spot_delta_db: i32,

    /// Gain change for every other track
    pub normal_delta_db: i32,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            program: "amixer".to_string(),
            args: ["-c", "0", "--", "sset", "PCM", "playback"]
                .iter()
                .map(|arg| arg.to_string())
                .collect(),
            spot_marker: "Spot".to_string(),
            spot_delta_db: -1,
            normal_delta_db: -3,
        }
    }
}

impl MixerSettings {
    fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(Error::Config("mixer.program cannot be empty".to_string()));
        }
        if self.spot_marker.is_empty() {
            return Err(Error::Config(
                "mixer.spot_marker cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Contents of the optional TOML configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub device_id: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub remote: RemoteSettings,
    pub cache: CacheSettings,
    pub player: PlayerSettings,
    pub mixer: MixerSettings,
}

impl FileConfig {
    /// Parse TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("Invalid config file: {e}")))
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

/// Device identity file contents.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceIdentity {
    #[serde(rename = "ANF", deserialize_with = "string_or_number")]
    pub anf: String,
}

impl DeviceIdentity {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let identity: DeviceIdentity =
            serde_json::from_str(text).map_err(|e| Error::Identity(e.to_string()))?;
        if identity.anf.trim().is_empty() {
            return Err(Error::Identity("ANF is empty".to_string()));
        }
        Ok(identity)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, found {other}"
        ))),
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    device_id: Option<String>,
    identity_file: Option<PathBuf>,
    remote: RemoteSettings,
    cache: CacheSettings,
    player: PlayerSettings,
    mixer: MixerSettings,
}

impl ClientConfigBuilder {
    /// Take every section from a parsed config file. Later builder calls win.
    pub fn with_file_config(mut self, file: FileConfig) -> Self {
        if file.device_id.is_some() {
            self.device_id = file.device_id;
        }
        if file.identity_file.is_some() {
            self.identity_file = file.identity_file;
        }
        self.remote = file.remote;
        self.cache = file.cache;
        self.player = file.player;
        self.mixer = file.mixer;
        self
    }

    pub fn device_id(mut self, id: impl Into<String>) -> Self {
        self.device_id = Some(id.into());
        self
    }

    /// JSON file the device identifier is read from when not set directly.
    pub fn identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.remote.server_url = url.into();
        self
    }

    pub fn socket_path(mut self, path: impl Into<String>) -> Self {
        self.remote.socket_path = path.into();
        self
    }

    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.remote.reconnect_interval = interval;
        self
    }

    pub fn cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache.root = root.into();
        self
    }

    pub fn cache_budget_bytes(mut self, bytes: u64) -> Self {
        self.cache.budget_bytes = bytes;
        self
    }

    pub fn cache_hard_ceiling_bytes(mut self, bytes: Option<u64>) -> Self {
        self.cache.hard_ceiling_bytes = bytes;
        self
    }

    pub fn retention(mut self, retention: RetentionSetting) -> Self {
        self.cache.retention = retention;
        self
    }

    pub fn player_backend(mut self, backend: BackendKind) -> Self {
        self.player.backend = backend;
        self
    }

    pub fn player_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.player.binary = Some(binary.into());
        self
    }

    pub fn watchdog_interval(mut self, interval: Duration) -> Self {
        self.player.watchdog_interval = interval;
        self
    }

    pub fn advance_grace(mut self, grace: Duration) -> Self {
        self.player.advance_grace = grace;
        self
    }

    pub fn mixer(mut self, mixer: MixerSettings) -> Self {
        self.mixer = mixer;
        self
    }

    /// Resolve the device identity and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if no device identifier can be found or any setting
    /// is out of range.
    pub fn build(self) -> Result<ClientConfig> {
        let device_id = match self.device_id {
            Some(id) => id,
            None => {
                let path = self
                    .identity_file
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_IDENTITY_PATH));
                DeviceIdentity::load(&path)
                    .map_err(|e| {
                        Error::Config(format!(
                            "No device_id configured and the identity file could not be used ({e}). \
                             Pass --device-id, set device_id in the config file, or point \
                             --identity at a JSON file with an ANF field"
                        ))
                    })?
                    .anf
            }
        };

        let config = ClientConfig {
            device_id,
            remote: self.remote,
            cache: self.cache,
            player: self.player,
            mixer: self.mixer,
        };
        config.validate()?;
        Ok(config)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
