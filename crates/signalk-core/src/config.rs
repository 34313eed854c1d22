//! Configuration storage abstraction.
//!
//! Persistence is a small key/value surface:
//! - gateway settings
//! - the anchor composite blob
//! - the approved-token list and the push-token list
//!
//! All methods are synchronous; the store calls them from inside its write
//! lock and they only ever touch small blobs.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

/// Storage key of the gateway settings.
pub const SETTINGS_KEY: &str = "settings";
/// Storage key of the anchor composite blob.
pub const ANCHOR_KEY: &str = "anchor.akat";
/// Storage key of the approved access tokens.
pub const APPROVED_TOKENS_KEY: &str = "tokens.approved";
/// Storage key of the push notification tokens.
pub const PUSH_TOKENS_KEY: &str = "tokens.push";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration not found: {0}")]
    NotFound(String),
    #[error("Read error: {0}")]
    ReadError(String),
    #[error("Write error: {0}")]
    WriteError(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Blob for {key} is {size} bytes, limit is {limit}")]
    TooLarge { key: String, size: usize, limit: usize },
}

/// Abstract configuration storage.
///
/// Implementors provide the raw string primitives; the typed accessors are
/// layered on top with serde.
pub trait ConfigStorage: Send + Sync {
    /// Load the raw stored string for a key.
    fn load_raw(&self, key: &str) -> Result<String, ConfigError>;

    /// Store a raw string under a key.
    fn save_raw(&self, key: &str, value: &str) -> Result<(), ConfigError>;

    /// Check if a key exists.
    fn has_key(&self, key: &str) -> bool;

    /// Delete a key.
    fn delete_key(&self, key: &str) -> Result<(), ConfigError>;

    /// Load gateway settings.
    fn load_settings(&self) -> Result<GatewaySettings, ConfigError> {
        decode(SETTINGS_KEY, &self.load_raw(SETTINGS_KEY)?)
    }

    /// Save gateway settings.
    fn save_settings(&self, settings: &GatewaySettings) -> Result<(), ConfigError> {
        self.save_raw(SETTINGS_KEY, &encode(settings)?)
    }

    /// Load the persisted anchor composite, as its canonical JSON text.
    fn load_anchor_blob(&self) -> Result<String, ConfigError> {
        self.load_raw(ANCHOR_KEY)
    }

    /// Persist the anchor composite.
    fn save_anchor_blob(&self, json: &str) -> Result<(), ConfigError> {
        self.save_raw(ANCHOR_KEY, json)
    }

    fn load_approved_tokens(&self) -> Result<Vec<String>, ConfigError> {
        decode(APPROVED_TOKENS_KEY, &self.load_raw(APPROVED_TOKENS_KEY)?)
    }

    fn save_approved_tokens(&self, tokens: &[String]) -> Result<(), ConfigError> {
        self.save_raw(APPROVED_TOKENS_KEY, &encode(&tokens)?)
    }

    fn load_push_tokens(&self) -> Result<Vec<String>, ConfigError> {
        decode(PUSH_TOKENS_KEY, &self.load_raw(PUSH_TOKENS_KEY)?)
    }

    fn save_push_tokens(&self, tokens: &[String]) -> Result<(), ConfigError> {
        self.save_raw(PUSH_TOKENS_KEY, &encode(&tokens)?)
    }

    /// Load any value by key.
    fn load_value<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError>
    where
        Self: Sized,
    {
        decode(key, &self.load_raw(key)?)
    }

    /// Save any value by key.
    fn save_value<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ConfigError>
    where
        Self: Sized,
    {
        self.save_raw(key, &encode(value)?)
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, ConfigError> {
    serde_json::from_str(raw).map_err(|e| ConfigError::InvalidData(format!("{}: {}", key, e)))
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, ConfigError> {
    serde_json::to_string_pretty(value).map_err(|e| ConfigError::WriteError(e.to_string()))
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Gateway settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Server name, used as the delta source label and hello server id.
    pub server_name: String,

    /// Vessel UUID. Generated on first start when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vessel_uuid: Option<String>,

    /// WebSocket bind address.
    pub ws_bind: String,

    /// HTTP (REST) bind address.
    pub http_bind: String,

    /// NMEA0183 TCP bind address.
    pub nmea_tcp_bind: String,

    /// Maximum concurrent NMEA0183 TCP clients.
    pub nmea_tcp_max_clients: usize,

    /// NMEA0183 TCP idle disconnect, in seconds.
    pub nmea_tcp_idle_timeout_secs: u64,

    /// Delta distribution tick, in milliseconds.
    pub delta_interval_ms: u64,

    /// Heartbeat interval, in seconds.
    pub heartbeat_interval_secs: u64,

    /// NMEA0183 regeneration interval, in milliseconds.
    pub regenerator_interval_ms: u64,

    /// Data inputs.
    pub inputs: Vec<InputConfig>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            server_name: "signalk-rs-gateway".to_string(),
            vessel_uuid: None,
            ws_bind: "0.0.0.0:3000".to_string(),
            http_bind: "0.0.0.0:3001".to_string(),
            nmea_tcp_bind: "0.0.0.0:10110".to_string(),
            nmea_tcp_max_clients: 8,
            nmea_tcp_idle_timeout_secs: 30,
            delta_interval_ms: 100,
            heartbeat_interval_secs: 20,
            regenerator_interval_ms: 1000,
            inputs: Vec::new(),
        }
    }
}

impl GatewaySettings {
    /// Full self URN for a vessel UUID.
    pub fn self_urn(uuid: &str) -> String {
        format!("urn:mrn:signalk:uuid:{}", uuid)
    }
}

/// A configured data input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InputConfig {
    /// A line-oriented NMEA0183 device (serial port opened as a file).
    #[serde(rename_all = "camelCase")]
    Nmea0183Device { path: String, origin: String },

    /// A Seatalk1 byte stream.
    #[serde(rename_all = "camelCase")]
    SeatalkDevice { path: String },

    /// An upstream NMEA0183 TCP server to connect to.
    #[serde(rename_all = "camelCase")]
    Nmea0183Tcp { host: String, port: u16, origin: String },
}

// ============================================================================
// Implementations
// ============================================================================

/// File-based storage: one JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileConfigStorage {
    dir: PathBuf,
}

impl FileConfigStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$SIGNALK_CONFIG_DIR`, else `~/.signalk-gateway`, else `./.signalk-gateway`.
    pub fn default_dir() -> PathBuf {
        if let Some(dir) = std::env::var_os("SIGNALK_CONFIG_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".signalk-gateway")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl ConfigStorage for FileConfigStorage {
    fn load_raw(&self, key: &str) -> Result<String, ConfigError> {
        let path = self.file_for(key);
        std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(key.to_string())
            } else {
                ConfigError::ReadError(format!("{}: {}", path.display(), e))
            }
        })
    }

    fn save_raw(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| ConfigError::WriteError(format!("{}: {}", self.dir.display(), e)))?;
        let path = self.file_for(key);
        std::fs::write(&path, value)
            .map_err(|e| ConfigError::WriteError(format!("{}: {}", path.display(), e)))
    }

    fn has_key(&self, key: &str) -> bool {
        self.file_for(key).exists()
    }

    fn delete_key(&self, key: &str) -> Result<(), ConfigError> {
        match std::fs::remove_file(self.file_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConfigError::WriteError(e.to_string())),
        }
    }
}

/// In-memory storage, for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryConfigStorage {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryConfigStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStorage for MemoryConfigStorage {
    fn load_raw(&self, key: &str) -> Result<String, ConfigError> {
        let data = self
            .data
            .read()
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;
        data.get(key)
            .cloned()
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))
    }

    fn save_raw(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.data
            .write()
            .map_err(|e| ConfigError::WriteError(e.to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn has_key(&self, key: &str) -> bool {
        self.data
            .read()
            .map(|data| data.contains_key(key))
            .unwrap_or(false)
    }

    fn delete_key(&self, key: &str) -> Result<(), ConfigError> {
        self.data
            .write()
            .map_err(|e| ConfigError::WriteError(e.to_string()))?
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_round_trip() {
        let storage = MemoryConfigStorage::new();

        let settings = GatewaySettings {
            vessel_uuid: Some("c0d79334-4e25-4245-8892-54e8ccc8021d".to_string()),
            nmea_tcp_max_clients: 4,
            inputs: vec![InputConfig::Nmea0183Tcp {
                host: "192.168.1.10".to_string(),
                port: 10110,
                origin: "tcp".to_string(),
            }],
            ..Default::default()
        };

        storage.save_settings(&settings).unwrap();
        let loaded = storage.load_settings().unwrap();

        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_settings_defaults_fill_missing_fields() {
        let storage = MemoryConfigStorage::new();
        storage
            .save_raw(SETTINGS_KEY, r#"{"serverName": "boat"}"#)
            .unwrap();

        let loaded = storage.load_settings().unwrap();
        assert_eq!(loaded.server_name, "boat");
        assert_eq!(loaded.ws_bind, "0.0.0.0:3000");
        assert_eq!(loaded.nmea_tcp_idle_timeout_secs, 30);
    }

    #[test]
    fn test_input_config_tagging() {
        let json = r#"{"type": "nmea0183Device", "path": "/dev/ttyUSB0", "origin": "rs485"}"#;
        let input: InputConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            input,
            InputConfig::Nmea0183Device {
                path: "/dev/ttyUSB0".to_string(),
                origin: "rs485".to_string(),
            }
        );
    }

    #[test]
    fn test_token_lists() {
        let storage = MemoryConfigStorage::new();
        assert!(matches!(
            storage.load_push_tokens(),
            Err(ConfigError::NotFound(_))
        ));

        storage
            .save_push_tokens(&["ExponentPushToken[abc]".to_string()])
            .unwrap();
        storage
            .save_approved_tokens(&["token-1".to_string(), "token-2".to_string()])
            .unwrap();

        assert_eq!(storage.load_push_tokens().unwrap().len(), 1);
        assert_eq!(storage.load_approved_tokens().unwrap()[1], "token-2");
    }

    #[test]
    fn test_generic_values_and_delete() {
        let storage = MemoryConfigStorage::new();
        storage.save_value("custom", &vec![1u8, 2, 3]).unwrap();
        assert!(storage.has_key("custom"));

        let loaded: Vec<u8> = storage.load_value("custom").unwrap();
        assert_eq!(loaded, vec![1, 2, 3]);

        storage.delete_key("custom").unwrap();
        assert!(!storage.has_key("custom"));
    }

    #[test]
    fn test_file_storage_round_trip() {
        let dir = std::env::temp_dir().join(format!("signalk-gateway-test-{}", std::process::id()));
        let storage = FileConfigStorage::new(&dir);

        assert!(matches!(
            storage.load_anchor_blob(),
            Err(ConfigError::NotFound(_))
        ));

        storage.save_anchor_blob(r#"{"anchor":{"enabled":true}}"#).unwrap();
        assert!(storage.has_key(ANCHOR_KEY));
        assert_eq!(
            storage.load_anchor_blob().unwrap(),
            r#"{"anchor":{"enabled":true}}"#
        );

        storage.delete_key(ANCHOR_KEY).unwrap();
        assert!(!storage.has_key(ANCHOR_KEY));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
