//! Bridge configuration: JSON file plus command-line overrides
//!
//! ```json
//! {
//!   "vendor_id": "0x05f3",
//!   "product_id": "0x00ff",
//!   "read_timeout_ms": 5000,
//!   "error_backoff_ms": 100,
//!   "device_name": "VEC Footpedal Keyboard",
//!   "bindings": [
//!     { "mask": 1, "key": "KEY_LEFTALT" },
//!     { "mask": 2, "key": "KEY_LEFTCTRL" },
//!     { "mask": 4, "key": "KEY_LEFTSHIFT" }
//!   ]
//! }
//! ```

use crate::emitter::DEFAULT_DEVICE_NAME;
use crate::{BridgeError, BridgeResult};
use evdev::Key;
use footpedal_protocol::{
    KEY_CODE_LIMIT, KeyBindingMap, KeyCode, PRODUCT_ID_FOOTPEDAL, Pedal, VENDOR_ID_VEC,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_ERROR_BACKOFF_MS: u64 = 100;

/// One pedal-to-key entry. `key` is an evdev name (`KEY_F13`) or a numeric code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingConfig {
    pub mask: u32,
    pub key: String,
}

impl BindingConfig {
    pub fn new(mask: u32, key: impl Into<String>) -> Self {
        Self {
            mask,
            key: key.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(deserialize_with = "deserialize_usb_id")]
    pub vendor_id: u16,
    #[serde(deserialize_with = "deserialize_usb_id")]
    pub product_id: u16,
    /// Bound on each blocking read; also the worst-case shutdown latency.
    pub read_timeout_ms: u64,
    /// Pause after a transport error before the next read.
    pub error_backoff_ms: u64,
    pub device_name: String,
    pub bindings: Vec<BindingConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            vendor_id: VENDOR_ID_VEC,
            product_id: PRODUCT_ID_FOOTPEDAL,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            error_backoff_ms: DEFAULT_ERROR_BACKOFF_MS,
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            bindings: vec![
                BindingConfig::new(Pedal::LEFT.mask(), "KEY_LEFTALT"),
                BindingConfig::new(Pedal::MIDDLE.mask(), "KEY_LEFTCTRL"),
                BindingConfig::new(Pedal::RIGHT.mask(), "KEY_LEFTSHIFT"),
            ],
        }
    }
}

/// Values given on the command line; each one replaces the file's value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub read_timeout_ms: Option<u64>,
    pub device_name: Option<String>,
}

impl BridgeConfig {
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> BridgeResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: BridgeConfig = serde_json::from_str(&content).map_err(|e| {
            BridgeError::Config(format!("failed to parse {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Loads `path` when given, otherwise the built-in defaults.
    pub fn load(path: Option<&Path>) -> BridgeResult<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(vendor_id) = overrides.vendor_id {
            self.vendor_id = vendor_id;
        }
        if let Some(product_id) = overrides.product_id {
            self.product_id = product_id;
        }
        if let Some(timeout) = overrides.read_timeout_ms {
            self.read_timeout_ms = timeout;
        }
        if let Some(name) = overrides.device_name {
            self.device_name = name;
        }
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.read_timeout_ms == 0 {
            return Err(BridgeError::Config(
                "read_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.device_name.trim().is_empty() {
            return Err(BridgeError::Config("device_name must not be empty".to_string()));
        }
        self.key_bindings().map(|_| ())
    }

    /// Resolves the binding table, checking masks and key names.
    pub fn key_bindings(&self) -> BridgeResult<KeyBindingMap> {
        if self.bindings.is_empty() {
            return Err(BridgeError::Config("at least one binding is required".to_string()));
        }

        let mut map = KeyBindingMap::new();
        for binding in &self.bindings {
            let pedal = Pedal::from_mask(binding.mask)
                .map_err(|e| BridgeError::Config(e.to_string()))?;
            let key = parse_key_code(&binding.key)?;
            map.bind(pedal, key)
                .map_err(|e| BridgeError::Config(e.to_string()))?;
        }
        Ok(map)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

/// Accepts an evdev key name (`KEY_LEFTALT`) or a decimal code (`56`).
///
/// Codes at or above [`KEY_CODE_LIMIT`] are rejected; the kernel has no such key.
pub fn parse_key_code(raw: &str) -> BridgeResult<KeyCode> {
    let raw = raw.trim();
    let code = match raw.parse::<KeyCode>() {
        Ok(code) => code,
        Err(_) => Key::from_str(raw)
            .map(|key| key.code())
            .map_err(|e| BridgeError::Config(format!("unknown key name '{raw}' ({e:?})")))?,
    };
    if code >= KEY_CODE_LIMIT {
        return Err(BridgeError::Config(format!(
            "key code {code} is out of range (must be below {KEY_CODE_LIMIT:#x})"
        )));
    }
    Ok(code)
}

/// Parses a VID/PID in hex (`0x05f3`) or decimal (`1523`) form.
pub fn parse_usb_id(raw: &str) -> Result<u16, String> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(digits) => u16::from_str_radix(digits, 16),
        None => raw.parse::<u16>(),
    }
    .map_err(|e| format!("invalid USB id '{raw}': {e}"))
}

fn deserialize_usb_id<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u16),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => parse_usb_id(&text).map_err(serde::de::Error::custom),
    }
}
