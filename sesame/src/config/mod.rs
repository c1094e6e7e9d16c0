// sesame-os3/sesame/src/config/mod.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Configuration loading.
//!
//! The client reads `<base dir>/config/sesame.toml`, creating it from an
//! embedded template on first run. The base directory is resolved in this
//! order:
//! 1. `$SESAME_HOME`,
//! 2. the parent of `bin/` when the executable lives in a `bin` directory,
//! 3. the executable's directory when it contains a `config` subdirectory,
//! 4. `~/.sesameos3`.
//!
//! An explicit `--config` path ending in `.json` is read in the legacy
//! `{ "sesame_addr": ..., "sesame_key": ... }` format.
//!
//! Loading happens before logging is initialized, so non-fatal findings are
//! returned as [`ConfigLoadWarning`]s for the caller to log afterwards.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use sesame_proto::DeviceKey;

use crate::client::ClientOptions;
use crate::error::{Result as SesameResult, SesameError};
use crate::log::TracingConfig;
use crate::transport::BleOptions;

pub const CONFIG_FILE_NAME: &str = "sesame.toml";
const BASE_DIR_ENV: &str = "SESAME_HOME";
const TEMPLATE_CONFIG_CONTENT: &str = include_str!("template_config.toml");

/// Non-critical findings collected while loading the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLoadWarning {
    /// The config file did not exist and was created from the template.
    CreatedFile { path: PathBuf },

    /// The file uses the legacy JSON layout.
    LegacyFormat { path: PathBuf },
}

impl fmt::Display for ConfigLoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigLoadWarning::CreatedFile { path } => {
                write!(f, "Created default config at {:?}", path)
            }
            ConfigLoadWarning::LegacyFormat { path } => {
                write!(f, "Loaded legacy JSON config {:?}; consider moving to {}", path, CONFIG_FILE_NAME)
            }
        }
    }
}

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    pub address: String,
    /// Base64 device secret.
    pub key: String,
}

impl fmt::Debug for DeviceSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSection")
            .field("address", &self.address)
            .field("key", &if self.key.is_empty() { "" } else { "<redacted>" })
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BleSection {
    pub scan_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for BleSection {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 10,
            connect_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub command_timeout_secs: u64,
    pub display_name: String,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            command_timeout_secs: 5,
            display_name: "sesame-cli".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    device: DeviceSection,
    ble: BleSection,
    client: ClientSection,
    log: TracingConfig,
}

#[derive(Debug, Deserialize)]
struct LegacyConfig {
    sesame_addr: String,
    sesame_key: String,
}

#[derive(Debug, Clone)]
pub struct SesameConfig {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub log_dir: PathBuf,
    pub device: DeviceSection,
    pub ble: BleSection,
    pub client: ClientSection,
    pub log: TracingConfig,
}

impl SesameConfig {
    fn from_file(base_dir: PathBuf, config_path: PathBuf, file: ConfigFile) -> Self {
        let log_dir = match &file.log.dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => base_dir.join(dir),
            None => base_dir.join("log"),
        };
        Self {
            base_dir,
            config_path,
            log_dir,
            device: file.device,
            ble: file.ble,
            client: file.client,
            log: file.log,
        }
    }

    /// Replaces device settings with values given on the command line.
    pub fn apply_overrides(&mut self, address: Option<String>, key: Option<String>) {
        if let Some(address) = address {
            self.device.address = address;
        }
        if let Some(key) = key {
            self.device.key = key;
        }
    }

    /// Checks that everything needed to talk to a lock is present.
    pub fn validate(&self) -> SesameResult<()> {
        if self.device.address.trim().is_empty() {
            return Err(SesameError::Config(format!(
                "device.address is not set (edit {:?} or pass --address)",
                self.config_path
            )));
        }
        if self.device.key.trim().is_empty() {
            return Err(SesameError::Config(format!(
                "device.key is not set (edit {:?} or pass --key)",
                self.config_path
            )));
        }
        self.device_key()?;
        if self.client.command_timeout_secs == 0 {
            return Err(SesameError::Config(
                "client.command_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn device_key(&self) -> SesameResult<DeviceKey> {
        let raw = STANDARD.decode(self.device.key.trim())?;
        DeviceKey::from_slice(&raw)
            .map_err(|e| SesameError::Config(format!("device.key: {}", e)))
    }

    pub fn ble_options(&self) -> BleOptions {
        BleOptions {
            scan_timeout: Duration::from_secs(self.ble.scan_timeout_secs),
            connect_timeout: Duration::from_secs(self.ble.connect_timeout_secs),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            command_timeout: Duration::from_secs(self.client.command_timeout_secs),
        }
    }
}

/// Determines the base directory for the client.
pub fn find_base_dir() -> SesameResult<PathBuf> {
    if let Some(home) = env::var_os(BASE_DIR_ENV) {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }

    if let Ok(current_exe) = env::current_exe() {
        if let Some(parent) = current_exe.parent() {
            if parent.file_name() == Some(std::ffi::OsStr::new("bin")) {
                if let Some(root) = parent.parent() {
                    return Ok(root.to_path_buf());
                }
            }
            if parent.join("config").is_dir() {
                return Ok(parent.to_path_buf());
            }
        }
    }

    dirs::home_dir()
        .map(|d| d.join(".sesameos3"))
        .ok_or_else(|| SesameError::Internal("Cannot determine home directory".into()))
}

/// Creates `config_dir/sesame.toml` from the template when it is missing.
async fn ensure_config_file(config_dir: &Path) -> SesameResult<(PathBuf, Vec<ConfigLoadWarning>)> {
    let config_path = config_dir.join(CONFIG_FILE_NAME);
    let mut warnings = vec![];

    fs::create_dir_all(config_dir)
        .await
        .map_err(|e| SesameError::io_with_path(config_dir.to_path_buf(), e))?;

    if !config_path.exists() {
        fs::write(&config_path, TEMPLATE_CONFIG_CONTENT)
            .await
            .map_err(|e| SesameError::io_with_path(config_path.clone(), e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // holds the device key
            fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| SesameError::io_with_path(config_path.clone(), e))?;
        }
        warnings.push(ConfigLoadWarning::CreatedFile { path: config_path.clone() });
    }

    Ok((config_path, warnings))
}

fn parse_toml(contents: &str) -> SesameResult<ConfigFile> {
    Ok(toml::from_str(contents)?)
}

fn parse_legacy_json(contents: &str) -> SesameResult<ConfigFile> {
    let legacy: LegacyConfig = serde_json::from_str(contents)?;
    Ok(ConfigFile {
        device: DeviceSection {
            address: legacy.sesame_addr,
            key: legacy.sesame_key,
        },
        ..ConfigFile::default()
    })
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
}

/// Loads the configuration, from `explicit` when given.
pub async fn load(explicit: Option<&Path>) -> SesameResult<(SesameConfig, Vec<ConfigLoadWarning>)> {
    let base_dir = find_base_dir()?;
    load_from(base_dir, explicit).await
}

pub(crate) async fn load_from(
    base_dir: PathBuf,
    explicit: Option<&Path>,
) -> SesameResult<(SesameConfig, Vec<ConfigLoadWarning>)> {
    let (config_path, mut warnings) = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(SesameError::Config(format!("config file {:?} not found", path)));
            }
            (path.to_path_buf(), vec![])
        }
        None => ensure_config_file(&base_dir.join("config")).await?,
    };

    let contents = fs::read_to_string(&config_path)
        .await
        .map_err(|e| SesameError::io_with_path(config_path.clone(), e))?;

    let file = if is_json(&config_path) {
        warnings.push(ConfigLoadWarning::LegacyFormat { path: config_path.clone() });
        parse_legacy_json(&contents)?
    } else {
        parse_toml(&contents)?
    };

    Ok((SesameConfig::from_file(base_dir, config_path, file), warnings))
}
