//! Configuration file support for tibuild.
//!
//! This module provides support for `tibuild.toml` configuration files that
//! hold per-project build settings.
//!
//! ## Configuration File Location
//!
//! The configuration file is searched for in the following order:
//! 1. The project directory (`./tibuild.toml`)
//! 2. Parent directories (up to the repository root or filesystem root)
//!
//! `--config <path>` skips the search.
//!
//! ## Example Configuration
//!
//! ```toml
//! [build]
//! executable = "titanium"
//! log_level = "debug"
//! output_dir = "dist"
//! ios_version = "17.2"
//!
//! [ios]
//! default_keychain = "/Users/me/Library/Keychains/login.keychain-db"
//! provisioning_dir = "/Users/me/Library/MobileDevice/Provisioning Profiles"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tibuild_sdk::Settings;

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "tibuild.toml";

/// Root configuration structure for `tibuild.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TibuildConfig {
    /// Build tool invocation settings.
    pub build: BuildConfig,

    /// iOS signing settings.
    pub ios: IosConfig,
}

/// Build tool invocation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Build tool executable.
    ///
    /// Defaults to "titanium".
    pub executable: String,

    /// Value passed to `--log-level` for builds.
    ///
    /// Defaults to "debug".
    pub log_level: String,

    /// Output directory for packaged builds, relative to the project.
    ///
    /// Defaults to "dist".
    pub output_dir: String,

    /// iOS SDK version passed as `--ios-version`.
    pub ios_version: Option<String>,

    /// stderr prefixes treated as informational.
    ///
    /// Defaults to ["NOTICE:"].
    pub informational: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            executable: settings.executable,
            log_level: settings.log_level,
            output_dir: settings.output_dir,
            ios_version: settings.ios_version,
            informational: settings.informational,
        }
    }
}

/// iOS signing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IosConfig {
    /// Keychain used without prompting when the build tool reports it.
    pub default_keychain: Option<String>,

    /// Where provisioning profiles are installed.
    ///
    /// Defaults to `~/Library/MobileDevice/Provisioning Profiles`.
    pub provisioning_dir: Option<PathBuf>,
}

impl TibuildConfig {
    /// Loads configuration from the specified file path.
    ///
    /// # Returns
    ///
    /// * `Ok(TibuildConfig)` - Successfully loaded configuration
    /// * `Err` - If the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: TibuildConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Attempts to find and load configuration starting from the specified directory.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Loads `explicit` when given, otherwise searches from `start_dir`.
    ///
    /// Falls back to defaults when nothing is found.
    pub fn resolve(explicit: Option<&Path>, start_dir: &Path) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load_from_file(path)?, Some(path.to_path_buf())));
        }
        Ok(match Self::discover_from(start_dir)? {
            Some((config, path)) => (config, Some(path)),
            None => (Self::default(), None),
        })
    }

    /// Converts the file format into the SDK's settings.
    pub fn into_settings(self) -> Settings {
        Settings {
            output_dir: self.build.output_dir,
            default_keychain: self.ios.default_keychain.filter(|k| !k.is_empty()),
            executable: self.build.executable,
            log_level: self.build.log_level,
            ios_version: self.build.ios_version.filter(|v| !v.is_empty()),
            provisioning_dir: self.ios.provisioning_dir,
            informational: self.build.informational,
        }
    }
}
