//! Signing and device discovery.
//!
//! This module asks the build tool what is installed on the machine
//! (`info --types ios|android --output json`) and turns the answer into the
//! lists the resolver presents:
//!
//! - iOS keychains with their developer/distribution certificates
//! - iOS provisioning profiles for the deployment class
//! - iOS simulators of the selected Xcode
//! - Android emulators, or AVDs when no emulator list is reported
//!
//! It also derives a [`SigningIdentity`] from the provisioning profile checked
//! into the project's `certs/` folder and installs that profile where Xcode
//! looks for it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::runner::{Invocation, ToolRunner};
use crate::types::{BuildError, DeploymentTarget};

/// Folder holding signing material, relative to the project.
pub const CERTS_DIR: &str = "certs";

/// A signing certificate in a keychain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Certificate {
    pub name: String,
}

/// Certificates of one keychain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Keychain {
    #[serde(default)]
    pub developer: Vec<Certificate>,
    #[serde(default)]
    pub distribution: Vec<Certificate>,
}

impl Keychain {
    pub fn has_certificates(&self) -> bool {
        !self.developer.is_empty() || !self.distribution.is_empty()
    }

    /// Developer certificates for device builds, distribution ones otherwise.
    pub fn certificates_for(&self, target: DeploymentTarget) -> &[Certificate] {
        if target.uses_developer_certificates() {
            &self.developer
        } else {
            &self.distribution
        }
    }
}

/// An installed provisioning profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProvisioningProfile {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
}

/// An iOS simulator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Simulator {
    pub name: String,
    #[serde(rename = "udid", alias = "identifier")]
    pub identifier: String,
    #[serde(rename = "version", alias = "osVersion", default)]
    pub os_version: String,
}

/// What the build tool reports about iOS signing and simulators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IosInfo {
    /// Keychains holding at least one certificate, by name.
    pub keychains: BTreeMap<String, Keychain>,
    /// Profiles for the requested deployment class.
    pub profiles: Vec<ProvisioningProfile>,
    /// Simulators of the selected Xcode's first simulator SDK.
    pub simulators: Vec<Simulator>,
}

#[derive(Debug, Default, Deserialize)]
struct RawInfo {
    ios: Option<RawIos>,
    android: Option<RawAndroid>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIos {
    certs: Option<RawCerts>,
    provisioning: Option<RawProvisioning>,
    #[serde(rename = "selectedXcode")]
    selected_xcode: Option<RawXcode>,
    simulators: Option<RawSimulators>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCerts {
    #[serde(default)]
    keychains: BTreeMap<String, Keychain>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProvisioning {
    #[serde(default)]
    development: Vec<ProvisioningProfile>,
    #[serde(default)]
    adhoc: Vec<ProvisioningProfile>,
    #[serde(default)]
    distribution: Vec<ProvisioningProfile>,
}

#[derive(Debug, Default, Deserialize)]
struct RawXcode {
    #[serde(default)]
    sims: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSimulators {
    #[serde(default)]
    ios: BTreeMap<String, Vec<Simulator>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAndroid {
    #[serde(alias = "simulators")]
    emulators: Option<Vec<RawEmulator>>,
    avds: Option<Vec<RawAvd>>,
}

#[derive(Debug, Deserialize)]
struct RawEmulator {
    #[serde(default)]
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawAvd {
    name: String,
    #[serde(default)]
    target: String,
}

fn parse_info(json: Value, types: &str) -> Result<RawInfo, BuildError> {
    serde_json::from_value(json).map_err(|source| BuildError::MalformedOutput {
        command: format!("info --types {}", types),
        source,
    })
}

fn info_invocation(executable: &str, types: &str) -> Invocation {
    Invocation::new(
        executable,
        [
            "info",
            "--types",
            types,
            "--log-level",
            "error",
            "--output",
            "json",
        ],
    )
}

fn query_info(runner: &dyn ToolRunner, executable: &str, types: &str) -> Result<RawInfo, BuildError> {
    let output = runner.run(&info_invocation(executable, types))?;
    parse_info(output.json.unwrap_or(Value::Null), types)
}

impl IosInfo {
    /// Builds the iOS view of an `info --types ios` answer.
    ///
    /// Profiles are picked by deployment class: `dist-adhoc` → adhoc,
    /// `dist-appstore` → distribution, anything else → development.
    pub fn from_json(json: Value, target: DeploymentTarget) -> Result<Self, BuildError> {
        Ok(Self::from_raw(parse_info(json, "ios")?, target))
    }

    fn from_raw(raw: RawInfo, target: DeploymentTarget) -> Self {
        let mut info = IosInfo::default();
        let Some(ios) = raw.ios else {
            return info;
        };

        if let Some(certs) = ios.certs {
            info.keychains = certs
                .keychains
                .into_iter()
                .filter(|(_, keychain)| keychain.has_certificates())
                .collect();
        }

        if let Some(provisioning) = ios.provisioning {
            info.profiles = match target {
                DeploymentTarget::DistAdhoc => provisioning.adhoc,
                DeploymentTarget::DistAppstore => provisioning.distribution,
                _ => provisioning.development,
            };
        }

        if let Some(mut simulators) = ios.simulators {
            let version = ios
                .selected_xcode
                .and_then(|xcode| xcode.sims.into_iter().next());
            if let Some(version) = version {
                info.simulators = simulators.ios.remove(&version).unwrap_or_default();
            }
        }

        info
    }

    /// Keychain names in display order.
    pub fn keychain_names(&self) -> Vec<String> {
        self.keychains.keys().cloned().collect()
    }
}

/// Queries the build tool for iOS certificates, profiles and simulators.
pub fn load_ios_info(
    runner: &dyn ToolRunner,
    executable: &str,
    target: DeploymentTarget,
) -> Result<IosInfo, BuildError> {
    let raw = query_info(runner, executable, "ios")?;
    let info = IosInfo::from_raw(raw, target);
    debug!(
        keychains = info.keychains.len(),
        profiles = info.profiles.len(),
        simulators = info.simulators.len(),
        "loaded iOS info"
    );
    Ok(info)
}

/// An Android emulator or AVD the app can be launched on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AndroidDevice {
    /// A discovered emulator.
    Emulator { id: String, name: String },
    /// An Android Virtual Device configuration.
    Avd { name: String, target: String },
}

impl AndroidDevice {
    pub fn name(&self) -> &str {
        match self {
            AndroidDevice::Emulator { name, .. } | AndroidDevice::Avd { name, .. } => name,
        }
    }

    /// Secondary line for the selection list.
    pub fn detail(&self) -> &str {
        match self {
            AndroidDevice::Emulator { id, .. } => id,
            AndroidDevice::Avd { target, .. } => target,
        }
    }

    /// Flag selecting this device in a build.
    pub fn flag(&self) -> &'static str {
        match self {
            AndroidDevice::Emulator { .. } => "--device-id",
            AndroidDevice::Avd { .. } => "--avd-id",
        }
    }
}

/// What the build tool reports about Android devices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AndroidInfo {
    pub devices: Vec<AndroidDevice>,
}

impl AndroidInfo {
    /// Emulators when reported, AVDs otherwise.
    pub fn from_json(json: Value) -> Result<Self, BuildError> {
        Ok(Self::from_raw(parse_info(json, "android")?))
    }

    fn from_raw(raw: RawInfo) -> Self {
        let Some(android) = raw.android else {
            return AndroidInfo::default();
        };
        let devices = if let Some(emulators) = android.emulators {
            emulators
                .into_iter()
                .map(|e| AndroidDevice::Emulator {
                    id: e.id,
                    name: e.name,
                })
                .collect()
        } else {
            android
                .avds
                .unwrap_or_default()
                .into_iter()
                .map(|a| AndroidDevice::Avd {
                    name: a.name,
                    target: a.target,
                })
                .collect()
        };
        AndroidInfo { devices }
    }
}

/// Queries the build tool for Android emulators and AVDs.
pub fn load_android_info(
    runner: &dyn ToolRunner,
    executable: &str,
) -> Result<AndroidInfo, BuildError> {
    let info = AndroidInfo::from_raw(query_info(runner, executable, "android")?);
    debug!(devices = info.devices.len(), "loaded Android info");
    Ok(info)
}

/// Outcome of the keychain selection policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeychainChoice {
    /// Use this keychain without asking.
    Resolved(String),
    /// Ask the user to pick one of these.
    Prompt(Vec<String>),
    /// No keychain holds a certificate.
    Unavailable,
}

/// Applies the keychain policy: configured default if discovered, the only
/// keychain if there is exactly one, otherwise ask.
pub fn choose_keychain(info: &IosInfo, default_keychain: Option<&str>) -> KeychainChoice {
    if let Some(default) = default_keychain
        && info.keychains.contains_key(default)
    {
        return KeychainChoice::Resolved(default.to_string());
    }
    let mut names = info.keychain_names();
    match names.len() {
        0 => KeychainChoice::Unavailable,
        1 => KeychainChoice::Resolved(names.remove(0)),
        _ => KeychainChoice::Prompt(names),
    }
}

/// Team and profile a build is signed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningIdentity {
    pub profile_uuid: String,
    pub team_name: String,
    pub team_identifier: String,
    /// `TeamName (TeamIdentifier)`.
    pub display_name: String,
}

impl SigningIdentity {
    pub fn new(
        profile_uuid: impl Into<String>,
        team_name: impl Into<String>,
        team_identifier: impl Into<String>,
    ) -> Self {
        let team_name = team_name.into();
        let team_identifier = team_identifier.into();
        Self {
            profile_uuid: profile_uuid.into(),
            display_name: format!("{} ({})", team_name, team_identifier),
            team_name,
            team_identifier,
        }
    }
}

/// Profile descriptor checked into the project for `target`.
pub fn profile_descriptor_path(project_dir: &Path, target: DeploymentTarget) -> PathBuf {
    let file = match target {
        DeploymentTarget::Device => "development.mobileprovision",
        DeploymentTarget::DistAppstore => "appstore.mobileprovision",
        _ => "distribution.mobileprovision",
    };
    project_dir.join(CERTS_DIR).join(file)
}

static PLIST_UUID: LazyLock<Regex> = LazyLock::new(|| plist_string("UUID"));
static PLIST_TEAM_NAME: LazyLock<Regex> = LazyLock::new(|| plist_string("TeamName"));
static PLIST_TEAM_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<key>TeamIdentifier</key>\s*<array>\s*<string>([^<]*)</string>")
        .expect("TeamIdentifier pattern is valid")
});

fn plist_string(key: &str) -> Regex {
    Regex::new(&format!(r"<key>{}</key>\s*<string>([^<]*)</string>", key))
        .expect("plist key pattern is valid")
}

/// Extracts the XML property list embedded in a signed profile.
pub fn extract_plist(data: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(data);
    let begin = text.find("<?xml")?;
    let end = text[begin..].find("</plist>")? + begin + "</plist>".len();
    Some(text[begin..end].to_string())
}

/// Reads UUID, TeamName and the first TeamIdentifier of a profile.
pub fn parse_profile(data: &[u8]) -> Result<SigningIdentity, BuildError> {
    let plist = extract_plist(data)
        .ok_or_else(|| BuildError::MissingSigningIdentity("no property list in profile".into()))?;
    let field = |pattern: &Regex, key: &str| {
        pattern
            .captures(&plist)
            .map(|caps| unescape_xml(caps[1].trim()))
            .filter(|value| !value.is_empty())
            .ok_or_else(|| BuildError::MissingSigningIdentity(format!("profile has no {}", key)))
    };
    Ok(SigningIdentity::new(
        field(&PLIST_UUID, "UUID")?,
        field(&PLIST_TEAM_NAME, "TeamName")?,
        field(&PLIST_TEAM_IDENTIFIER, "TeamIdentifier")?,
    ))
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Reads the identity from the project's profile descriptor for `target`.
pub fn read_signing_identity(
    project_dir: &Path,
    target: DeploymentTarget,
) -> Result<(SigningIdentity, PathBuf), BuildError> {
    let path = profile_descriptor_path(project_dir, target);
    if !path.is_file() {
        return Err(BuildError::MissingSigningIdentity(format!(
            "{} not found",
            path.display()
        )));
    }
    let data = fs::read(&path)?;
    let identity = parse_profile(&data)?;
    Ok((identity, path))
}

/// Copies `profile` to `<provisioning_dir>/<UUID>.mobileprovision` unless it
/// is already there. Returns the destination when a copy was made.
pub fn install_profile(
    profile: &Path,
    identity: &SigningIdentity,
    provisioning_dir: &Path,
) -> Result<Option<PathBuf>, BuildError> {
    let dest = provisioning_dir.join(format!("{}.mobileprovision", identity.profile_uuid));
    if dest.exists() {
        return Ok(None);
    }
    fs::create_dir_all(provisioning_dir)?;
    fs::copy(profile, &dest)?;
    info!("installed provisioning profile {}", dest.display());
    Ok(Some(dest))
}

/// Resolves the signing identity for an iOS device or distribution build.
///
/// Failures are logged and yield `None`; the build then goes ahead without
/// signing arguments.
pub fn resolve_signing_identity(
    project_dir: &Path,
    target: DeploymentTarget,
    provisioning_dir: Option<&Path>,
) -> Option<SigningIdentity> {
    let (identity, path) = match read_signing_identity(project_dir, target) {
        Ok(found) => found,
        Err(e) => {
            warn!("{}; building without signing arguments", e);
            return None;
        }
    };
    match provisioning_dir {
        Some(dir) => {
            if let Err(e) = install_profile(&path, &identity, dir) {
                warn!("could not install provisioning profile: {}", e);
            }
        }
        None => warn!("no provisioning profile directory; profile not installed"),
    }
    Some(identity)
}
