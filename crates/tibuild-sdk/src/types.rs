//! Core types for tibuild-sdk.
//!
//! This module defines the fundamental types used throughout the SDK:
//!
//! - [`BuildError`] - Error types for resolution, probing and build execution
//! - [`Platform`] / [`DeploymentTarget`] / [`DeviceFamily`] - What to build for
//! - [`BuildTarget`] - A fully specified invocation of the build tool
//! - [`Settings`] - Process-wide build settings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the project descriptor that marks a directory as a buildable project.
pub const PROJECT_MARKER: &str = "tiapp.xml";

/// Error types for tibuild-sdk operations.
///
/// # Example
///
/// ```ignore
/// use tibuild_sdk::{BuildError, Orchestrator};
///
/// match orchestrator.run() {
///     Ok(Some(execution)) => println!("Built {}", execution.target.name),
///     Ok(None) => {}
///     Err(BuildError::ProjectNotFound(_)) => eprintln!("Not a Titanium project"),
///     Err(e) => eprintln!("Build failed: {}", e),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// None of the open project paths contains a `tiapp.xml`.
    #[error("Not a Titanium project, can't reach tiapp.xml in: {}", display_paths(.0))]
    ProjectNotFound(Vec<PathBuf>),

    /// No project path is open at all.
    #[error("Must have a project open. Run from a project directory or pass --project-dir")]
    NoOpenProject,

    /// The build tool reported an error.
    ///
    /// Raised for the first non-informational stderr line, a non-zero exit
    /// status, or a failure to spawn the executable.
    #[error("{executable} error: {message}")]
    Tool { executable: String, message: String },

    /// Structured (`--output json`) output could not be parsed.
    #[error("malformed output from `{command}`: {source}")]
    MalformedOutput {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    /// A provisioning profile descriptor is missing or incomplete.
    ///
    /// Never fatal: the resolver logs it and builds without signing arguments.
    #[error("no signing identity: {0}")]
    MissingSigningIdentity(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}. Check file paths and permissions")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}. Check tibuild.toml or CLI flags")]
    Config(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl BuildError {
    pub(crate) fn tool(executable: &str, message: impl Into<String>) -> Self {
        BuildError::Tool {
            executable: executable.to_string(),
            message: message.into(),
        }
    }
}

/// Platform to build for.
///
/// # Example
///
/// ```
/// use tibuild_sdk::Platform;
///
/// assert_eq!(Platform::Ios.as_str(), "ios");
/// assert_eq!("android".parse::<Platform>().unwrap(), Platform::Android);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    MobileWeb,
}

impl Platform {
    /// All platforms in menu order.
    pub const ALL: [Platform; 3] = [Platform::Android, Platform::Ios, Platform::MobileWeb];

    /// Returns the value passed to `--platform`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::MobileWeb => "mobileweb",
        }
    }

    /// Deployment targets offered for this platform, in menu order.
    pub fn deployment_targets(&self) -> &'static [DeploymentTarget] {
        use DeploymentTarget::*;
        match self {
            Platform::Android => &[Emulator, EmulatorAuto, Device, DistAdhoc, DistPlaystore],
            Platform::Ios => &[
                Simulator,
                SimulatorAuto,
                Device,
                DeviceAdhoc,
                DistAdhoc,
                DistAppstore,
            ],
            Platform::MobileWeb => &[],
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| BuildError::Config(format!("unknown platform '{}'", s)))
    }
}

/// Purpose/destination of a build.
///
/// Which values are valid depends on the [`Platform`]; see
/// [`Platform::deployment_targets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentTarget {
    /// Android emulator picked from the discovered list.
    Emulator,
    /// Android emulator chosen by the build tool.
    EmulatorAuto,
    /// iOS simulator picked from the discovered list.
    Simulator,
    /// iOS simulator chosen by the build tool.
    SimulatorAuto,
    /// Development build installed on a connected device.
    Device,
    /// iOS ad-hoc build installed on a device.
    DeviceAdhoc,
    /// Ad-hoc distribution package.
    DistAdhoc,
    /// Google Play distribution package.
    DistPlaystore,
    /// App Store distribution package.
    DistAppstore,
}

impl DeploymentTarget {
    /// Returns the menu label of the target.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentTarget::Emulator => "emulator",
            DeploymentTarget::EmulatorAuto => "emulator-auto",
            DeploymentTarget::Simulator => "simulator",
            DeploymentTarget::SimulatorAuto => "simulator-auto",
            DeploymentTarget::Device => "device",
            DeploymentTarget::DeviceAdhoc => "device-adhoc",
            DeploymentTarget::DistAdhoc => "dist-adhoc",
            DeploymentTarget::DistPlaystore => "dist-playstore",
            DeploymentTarget::DistAppstore => "dist-appstore",
        }
    }

    /// Parses a menu label.
    pub fn from_label(label: &str) -> Option<Self> {
        use DeploymentTarget::*;
        [
            Emulator,
            EmulatorAuto,
            Simulator,
            SimulatorAuto,
            Device,
            DeviceAdhoc,
            DistAdhoc,
            DistPlaystore,
            DistAppstore,
        ]
        .into_iter()
        .find(|t| t.as_str() == label)
    }

    /// Whether the target lets the build tool pick the emulator/simulator.
    pub fn is_auto(&self) -> bool {
        matches!(
            self,
            DeploymentTarget::EmulatorAuto | DeploymentTarget::SimulatorAuto
        )
    }

    /// Whether the target runs on an emulator or simulator.
    pub fn is_virtual(&self) -> bool {
        matches!(
            self,
            DeploymentTarget::Emulator
                | DeploymentTarget::EmulatorAuto
                | DeploymentTarget::Simulator
                | DeploymentTarget::SimulatorAuto
        )
    }

    /// Distribution builds bump the descriptor build number before building.
    pub fn is_dist(&self) -> bool {
        self.as_str().contains("dist")
    }

    /// Whether certificates come from the keychain's developer list.
    pub fn uses_developer_certificates(&self) -> bool {
        self.as_str().contains("device")
    }
}

impl fmt::Display for DeploymentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// iOS device family passed to `--device-family`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFamily {
    Iphone,
    Ipad,
    Universal,
}

impl DeviceFamily {
    pub const ALL: [DeviceFamily; 3] = [DeviceFamily::Iphone, DeviceFamily::Ipad, DeviceFamily::Universal];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceFamily::Iphone => "iphone",
            DeviceFamily::Ipad => "ipad",
            DeviceFamily::Universal => "universal",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        DeviceFamily::ALL.into_iter().find(|f| f.as_str() == label)
    }
}

/// A fully specified invocation of the build tool.
///
/// Built once per resolution flow by [`crate::command::CommandBuilder`] and
/// never modified afterwards; history stores copies.
///
/// # Example
///
/// ```
/// use tibuild_sdk::{BuildTarget, Platform};
///
/// let target = BuildTarget::new(
///     Platform::Android,
///     None,
///     "emulator auto",
///     "titanium",
///     vec!["build".into()],
///     "/work/MyApp",
/// );
/// assert_eq!(target.command_name, "titanium:build:emulator_auto");
/// assert_eq!(target.project_name(), "MyApp");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTarget {
    /// Platform the target builds for.
    pub platform: Platform,
    /// Deployment target, absent for mobileweb and clean invocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentTarget>,
    /// Human-readable name (target label, or the picked simulator's name).
    pub name: String,
    /// Executable to spawn.
    pub executable: String,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Working directory, which is also the project directory.
    pub cwd: PathBuf,
    /// Dispatch identifier, `titanium:build:<id>`.
    pub command_name: String,
}

impl BuildTarget {
    pub fn new(
        platform: Platform,
        deployment: Option<DeploymentTarget>,
        name: impl Into<String>,
        executable: impl Into<String>,
        args: Vec<String>,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        let name = name.into();
        let command_name = dispatch_identifier(&name);
        Self {
            platform,
            deployment,
            name,
            executable: executable.into(),
            args,
            cwd: cwd.into(),
            command_name,
        }
    }

    /// Name of the project, taken from the working directory.
    pub fn project_name(&self) -> String {
        project_name(&self.cwd)
    }

    /// The full command line, for display.
    pub fn command_line(&self) -> String {
        let mut line = self.executable.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

fn dispatch_identifier(id: &str) -> String {
    format!("titanium:build:{}", id.replace(' ', "_"))
}

pub(crate) fn project_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

/// Process-wide build settings.
///
/// Read-only after load; one instance per [`crate::Orchestrator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Output directory for packaged builds, relative to the project.
    pub output_dir: String,
    /// Keychain to use without prompting, when present.
    pub default_keychain: Option<String>,
    /// Build tool executable.
    pub executable: String,
    /// Value passed to `--log-level` for builds.
    pub log_level: String,
    /// Value passed to `--ios-version` for iOS builds, if any.
    pub ios_version: Option<String>,
    /// Where provisioning profiles are installed.
    pub provisioning_dir: Option<PathBuf>,
    /// stderr prefixes that are informational rather than errors.
    pub informational: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: "dist".to_string(),
            default_keychain: None,
            executable: "titanium".to_string(),
            log_level: "debug".to_string(),
            ios_version: None,
            provisioning_dir: None,
            informational: vec!["NOTICE:".to_string()],
        }
    }
}

impl Settings {
    /// Directory provisioning profiles are copied into.
    ///
    /// Falls back to `~/Library/MobileDevice/Provisioning Profiles`.
    pub fn provisioning_dir(&self) -> Option<PathBuf> {
        self.provisioning_dir.clone().or_else(|| {
            dirs::home_dir().map(|home| home.join("Library/MobileDevice/Provisioning Profiles"))
        })
    }
}
