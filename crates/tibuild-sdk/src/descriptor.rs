//! The project descriptor (`tiapp.xml`).
//!
//! Its presence marks a buildable project. Distribution builds bump one of two
//! build-number fields in it before building.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use crate::types::{BuildError, PROJECT_MARKER, Platform};

static IOS_BUILD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<key>CFBundleVersion</key>\s*<string>(\d+)</string>")
        .expect("CFBundleVersion pattern is valid")
});

static ANDROID_VERSION_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"android:versionCode="(\d+)""#).expect("versionCode pattern is valid")
});

/// Whether `dir` contains the project descriptor.
pub fn is_project(dir: &Path) -> bool {
    dir.join(PROJECT_MARKER).is_file()
}

/// Picks the first open path that contains the descriptor.
///
/// # Errors
///
/// * [`BuildError::NoOpenProject`] when `paths` is empty
/// * [`BuildError::ProjectNotFound`] when no path contains `tiapp.xml`
pub fn find_project(paths: &[PathBuf]) -> Result<PathBuf, BuildError> {
    if paths.is_empty() {
        return Err(BuildError::NoOpenProject);
    }
    paths
        .iter()
        .find(|p| is_project(p))
        .cloned()
        .ok_or_else(|| BuildError::ProjectNotFound(paths.to_vec()))
}

/// Build-number field bumped for a platform's distribution builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildNumber {
    /// `<key>CFBundleVersion</key><string>N</string>` in the iOS plist block.
    IosBundleVersion,
    /// `android:versionCode="N"` on the Android manifest.
    AndroidVersionCode,
}

impl BuildNumber {
    pub fn for_platform(platform: Platform) -> Option<Self> {
        match platform {
            Platform::Ios => Some(BuildNumber::IosBundleVersion),
            Platform::Android => Some(BuildNumber::AndroidVersionCode),
            Platform::MobileWeb => None,
        }
    }

    fn pattern(&self) -> &'static Regex {
        match self {
            BuildNumber::IosBundleVersion => &IOS_BUILD,
            BuildNumber::AndroidVersionCode => &ANDROID_VERSION_CODE,
        }
    }

    fn render(&self, value: u64) -> String {
        match self {
            BuildNumber::IosBundleVersion => {
                format!("<key>CFBundleVersion</key><string>{}</string>", value)
            }
            BuildNumber::AndroidVersionCode => format!(r#"android:versionCode="{}""#, value),
        }
    }

    /// Returns `contents` with the first occurrence incremented, and the new value.
    pub fn increment(&self, contents: &str) -> Option<(String, u64)> {
        let caps = self.pattern().captures(contents)?;
        let whole = caps.get(0)?;
        let next = caps[1].parse::<u64>().ok()?.checked_add(1)?;
        let mut updated = String::with_capacity(contents.len() + 1);
        updated.push_str(&contents[..whole.start()]);
        updated.push_str(&self.render(next));
        updated.push_str(&contents[whole.end()..]);
        Some((updated, next))
    }
}

/// Increments `field` in `<project_dir>/tiapp.xml`.
///
/// Returns the new value, or `None` when the descriptor or the field is absent.
pub fn bump_build_number(project_dir: &Path, field: BuildNumber) -> Result<Option<u64>, BuildError> {
    let path = project_dir.join(PROJECT_MARKER);
    if !path.is_file() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path)?;
    let Some((updated, value)) = field.increment(&contents) else {
        return Ok(None);
    };
    fs::write(&path, updated)?;
    info!(?field, value, "bumped build number in {}", path.display());
    Ok(Some(value))
}
