//! Project settings sidecar.
//!
//! A `*.sublime-project` file next to `tiapp.xml` can carry signing defaults
//! under its `settings` object, keyed with dotted names such as
//! `titanium_android.keystore`. The file is JSON with `//` and `/* */`
//! comments.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::types::BuildError;

/// Glob pattern of the sidecar file, relative to the project directory.
pub const SIDECAR_PATTERN: &str = "*.sublime-project";

/// Android store password.
pub const ANDROID_STORE_PASSWORD: &str = "titanium_android.store-password";
/// Android key alias.
pub const ANDROID_ALIAS: &str = "titanium_android.alias";
/// Android keystore file name inside `certs/`.
pub const ANDROID_KEYSTORE: &str = "titanium_android.keystore";

/// The `settings` object of a sidecar file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectSettings {
    values: Map<String, Value>,
}

impl ProjectSettings {
    /// Finds and loads the first sidecar in `project_dir`.
    ///
    /// Unreadable or malformed files are logged and treated as absent.
    pub fn discover(project_dir: &Path) -> Option<Self> {
        let path = find_sidecar(project_dir)?;
        match Self::load(&path) {
            Ok(settings) => {
                debug!("loaded project settings from {}", path.display());
                Some(settings)
            }
            Err(e) => {
                warn!("ignoring project settings {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, BuildError> {
        let json: Value = serde_json::from_str(&strip_json_comments(contents))
            .map_err(|e| BuildError::Config(format!("invalid project settings: {}", e)))?;
        let values = match json.get("settings") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        Ok(Self { values })
    }

    /// A setting rendered as a string. Numbers and booleans are stringified.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }
}

fn find_sidecar(project_dir: &Path) -> Option<PathBuf> {
    let dir = glob::Pattern::escape(&project_dir.to_string_lossy());
    let pattern = format!("{}/{}", dir, SIDECAR_PATTERN);
    glob::glob(&pattern)
        .ok()?
        .filter_map(Result::ok)
        .find(|path| path.is_file())
}

/// Removes `//` and `/* */` comments outside of string literals.
pub fn strip_json_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIDECAR: &str = r#"{
    // signing defaults
    "folders": [{ "path": "." }],
    "settings": {
        "titanium_android.store-password": "s3cret", /* inline */
        "titanium_android.alias": "release",
        "titanium_android.url": "http://example.com//not-a-comment",
        "build.number": 12
    }
}"#;

    #[test]
    fn test_strip_comments_keeps_strings() {
        let stripped = strip_json_comments(SIDECAR);
        assert!(!stripped.contains("signing defaults"));
        assert!(!stripped.contains("inline"));
        assert!(stripped.contains("http://example.com//not-a-comment"));
    }

    #[test]
    fn test_strip_comments_escaped_quote() {
        let stripped = strip_json_comments(r#"{"a": "say \"hi\" // still string"} // gone"#);
        assert_eq!(stripped, r#"{"a": "say \"hi\" // still string"} "#);
    }

    #[test]
    fn test_parse_settings() {
        let settings = ProjectSettings::parse(SIDECAR).unwrap();
        assert_eq!(settings.get(ANDROID_STORE_PASSWORD), Some("s3cret".into()));
        assert_eq!(settings.get(ANDROID_ALIAS), Some("release".into()));
        assert_eq!(settings.get("build.number"), Some("12".into()));
        assert_eq!(settings.get(ANDROID_KEYSTORE), None);
        assert_eq!(
            settings.get_or(ANDROID_KEYSTORE, "android.keystore"),
            "android.keystore"
        );
    }

    #[test]
    fn test_parse_without_settings_object() {
        let settings = ProjectSettings::parse(r#"{"folders": []}"#).unwrap();
        assert_eq!(settings, ProjectSettings::default());
    }

    #[test]
    fn test_discover() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProjectSettings::discover(dir.path()).is_none());

        fs::write(dir.path().join("MyApp.sublime-project"), SIDECAR).unwrap();
        let settings = ProjectSettings::discover(dir.path()).unwrap();
        assert_eq!(settings.get(ANDROID_ALIAS), Some("release".into()));
    }

    #[test]
    fn test_discover_malformed_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Broken.sublime-project"), "{ nope").unwrap();
        assert!(ProjectSettings::discover(dir.path()).is_none());
    }
}
