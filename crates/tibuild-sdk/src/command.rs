//! Build command assembly.
//!
//! [`CommandBuilder::arguments`] maps a resolved [`BuildRequest`] to the
//! argument list of the build tool without touching anything.
//! [`CommandBuilder::assemble`] applies the descriptor build-number bump for
//! distribution builds and wraps the arguments in a [`BuildTarget`].

use std::env;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::descriptor::{BuildNumber, bump_build_number};
use crate::project_settings::{
    ANDROID_ALIAS, ANDROID_KEYSTORE, ANDROID_STORE_PASSWORD, ProjectSettings,
};
use crate::provisioning::{AndroidDevice, CERTS_DIR, SigningIdentity, Simulator};
use crate::runner::{Invocation, ToolRunner};
use crate::types::{BuildError, BuildTarget, DeploymentTarget, DeviceFamily, Platform, Settings};

/// Environment variable overriding the Android store password.
pub const STORE_PASSWORD_ENV: &str = "TIBUILD_STORE_PASSWORD";

/// Keystore file used when the sidecar does not name one.
pub const DEFAULT_KEYSTORE: &str = "android.keystore";

/// Choices made while resolving a target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selections {
    pub family: Option<DeviceFamily>,
    pub simulator: Option<Simulator>,
    pub android_device: Option<AndroidDevice>,
    pub keychain: Option<String>,
    pub certificate: Option<String>,
}

/// Keystore settings for Play Store builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidSigning {
    pub store_password: Option<String>,
    pub alias: Option<String>,
    pub keystore: PathBuf,
}

impl AndroidSigning {
    /// Reads signing settings for `project_dir`.
    ///
    /// Returns `None` when the project has no `certs/` folder. Values come
    /// from the sidecar; [`STORE_PASSWORD_ENV`] overrides the store password.
    pub fn resolve(project_dir: &Path) -> Option<Self> {
        let certs = project_dir.join(CERTS_DIR);
        if !certs.is_dir() {
            debug!("no {} folder; building without keystore", certs.display());
            return None;
        }
        let sidecar = ProjectSettings::discover(project_dir).unwrap_or_default();
        let store_password = env::var(STORE_PASSWORD_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| sidecar.get(ANDROID_STORE_PASSWORD));
        Some(Self {
            store_password,
            alias: sidecar.get(ANDROID_ALIAS),
            keystore: certs.join(sidecar.get_or(ANDROID_KEYSTORE, DEFAULT_KEYSTORE)),
        })
    }
}

/// Everything needed to produce a build command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub platform: Platform,
    /// Absent for mobileweb.
    pub target: Option<DeploymentTarget>,
    pub project_dir: PathBuf,
    /// SDK version reported by the probe.
    pub sdk_version: String,
    pub selections: Selections,
    /// Identity from the project's provisioning profile (iOS).
    pub signing: Option<SigningIdentity>,
    /// Keystore settings (Android Play Store).
    pub android_signing: Option<AndroidSigning>,
}

impl BuildRequest {
    pub fn new(
        platform: Platform,
        target: Option<DeploymentTarget>,
        project_dir: impl Into<PathBuf>,
        sdk_version: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            target,
            project_dir: project_dir.into(),
            sdk_version: sdk_version.into(),
            selections: Selections::default(),
            signing: None,
            android_signing: None,
        }
    }

    /// Display name of the target: the picked device, else the target label.
    pub fn name(&self) -> String {
        if let Some(simulator) = &self.selections.simulator {
            return simulator.name.clone();
        }
        if let Some(device) = &self.selections.android_device {
            return device.name().to_string();
        }
        match self.target {
            Some(target) => target.as_str().to_string(),
            None => self.platform.as_str().to_string(),
        }
    }
}

/// Value passed to `--target` for a deployment target.
pub fn target_flag(platform: Platform, target: DeploymentTarget) -> &'static str {
    use DeploymentTarget::*;
    match (platform, target) {
        (Platform::Android, Emulator | EmulatorAuto) => "emulator",
        (Platform::Android, DistAdhoc) => "device",
        (Platform::Ios, Simulator | SimulatorAuto) => "simulator",
        (Platform::Ios, DeviceAdhoc) => "dist-adhoc",
        _ => target.as_str(),
    }
}

/// Produces build tool invocations from resolved requests.
#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder<'a> {
    settings: &'a Settings,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Arguments for `request`. Pure: same request, same arguments.
    pub fn arguments(&self, request: &BuildRequest) -> Vec<String> {
        let dir = request.project_dir.display().to_string();
        let output_dir = request
            .project_dir
            .join(&self.settings.output_dir)
            .display()
            .to_string();

        let mut args: Vec<String> = vec![
            "build".into(),
            "--platform".into(),
            request.platform.as_str().into(),
            "--log-level".into(),
            self.settings.log_level.clone(),
            "--sdk".into(),
            request.sdk_version.clone(),
            "--project-dir".into(),
            dir,
            "--color".into(),
        ];

        if request.platform == Platform::Ios
            && let Some(version) = &self.settings.ios_version
        {
            push(&mut args, "--ios-version", version);
        }

        let Some(target) = request.target else {
            return args;
        };

        match request.platform {
            Platform::Android => android_flags(&mut args, request, target, &output_dir),
            Platform::Ios => ios_flags(&mut args, request, target, &output_dir),
            Platform::MobileWeb => return args,
        }

        push(&mut args, "--target", target_flag(request.platform, target));

        if request.platform == Platform::Ios && !target.is_virtual() {
            signing_flags(&mut args, request, target);
        }

        args
    }

    /// Bumps the descriptor build number for distribution builds, then
    /// returns the finished target.
    pub fn assemble(&self, request: &BuildRequest) -> Result<BuildTarget, BuildError> {
        if let Some(target) = request.target
            && target.is_dist()
            && let Some(field) = BuildNumber::for_platform(request.platform)
        {
            bump_build_number(&request.project_dir, field)?;
        }

        let args = self.arguments(request);
        Ok(BuildTarget::new(
            request.platform,
            request.target,
            request.name(),
            self.settings.executable.clone(),
            args,
            request.project_dir.clone(),
        ))
    }

    /// `clean --project-dir D`.
    pub fn clean(&self, project_dir: &Path) -> Invocation {
        Invocation::new(
            self.settings.executable.clone(),
            [
                "clean".to_string(),
                "--project-dir".to_string(),
                project_dir.display().to_string(),
            ],
        )
        .cwd(project_dir)
        .streaming(true)
    }

    /// `project sdk-version --project-dir D --log-level error --output json`.
    pub fn sdk_probe(&self, project_dir: &Path) -> Invocation {
        Invocation::new(
            self.settings.executable.clone(),
            [
                "project".to_string(),
                "sdk-version".to_string(),
                "--project-dir".to_string(),
                project_dir.display().to_string(),
                "--log-level".to_string(),
                "error".to_string(),
                "--output".to_string(),
                "json".to_string(),
            ],
        )
        .cwd(project_dir)
    }

    /// Asks the build tool which SDK the project uses.
    pub fn probe_sdk_version(
        &self,
        runner: &dyn ToolRunner,
        project_dir: &Path,
    ) -> Result<String, BuildError> {
        let output = runner.run(&self.sdk_probe(project_dir))?;
        let version = match output.json {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let version = version.trim().to_string();
        if version.is_empty() {
            return Err(BuildError::tool(
                &self.settings.executable,
                "project sdk-version reported no SDK",
            ));
        }
        debug!(sdk = %version, "probed SDK version");
        Ok(version)
    }
}

fn push(args: &mut Vec<String>, flag: &str, value: &str) {
    args.push(flag.to_string());
    args.push(value.to_string());
}

fn android_flags(
    args: &mut Vec<String>,
    request: &BuildRequest,
    target: DeploymentTarget,
    output_dir: &str,
) {
    match target {
        DeploymentTarget::Emulator => {
            if let Some(device) = &request.selections.android_device {
                push(args, device.flag(), device.name());
            }
        }
        DeploymentTarget::DistPlaystore => {
            if let Some(signing) = &request.android_signing {
                if let Some(password) = &signing.store_password {
                    push(args, "--store-password", password);
                }
                if let Some(alias) = &signing.alias {
                    push(args, "--alias", alias);
                }
                push(args, "--keystore", &signing.keystore.display().to_string());
            }
        }
        DeploymentTarget::Device | DeploymentTarget::DistAdhoc => {
            push(args, "--output-dir", output_dir);
            let deploy_type = if target == DeploymentTarget::Device {
                "development"
            } else {
                "test"
            };
            push(args, "--deploy-type", deploy_type);
        }
        _ => {}
    }
}

fn ios_flags(
    args: &mut Vec<String>,
    request: &BuildRequest,
    target: DeploymentTarget,
    output_dir: &str,
) {
    match target {
        DeploymentTarget::Simulator => {
            if let Some(simulator) = &request.selections.simulator {
                push(args, "--device-id", &simulator.identifier);
                push(args, "--device-family", DeviceFamily::Universal.as_str());
            }
        }
        DeploymentTarget::SimulatorAuto => {}
        _ => {
            let family = request.selections.family.unwrap_or(DeviceFamily::Universal);
            push(args, "--device-family", family.as_str());
            if target != DeploymentTarget::Device {
                push(args, "--output-dir", output_dir);
                push(args, "--device-id", "all");
            }
            if target == DeploymentTarget::Device {
                push(args, "--deploy-type", "development");
            } else if target != DeploymentTarget::DistAppstore {
                push(args, "--deploy-type", "test");
            }
        }
    }
}

fn signing_flags(args: &mut Vec<String>, request: &BuildRequest, target: DeploymentTarget) {
    if let Some(identity) = &request.signing {
        push(args, "--pp-uuid", &identity.profile_uuid);
    }
    let name = request
        .selections
        .certificate
        .as_deref()
        .or(request.signing.as_ref().map(|s| s.display_name.as_str()));
    if let Some(name) = name {
        let flag = if target == DeploymentTarget::Device {
            "--developer-name"
        } else {
            "--distribution-name"
        };
        push(args, flag, name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ToolOutput;
    use crate::types::PROJECT_MARKER;
    use std::fs;

    const TIAPP: &str = r#"<ti:app>
    <ios><plist><dict>
        <key>CFBundleVersion</key>
        <string>5</string>
    </dict></plist></ios>
    <android><manifest android:versionCode="20"/></android>
</ti:app>"#;

    fn request(platform: Platform, target: DeploymentTarget) -> BuildRequest {
        BuildRequest::new(platform, Some(target), "/work/App", "12.2.0.GA")
    }

    fn tail(args: &[String], n: usize) -> Vec<&str> {
        args[args.len() - n..].iter().map(String::as_str).collect()
    }

    fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_base_arguments() {
        let settings = Settings::default();
        let args = CommandBuilder::new(&settings)
            .arguments(&BuildRequest::new(Platform::MobileWeb, None, "/work/App", "12.2.0.GA"));
        assert_eq!(
            args,
            vec![
                "build",
                "--platform",
                "mobileweb",
                "--log-level",
                "debug",
                "--sdk",
                "12.2.0.GA",
                "--project-dir",
                "/work/App",
                "--color"
            ]
        );
    }

    #[test]
    fn test_exactly_one_target_for_every_pair() {
        let settings = Settings::default();
        let builder = CommandBuilder::new(&settings);
        for platform in [Platform::Android, Platform::Ios] {
            for target in platform.deployment_targets() {
                let args = builder.arguments(&request(platform, *target));
                let count = args.iter().filter(|a| *a == "--target").count();
                assert_eq!(count, 1, "{platform}/{target}: {args:?}");
                assert_eq!(
                    flag_value(&args, "--target"),
                    Some(target_flag(platform, *target))
                );
            }
        }
    }

    #[test]
    fn test_target_aliases() {
        assert_eq!(target_flag(Platform::Ios, DeploymentTarget::DeviceAdhoc), "dist-adhoc");
        assert_eq!(target_flag(Platform::Android, DeploymentTarget::DistAdhoc), "device");
        assert_eq!(target_flag(Platform::Android, DeploymentTarget::EmulatorAuto), "emulator");
        assert_eq!(target_flag(Platform::Ios, DeploymentTarget::DistAppstore), "dist-appstore");
    }

    #[test]
    fn test_android_device() {
        let settings = Settings::default();
        let args =
            CommandBuilder::new(&settings).arguments(&request(Platform::Android, DeploymentTarget::Device));
        assert_eq!(
            tail(&args, 6),
            vec![
                "--output-dir",
                "/work/App/dist",
                "--deploy-type",
                "development",
                "--target",
                "device"
            ]
        );
    }

    #[test]
    fn test_android_dist_adhoc_is_test_deploy() {
        let settings = Settings::default();
        let args = CommandBuilder::new(&settings)
            .arguments(&request(Platform::Android, DeploymentTarget::DistAdhoc));
        assert_eq!(flag_value(&args, "--deploy-type"), Some("test"));
        assert_eq!(flag_value(&args, "--target"), Some("device"));
    }

    #[test]
    fn test_android_emulator_flags() {
        let settings = Settings::default();
        let builder = CommandBuilder::new(&settings);

        let mut req = request(Platform::Android, DeploymentTarget::Emulator);
        req.selections.android_device = Some(AndroidDevice::Emulator {
            id: "e1".into(),
            name: "Pixel 7".into(),
        });
        let args = builder.arguments(&req);
        assert_eq!(
            tail(&args, 4),
            vec!["--device-id", "Pixel 7", "--target", "emulator"]
        );

        req.selections.android_device = Some(AndroidDevice::Avd {
            name: "Nexus_5".into(),
            target: "Android 9".into(),
        });
        let args = builder.arguments(&req);
        assert_eq!(flag_value(&args, "--avd-id"), Some("Nexus_5"));
        assert_eq!(req.name(), "Nexus_5");
    }

    #[test]
    fn test_android_playstore_signing() {
        let settings = Settings::default();
        let mut req = request(Platform::Android, DeploymentTarget::DistPlaystore);
        req.android_signing = Some(AndroidSigning {
            store_password: Some("s3cret".into()),
            alias: None,
            keystore: PathBuf::from("/work/App/certs/android.keystore"),
        });
        let args = CommandBuilder::new(&settings).arguments(&req);
        assert_eq!(flag_value(&args, "--store-password"), Some("s3cret"));
        assert!(!args.contains(&"--alias".to_string()));
        assert_eq!(
            flag_value(&args, "--keystore"),
            Some("/work/App/certs/android.keystore")
        );
        assert!(!args.contains(&"--output-dir".to_string()));
    }

    #[test]
    fn test_ios_dist_appstore_universal() {
        let settings = Settings::default();
        let mut req = request(Platform::Ios, DeploymentTarget::DistAppstore);
        req.selections.family = Some(DeviceFamily::Universal);
        let args = CommandBuilder::new(&settings).arguments(&req);
        assert_eq!(flag_value(&args, "--device-family"), Some("universal"));
        assert_eq!(flag_value(&args, "--device-id"), Some("all"));
        assert!(!args.contains(&"--deploy-type".to_string()));
        assert_eq!(tail(&args, 2), vec!["--target", "dist-appstore"]);
    }

    #[test]
    fn test_ios_device_signing_order() {
        let mut settings = Settings::default();
        settings.ios_version = Some("17.2".into());
        let mut req = request(Platform::Ios, DeploymentTarget::Device);
        req.selections.family = Some(DeviceFamily::Iphone);
        req.selections.certificate = Some("Jane Doe (ABCDE12345)".into());
        req.signing = Some(SigningIdentity::new("X", "Acme", "ABC123"));

        let args = CommandBuilder::new(&settings).arguments(&req);
        assert_eq!(flag_value(&args, "--ios-version"), Some("17.2"));
        assert!(!args.contains(&"--output-dir".to_string()));
        assert_eq!(
            tail(&args, 10),
            vec![
                "--device-family",
                "iphone",
                "--deploy-type",
                "development",
                "--target",
                "device",
                "--pp-uuid",
                "X",
                "--developer-name",
                "Jane Doe (ABCDE12345)"
            ]
        );
    }

    #[test]
    fn test_ios_descriptor_identity_names_distribution() {
        let settings = Settings::default();
        let mut req = request(Platform::Ios, DeploymentTarget::DistAdhoc);
        req.signing = Some(SigningIdentity::new("X", "Acme", "ABC123"));
        let args = CommandBuilder::new(&settings).arguments(&req);
        assert_eq!(flag_value(&args, "--pp-uuid"), Some("X"));
        assert_eq!(flag_value(&args, "--distribution-name"), Some("Acme (ABC123)"));
        assert!(!args.contains(&"--developer-name".to_string()));
    }

    #[test]
    fn test_ios_simulator_has_no_signing() {
        let settings = Settings::default();
        let mut req = request(Platform::Ios, DeploymentTarget::Simulator);
        req.signing = Some(SigningIdentity::new("X", "Acme", "ABC123"));
        req.selections.simulator = Some(Simulator {
            name: "iPhone 15".into(),
            identifier: "UDID-15".into(),
            os_version: "17.2".into(),
        });
        let args = CommandBuilder::new(&settings).arguments(&req);
        assert_eq!(
            tail(&args, 6),
            vec![
                "--device-id",
                "UDID-15",
                "--device-family",
                "universal",
                "--target",
                "simulator"
            ]
        );
        assert_eq!(req.name(), "iPhone 15");
    }

    #[test]
    fn test_arguments_are_pure() {
        let settings = Settings::default();
        let builder = CommandBuilder::new(&settings);
        let req = request(Platform::Ios, DeploymentTarget::DeviceAdhoc);
        assert_eq!(builder.arguments(&req), builder.arguments(&req));
    }

    #[test]
    fn test_assemble_bumps_once_for_dist() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PROJECT_MARKER), TIAPP).unwrap();
        let settings = Settings::default();
        let builder = CommandBuilder::new(&settings);

        let mut req = BuildRequest::new(
            Platform::Ios,
            Some(DeploymentTarget::DistAppstore),
            dir.path(),
            "12.2.0.GA",
        );
        req.selections.family = Some(DeviceFamily::Universal);
        let target = builder.assemble(&req).unwrap();
        assert_eq!(target.command_name, "titanium:build:dist-appstore");
        assert_eq!(target.cwd, dir.path());

        let contents = fs::read_to_string(dir.path().join(PROJECT_MARKER)).unwrap();
        assert!(contents.contains("<key>CFBundleVersion</key><string>6</string>"));
        assert!(contents.contains(r#"android:versionCode="20""#));
    }

    #[test]
    fn test_assemble_bumps_version_code_for_android_dist() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PROJECT_MARKER), TIAPP).unwrap();
        let settings = Settings::default();

        let req = BuildRequest::new(
            Platform::Android,
            Some(DeploymentTarget::DistPlaystore),
            dir.path(),
            "12.2.0.GA",
        );
        let target = CommandBuilder::new(&settings).assemble(&req).unwrap();
        assert_eq!(target.command_name, "titanium:build:dist-playstore");

        let contents = fs::read_to_string(dir.path().join(PROJECT_MARKER)).unwrap();
        assert_eq!(
            contents,
            TIAPP.replace(r#"versionCode="20""#, r#"versionCode="21""#)
        );
        assert!(contents.contains("<string>5</string>"));
    }

    #[test]
    fn test_assemble_leaves_descriptor_for_non_dist() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PROJECT_MARKER), TIAPP).unwrap();
        let settings = Settings::default();
        let req = BuildRequest::new(
            Platform::Android,
            Some(DeploymentTarget::Device),
            dir.path(),
            "12.2.0.GA",
        );
        CommandBuilder::new(&settings).assemble(&req).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join(PROJECT_MARKER)).unwrap(),
            TIAPP
        );
    }

    #[test]
    fn test_android_signing_requires_certs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AndroidSigning::resolve(dir.path()).is_none());

        fs::create_dir(dir.path().join(CERTS_DIR)).unwrap();
        fs::write(
            dir.path().join("App.sublime-project"),
            r#"{ "settings": { "titanium_android.alias": "release", "titanium_android.keystore": "upload.jks" } }"#,
        )
        .unwrap();
        let signing = AndroidSigning::resolve(dir.path()).unwrap();
        assert_eq!(signing.alias.as_deref(), Some("release"));
        assert_eq!(signing.keystore, dir.path().join("certs/upload.jks"));
    }

    #[test]
    fn test_clean_invocation() {
        let settings = Settings::default();
        let invocation = CommandBuilder::new(&settings).clean(Path::new("/work/App"));
        assert_eq!(invocation.to_string(), "titanium clean --project-dir /work/App");
    }

    struct SdkRunner(Value);

    impl ToolRunner for SdkRunner {
        fn run(&self, invocation: &Invocation) -> Result<ToolOutput, BuildError> {
            assert!(invocation.is_structured());
            Ok(ToolOutput {
                json: Some(self.0.clone()),
                ..ToolOutput::default()
            })
        }
    }

    #[test]
    fn test_probe_sdk_version() {
        let settings = Settings::default();
        let builder = CommandBuilder::new(&settings);
        let dir = Path::new("/work/App");
        assert_eq!(
            builder
                .probe_sdk_version(&SdkRunner(Value::String("12.2.0.GA".into())), dir)
                .unwrap(),
            "12.2.0.GA"
        );
        assert!(builder.probe_sdk_version(&SdkRunner(Value::Null), dir).is_err());
    }
}
