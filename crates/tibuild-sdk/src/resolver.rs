//! Target resolution state machine.
//!
//! A flow walks from [`State::PlatformSelect`] to a finished [`BuildTarget`]:
//!
//! ```text
//! PlatformSelect → DeploymentSelect → [iOS: DeviceFamilySelect]
//!   → [iOS device: KeychainSelect → CertificateSelect]
//!   → [emulator/simulator: DeviceSelect] → CommandBuild
//! ```
//!
//! [`options`], [`auto_step`] and [`transition`] are pure functions of the
//! state and the [`FlowContext`]. [`Resolver`] drives them with a
//! [`Prompter`] and does the I/O: device discovery, the SDK probe, signing
//! lookup and the build-number bump. Every prompt happens before
//! `CommandBuild`, so a cancelled flow leaves the project untouched.

use std::path::Path;

use tracing::debug;

use crate::command::{AndroidSigning, BuildRequest, CommandBuilder, Selections};
use crate::prompt::{Prompter, SelectableItem};
use crate::provisioning::{
    AndroidInfo, IosInfo, KeychainChoice, choose_keychain, load_android_info, load_ios_info,
    resolve_signing_identity,
};
use crate::runner::ToolRunner;
use crate::types::{BuildError, BuildTarget, DeploymentTarget, DeviceFamily, Platform, Settings};

/// Label of the pseudo-platform replaying the last build.
pub const RECENT_LABEL: &str = "most recent configuration";
/// Label of the pseudo-platform cleaning the project.
pub const CLEAN_LABEL: &str = "clean";

/// Choices accumulated since the platform was picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub platform: Platform,
    pub target: Option<DeploymentTarget>,
    pub selections: Selections,
}

impl Draft {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            target: None,
            selections: Selections::default(),
        }
    }

    fn with_target(mut self, target: DeploymentTarget) -> Self {
        self.target = Some(target);
        self
    }
}

/// Where a flow is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    PlatformSelect,
    DeploymentSelect(Draft),
    DeviceFamilySelect(Draft),
    KeychainSelect(Draft),
    CertificateSelect(Draft),
    DeviceSelect(Draft),
    CommandBuild(Draft),
}

/// How a flow ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A target ready to execute.
    Done(BuildTarget),
    /// Replay the head of history.
    ReplayLast,
    /// Clean the project.
    Clean,
    Cancelled,
}

/// Result of one state's step.
#[derive(Debug)]
pub enum Step {
    Continue(State),
    Finish(Outcome),
    Cancelled,
    Failed(BuildError),
}

/// Data shared by the states of one flow.
///
/// Tool answers are cached here so each query runs at most once per flow.
#[derive(Debug, Clone, Default)]
pub struct FlowContext {
    /// Offer [`RECENT_LABEL`] in the platform menu.
    pub offer_recent: bool,
    /// Platform and target of the last build, marked active in menus.
    pub last: Option<(Platform, Option<DeploymentTarget>)>,
    pub default_keychain: Option<String>,
    pub ios: Option<IosInfo>,
    pub android: Option<AndroidInfo>,
}

impl FlowContext {
    pub fn new(offer_recent: bool, last: Option<&BuildTarget>, default_keychain: Option<String>) -> Self {
        Self {
            offer_recent,
            last: last.map(|t| (t.platform, t.deployment)),
            default_keychain,
            ios: None,
            android: None,
        }
    }
}

/// Items offered in `state`.
pub fn options(state: &State, ctx: &FlowContext) -> Vec<SelectableItem> {
    match state {
        State::PlatformSelect => {
            let mut items = Vec::new();
            if ctx.offer_recent {
                items.push(SelectableItem::plain(RECENT_LABEL));
            }
            items.extend(Platform::ALL.iter().map(|p| SelectableItem::plain(p.as_str())));
            items.push(SelectableItem::plain(CLEAN_LABEL));
            items
        }
        State::DeploymentSelect(draft) => draft
            .platform
            .deployment_targets()
            .iter()
            .map(|t| SelectableItem::plain(t.as_str()))
            .collect(),
        State::DeviceFamilySelect(_) => DeviceFamily::ALL
            .iter()
            .map(|f| SelectableItem::plain(f.as_str()))
            .collect(),
        State::KeychainSelect(_) => ctx
            .ios
            .as_ref()
            .map(|info| info.keychain_names().into_iter().map(SelectableItem::Plain).collect())
            .unwrap_or_default(),
        State::CertificateSelect(draft) => certificate_names(draft, ctx)
            .into_iter()
            .map(SelectableItem::Plain)
            .collect(),
        State::DeviceSelect(draft) => match draft.platform {
            Platform::Ios => ctx
                .ios
                .iter()
                .flat_map(|info| info.simulators.iter().enumerate())
                .map(|(i, sim)| {
                    SelectableItem::detailed(
                        sim.name.clone(),
                        format!("iOS {} ({})", sim.os_version, sim.identifier),
                        i,
                    )
                })
                .collect(),
            _ => ctx
                .android
                .iter()
                .flat_map(|info| info.devices.iter().enumerate())
                .map(|(i, device)| SelectableItem::detailed(device.name(), device.detail(), i))
                .collect(),
        },
        State::CommandBuild(_) => Vec::new(),
    }
}

fn certificate_names(draft: &Draft, ctx: &FlowContext) -> Vec<String> {
    let (Some(info), Some(keychain), Some(target)) = (
        ctx.ios.as_ref(),
        draft.selections.keychain.as_deref(),
        draft.target,
    ) else {
        return Vec::new();
    };
    info.keychains
        .get(keychain)
        .map(|k| k.certificates_for(target).iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

/// Label to mark as active in `state`.
pub fn active(state: &State, ctx: &FlowContext) -> Option<String> {
    let (platform, target) = ctx.last?;
    match state {
        State::PlatformSelect => Some(platform.as_str().to_string()),
        State::DeploymentSelect(draft) if draft.platform == platform => {
            target.map(|t| t.as_str().to_string())
        }
        _ => None,
    }
}

/// Steps that need no prompt.
///
/// Applies the keychain policy and skips the certificate prompt when the
/// chosen keychain has no matching certificate.
pub fn auto_step(state: &State, ctx: &FlowContext) -> Option<Step> {
    match state {
        State::KeychainSelect(draft) => {
            let info = ctx.ios.as_ref()?;
            match choose_keychain(info, ctx.default_keychain.as_deref()) {
                KeychainChoice::Resolved(keychain) => {
                    let mut next = draft.clone();
                    next.selections.keychain = Some(keychain);
                    Some(Step::Continue(State::CertificateSelect(next)))
                }
                KeychainChoice::Unavailable => {
                    debug!("no keychain with certificates; skipping certificate selection");
                    Some(Step::Continue(State::CommandBuild(draft.clone())))
                }
                KeychainChoice::Prompt(_) => None,
            }
        }
        State::CertificateSelect(draft) if certificate_names(draft, ctx).is_empty() => {
            Some(Step::Continue(State::CommandBuild(draft.clone())))
        }
        _ => None,
    }
}

/// Next step after `item` was picked in `state`.
pub fn transition(state: State, item: &SelectableItem, ctx: &FlowContext) -> Step {
    let label = item.label();
    match state {
        State::PlatformSelect => match label {
            RECENT_LABEL => Step::Finish(Outcome::ReplayLast),
            CLEAN_LABEL => Step::Finish(Outcome::Clean),
            _ => match label.parse::<Platform>() {
                Ok(Platform::MobileWeb) => {
                    Step::Continue(State::CommandBuild(Draft::new(Platform::MobileWeb)))
                }
                Ok(platform) => Step::Continue(State::DeploymentSelect(Draft::new(platform))),
                Err(e) => Step::Failed(e),
            },
        },
        State::DeploymentSelect(draft) => {
            let Some(target) = DeploymentTarget::from_label(label)
                .filter(|t| draft.platform.deployment_targets().contains(t))
            else {
                return unexpected(label);
            };
            let draft = draft.with_target(target);
            let next = match (draft.platform, target) {
                (_, t) if t.is_auto() => State::CommandBuild(draft),
                (Platform::Android, DeploymentTarget::Emulator)
                | (Platform::Ios, DeploymentTarget::Simulator) => State::DeviceSelect(draft),
                (Platform::Ios, _) => State::DeviceFamilySelect(draft),
                _ => State::CommandBuild(draft),
            };
            Step::Continue(next)
        }
        State::DeviceFamilySelect(mut draft) => {
            let Some(family) = DeviceFamily::from_label(label) else {
                return unexpected(label);
            };
            draft.selections.family = Some(family);
            if draft.target == Some(DeploymentTarget::Device) {
                Step::Continue(State::KeychainSelect(draft))
            } else {
                Step::Continue(State::CommandBuild(draft))
            }
        }
        State::KeychainSelect(mut draft) => {
            draft.selections.keychain = Some(label.to_string());
            Step::Continue(State::CertificateSelect(draft))
        }
        State::CertificateSelect(mut draft) => {
            draft.selections.certificate = Some(label.to_string());
            Step::Continue(State::CommandBuild(draft))
        }
        State::DeviceSelect(mut draft) => {
            let Some(index) = item.index() else {
                return unexpected(label);
            };
            let found = match draft.platform {
                Platform::Ios => ctx
                    .ios
                    .as_ref()
                    .and_then(|info| info.simulators.get(index))
                    .map(|sim| draft.selections.simulator = Some(sim.clone())),
                _ => ctx
                    .android
                    .as_ref()
                    .and_then(|info| info.devices.get(index))
                    .map(|device| draft.selections.android_device = Some(device.clone())),
            };
            match found {
                Some(()) => Step::Continue(State::CommandBuild(draft)),
                None => unexpected(label),
            }
        }
        State::CommandBuild(draft) => Step::Continue(State::CommandBuild(draft)),
    }
}

fn unexpected(label: &str) -> Step {
    Step::Failed(BuildError::Config(format!("unexpected selection '{}'", label)))
}

/// Drives a flow with a prompter and a tool runner.
pub struct Resolver<'a> {
    settings: &'a Settings,
    project_dir: &'a Path,
    prompter: &'a mut dyn Prompter,
    runner: &'a dyn ToolRunner,
}

impl<'a> Resolver<'a> {
    pub fn new(
        settings: &'a Settings,
        project_dir: &'a Path,
        prompter: &'a mut dyn Prompter,
        runner: &'a dyn ToolRunner,
    ) -> Self {
        Self {
            settings,
            project_dir,
            prompter,
            runner,
        }
    }

    /// Runs a flow from [`State::PlatformSelect`].
    pub fn resolve(&mut self, mut ctx: FlowContext) -> Result<Outcome, BuildError> {
        let mut state = State::PlatformSelect;
        loop {
            let step = match state {
                State::CommandBuild(draft) => self.build(&draft),
                other => {
                    self.discover(&other, &mut ctx)?;
                    match auto_step(&other, &ctx) {
                        Some(step) => step,
                        None => {
                            let items = options(&other, &ctx);
                            let active = active(&other, &ctx);
                            match self.prompter.present(items, active.as_deref())? {
                                Some(item) => transition(other, &item, &ctx),
                                None => Step::Cancelled,
                            }
                        }
                    }
                }
            };

            match step {
                Step::Continue(next) => state = next,
                Step::Finish(outcome) => return Ok(outcome),
                Step::Cancelled => {
                    debug!("selection cancelled");
                    return Ok(Outcome::Cancelled);
                }
                Step::Failed(e) => return Err(e),
            }
        }
    }

    /// Loads the tool answers `state` needs, once per flow.
    fn discover(&mut self, state: &State, ctx: &mut FlowContext) -> Result<(), BuildError> {
        let executable = self.settings.executable.as_str();
        match state {
            State::KeychainSelect(draft) | State::DeviceSelect(draft)
                if draft.platform == Platform::Ios && ctx.ios.is_none() =>
            {
                let target = draft.target.unwrap_or(DeploymentTarget::Device);
                self.prompter.set_loading("Loading iOS certificates and simulators...");
                ctx.ios = Some(load_ios_info(self.runner, executable, target)?);
            }
            State::DeviceSelect(draft)
                if draft.platform == Platform::Android && ctx.android.is_none() =>
            {
                self.prompter.set_loading("Loading Android devices...");
                ctx.android = Some(load_android_info(self.runner, executable)?);
            }
            _ => {}
        }
        Ok(())
    }

    /// Probes the SDK, gathers signing material and assembles the target.
    fn build(&mut self, draft: &Draft) -> Step {
        match self.assemble(draft) {
            Ok(target) => Step::Finish(Outcome::Done(target)),
            Err(e) => Step::Failed(e),
        }
    }

    fn assemble(&mut self, draft: &Draft) -> Result<BuildTarget, BuildError> {
        let builder = CommandBuilder::new(self.settings);
        let sdk_version = builder.probe_sdk_version(self.runner, self.project_dir)?;

        let mut request = BuildRequest::new(draft.platform, draft.target, self.project_dir, sdk_version);
        request.selections = draft.selections.clone();

        match (draft.platform, draft.target) {
            (Platform::Ios, Some(target)) if !target.is_virtual() => {
                let provisioning_dir = self.settings.provisioning_dir();
                request.signing =
                    resolve_signing_identity(self.project_dir, target, provisioning_dir.as_deref());
            }
            (Platform::Android, Some(DeploymentTarget::DistPlaystore)) => {
                request.android_signing = AndroidSigning::resolve(self.project_dir);
            }
            _ => {}
        }

        builder.assemble(&request)
    }
}
