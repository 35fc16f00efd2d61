//! Entry points exposed to the host.
//!
//! An [`Orchestrator`] owns the settings, the open project paths and the
//! build history for its lifetime. The host creates one, calls operations on
//! it and takes the history back with [`Orchestrator::dispose`].

use std::path::PathBuf;

use tracing::{debug, info};

use crate::command::CommandBuilder;
use crate::descriptor::{find_project, is_project};
use crate::history::HistoryStore;
use crate::prompt::Prompter;
use crate::resolver::{FlowContext, Outcome, Resolver};
use crate::runner::{Invocation, ToolOutput, ToolRunner};
use crate::types::{BuildError, BuildTarget, Settings};

/// An executed build.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub target: BuildTarget,
    pub output: ToolOutput,
}

/// Owns one host session's state and runs its operations.
///
/// # Example
///
/// ```ignore
/// use tibuild_sdk::{HistoryStore, Orchestrator, ProcessRunner, Settings};
///
/// let mut orchestrator = Orchestrator::new(
///     Settings::default(),
///     vec![std::env::current_dir()?],
///     prompter,
///     ProcessRunner::default(),
///     HistoryStore::new(),
/// );
/// if let Some(execution) = orchestrator.run()? {
///     println!("built {}", execution.target.name);
/// }
/// let history = orchestrator.dispose();
/// ```
pub struct Orchestrator<P, R> {
    settings: Settings,
    project_paths: Vec<PathBuf>,
    prompter: P,
    runner: R,
    history: HistoryStore,
    current: Option<BuildTarget>,
}

impl<P: Prompter, R: ToolRunner> Orchestrator<P, R> {
    pub fn new(
        settings: Settings,
        project_paths: Vec<PathBuf>,
        prompter: P,
        runner: R,
        history: HistoryStore,
    ) -> Self {
        Self {
            settings,
            project_paths,
            prompter,
            runner,
            history,
            current: None,
        }
    }

    /// Ends the session, handing the history back for persistence.
    pub fn dispose(mut self) -> HistoryStore {
        self.prompter.hide();
        self.history
    }

    /// Whether any open path contains `tiapp.xml`.
    pub fn is_eligible(&self) -> bool {
        self.project_paths.iter().any(|p| is_project(p))
    }

    /// The most recently executed target, else the head of history.
    pub fn current_settings(&self) -> Option<&BuildTarget> {
        self.current.as_ref().or_else(|| self.history.head())
    }

    /// Resolves a target interactively and builds it.
    ///
    /// Returns `Ok(None)` when the flow was cancelled or ended in a clean.
    pub fn run(&mut self) -> Result<Option<Execution>, BuildError> {
        let project_dir = find_project(&self.project_paths)?;
        let ctx = FlowContext::new(
            !self.history.is_empty() && self.project_paths.len() == 1,
            self.current_settings(),
            self.settings.default_keychain.clone(),
        );

        let outcome = Resolver::new(
            &self.settings,
            &project_dir,
            &mut self.prompter,
            &self.runner,
        )
        .resolve(ctx);
        self.prompter.hide();

        match outcome? {
            Outcome::Done(target) => {
                self.history.push(target.clone());
                self.execute(target).map(Some)
            }
            Outcome::ReplayLast => self.last(),
            Outcome::Clean => {
                self.clean()?;
                Ok(None)
            }
            Outcome::Cancelled => Ok(None),
        }
    }

    /// Runs `clean --project-dir D`. Not recorded in history.
    pub fn clean(&mut self) -> Result<ToolOutput, BuildError> {
        let project_dir = find_project(&self.project_paths)?;
        let invocation = CommandBuilder::new(&self.settings).clean(&project_dir);
        info!("cleaning {}", project_dir.display());
        self.runner.run(&invocation)
    }

    /// Replays the head of history, or runs a new flow when it is empty.
    pub fn last(&mut self) -> Result<Option<Execution>, BuildError> {
        match self.history.head().cloned() {
            Some(target) => self.execute(target).map(Some),
            None => {
                debug!("history is empty; starting a new flow");
                self.run()
            }
        }
    }

    /// Lets the user pick a past build and replays it, moving it to the front.
    pub fn history(&mut self) -> Result<Option<Execution>, BuildError> {
        if self.history.is_empty() {
            debug!("history is empty; starting a new flow");
            return self.run();
        }

        let active = self.current_settings().map(|t| format!("{} / {}", t.project_name(), t.name));
        let picked = self.prompter.present(self.history.browse(), active.as_deref());
        self.prompter.hide();

        let Some(index) = picked?.and_then(|item| item.index()) else {
            return Ok(None);
        };
        match self.history.promote(index).cloned() {
            Some(target) => self.execute(target).map(Some),
            None => Ok(None),
        }
    }

    fn execute(&mut self, target: BuildTarget) -> Result<Execution, BuildError> {
        info!(id = %target.command_name, "running {}", target.command_line());
        let invocation = Invocation::new(target.executable.clone(), target.args.clone())
            .cwd(target.cwd.clone())
            .streaming(true);
        self.current = Some(target.clone());
        let output = self.runner.run(&invocation)?;
        Ok(Execution { target, output })
    }
}
