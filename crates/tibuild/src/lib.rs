//! # tibuild
//!
//! Interactive build launcher for Titanium mobile projects.
//!
//! ## Overview
//!
//! `tibuild` is the command-line host for [`tibuild_sdk`]. It handles:
//!
//! - **Resolving** - Walks you through platform, deployment target, device
//!   and signing choices
//! - **Building** - Runs the Titanium CLI with the resolved arguments
//! - **Replaying** - Remembers the last ten builds across invocations
//!
//! ## Quick Start
//!
//! ```bash
//! # Pick a configuration and build
//! tibuild run
//!
//! # Build the last configuration again
//! tibuild last
//!
//! # Pick one of the last ten builds
//! tibuild history
//!
//! # Clean the project
//! tibuild clean --project-dir ~/work/MyApp
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Resolve a build target interactively and build it |
//! | `clean` | Run `clean --project-dir D` |
//! | `last` | Replay the most recent build |
//! | `history` | Browse recent builds and replay one |
//! | `eligible` | Report whether an open path holds `tiapp.xml` |
//! | `current` | Print the most recent build target as JSON |
//!
//! ## Configuration
//!
//! Settings are read from `tibuild.toml` (see [`config`]). Signing secrets
//! can be put in `<project>/.env.local`:
//!
//! ```bash
//! TIBUILD_STORE_PASSWORD="..."
//! ```
//!
//! History is stored in `<data dir>/tibuild/history.json`.
//!
//! ## CLI Flags
//!
//! Global flags available on all commands:
//!
//! - **`--project-dir <DIR>`** - Open project directory (repeatable, defaults to the current directory)
//! - **`--config <FILE>`** - Use this config file instead of searching for `tibuild.toml`
//! - **`--verbose` / `-v`** - Enable debug diagnostics on stderr
//!
//! ## Modules
//!
//! - [`config`] - Configuration file support for `tibuild.toml`

#![cfg_attr(docsrs, feature(doc_cfg))]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

use tibuild_sdk::{
    BuildError, Execution, HistoryStore, LineClassifier, Orchestrator, ProcessRunner, Prompter,
    ScriptError, ToolRunner, find_project,
};

use config::TibuildConfig;
use terminal::TerminalPrompter;

pub mod config;
mod logging;
mod terminal;

/// Interactive build launcher for Titanium mobile projects.
#[derive(Parser, Debug)]
#[command(name = "tibuild", author, version, about = "Titanium build launcher", long_about = None)]
struct Cli {
    /// Open project directory; the first one containing tiapp.xml is built
    #[arg(long = "project-dir", global = true, value_name = "DIR")]
    project_dirs: Vec<PathBuf>,

    /// Path to tibuild.toml (skips discovery)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print debug diagnostics to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Pick platform, target, device and signing, then build.
    Run,
    /// Clean the project's build output.
    Clean,
    /// Build the most recent configuration again.
    Last,
    /// Pick one of the recent builds and run it again.
    History,
    /// Report whether an open path contains tiapp.xml.
    Eligible,
    /// Print the most recent build target as JSON.
    Current,
}

impl Command {
    fn records_history(self) -> bool {
        matches!(self, Command::Run | Command::Last | Command::History)
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let project_dirs = if cli.project_dirs.is_empty() {
        vec![env::current_dir().context("Failed to get current directory")?]
    } else {
        cli.project_dirs
    };
    let primary = find_project(&project_dirs).unwrap_or_else(|_| project_dirs[0].clone());
    load_dotenv(&primary);

    let (config, config_path) = TibuildConfig::resolve(cli.config.as_deref(), &primary)?;
    if let Some(path) = &config_path {
        debug!("using config {}", path.display());
    }
    let settings = config.into_settings();

    let history_path = history_path()?;
    let history = HistoryStore::load(&history_path)
        .with_context(|| format!("Failed to read history file: {:?}", history_path))?;

    let runner = ProcessRunner::new(LineClassifier::new(settings.informational.clone()));
    let mut orchestrator = Orchestrator::new(
        settings,
        project_dirs,
        TerminalPrompter::stdio(),
        runner,
        history,
    );

    let result = dispatch(&mut orchestrator, cli.command);
    let history = orchestrator.dispose();
    if cli.command.records_history() {
        history
            .save(&history_path)
            .with_context(|| format!("Failed to write history file: {:?}", history_path))?;
    }
    result
}

fn dispatch<P: Prompter, R: ToolRunner>(
    orchestrator: &mut Orchestrator<P, R>,
    command: Command,
) -> Result<()> {
    match command {
        Command::Run => report(orchestrator.run()),
        Command::Last => report(orchestrator.last()),
        Command::History => report(orchestrator.history()),
        Command::Clean => match orchestrator.clean() {
            Ok(_) => {
                println!("Project cleaned");
                Ok(())
            }
            Err(e) => handle_error(e),
        },
        Command::Eligible => {
            println!("{}", orchestrator.is_eligible());
            Ok(())
        }
        Command::Current => {
            match orchestrator.current_settings() {
                Some(target) => println!("{}", serde_json::to_string_pretty(target)?),
                None => println!("No build has run yet"),
            }
            Ok(())
        }
    }
}

fn report(result: Result<Option<Execution>, BuildError>) -> Result<()> {
    match result {
        Ok(Some(execution)) => {
            print_script_errors(&execution.output.script_errors);
            println!(
                "Finished {} for {}",
                execution.target.name,
                execution.target.project_name()
            );
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => handle_error(e),
    }
}

fn handle_error(err: BuildError) -> Result<()> {
    match err {
        BuildError::ProjectNotFound(_) => {
            eprintln!("Warning: {}", err);
            Ok(())
        }
        other => Err(other.into()),
    }
}

fn print_script_errors(errors: &[ScriptError]) {
    if errors.is_empty() {
        return;
    }
    println!("Script errors:");
    for error in errors {
        println!("  {}", error);
    }
}

fn load_dotenv(project_dir: &Path) {
    let path = project_dir.join(".env.local");
    let _ = dotenvy::from_path(path);
}

fn history_path() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir().context("Failed to locate the local data directory")?;
    Ok(data_dir.join("tibuild").join("history.json"))
}
