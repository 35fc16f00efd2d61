//! Titanium build SDK for Rust
//!
//! `tibuild-sdk` turns a user's platform and configuration choices into a
//! fully specified invocation of the Titanium CLI, runs it, and remembers
//! recent invocations for replay.
//!
//! # Quick Start
//!
//! ```ignore
//! use tibuild_sdk::{HistoryStore, Orchestrator, ProcessRunner, Settings};
//!
//! fn main() -> Result<(), tibuild_sdk::BuildError> {
//!     let mut orchestrator = Orchestrator::new(
//!         Settings::default(),
//!         vec![std::env::current_dir()?],
//!         my_prompter,
//!         ProcessRunner::default(),
//!         HistoryStore::new(),
//!     );
//!
//!     // Pick platform, target, device and signing, then build
//!     orchestrator.run()?;
//!
//!     // Build the same thing again
//!     orchestrator.last()?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The SDK consists of several components:
//!
//! - **Prompt**: The [`Prompter`] capability and a list-widget model
//! - **Runner**: Spawns the build tool and classifies its stderr
//! - **Resolver**: The selection state machine
//! - **Provisioning**: Keychains, profiles, simulators and emulators
//! - **Command**: Deterministic argument assembly and build-number bumps
//! - **History**: The ten most recent build targets
//! - **Orchestrator**: Host-facing operations over all of the above

// Public modules
pub mod command;
pub mod descriptor;
pub mod history;
pub mod orchestrator;
pub mod project_settings;
pub mod prompt;
pub mod provisioning;
pub mod resolver;
pub mod runner;
pub mod types;

// Re-export key types for convenience
pub use command::{BuildRequest, CommandBuilder, STORE_PASSWORD_ENV};
pub use descriptor::{find_project, is_project};
pub use history::{HISTORY_LIMIT, HistoryStore};
pub use orchestrator::{Execution, Orchestrator};
pub use prompt::{Prompter, SelectList, SelectableItem};
pub use resolver::{Outcome, Resolver};
pub use runner::{Invocation, LineClassifier, ProcessRunner, ScriptError, ToolOutput, ToolRunner};
pub use types::{
    BuildError, BuildTarget, DeploymentTarget, DeviceFamily, PROJECT_MARKER, Platform, Settings,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
