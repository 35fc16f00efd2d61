//! External process execution.
//!
//! Every call into the build tool, from the JSON probes to the build itself,
//! goes through a [`ToolRunner`]. [`ProcessRunner`] is the real implementation:
//!
//! - stdout is buffered (and echoed when the invocation streams)
//! - each stderr line is classified; informational lines are dropped, the first
//!   other line becomes the call's error while the rest is still drained
//! - structured invocations (`--output json`) have their stdout parsed
//!
//! No timeout is enforced; a hung tool blocks the caller.

use std::fmt;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::thread;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, error};

use crate::types::BuildError;

/// A single call of an external executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub executable: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Echo stdout lines as they arrive.
    pub stream: bool,
}

impl Invocation {
    pub fn new<I, S>(executable: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            executable: executable.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            stream: false,
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Whether the caller asked the tool for JSON output (`--output json`).
    pub fn is_structured(&self) -> bool {
        self.args
            .windows(2)
            .any(|pair| pair[0] == "--output" && pair[1] == "json")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.executable)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// What a successful call produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub stdout: String,
    /// Parsed stdout, for structured invocations.
    pub json: Option<Value>,
    /// Script errors reported on stdout.
    pub script_errors: Vec<ScriptError>,
}

/// Runs external tools.
pub trait ToolRunner {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, BuildError>;
}

/// How a stderr line is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Informational,
    Error,
}

/// Decides which stderr lines are errors.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    informational: Vec<String>,
}

impl LineClassifier {
    /// Lines starting with any of `prefixes` are informational.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            informational: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn classify(&self, line: &str) -> LineClass {
        if line.trim().is_empty()
            || self
                .informational
                .iter()
                .any(|prefix| line.starts_with(prefix.as_str()))
        {
            LineClass::Informational
        } else {
            LineClass::Error
        }
    }
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::new(["NOTICE:"])
    }
}

/// [`ToolRunner`] backed by `std::process`.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    classifier: LineClassifier,
}

impl ProcessRunner {
    pub fn new(classifier: LineClassifier) -> Self {
        Self { classifier }
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, BuildError> {
        let exe = invocation.executable.as_str();
        debug!(command = %invocation, cwd = ?invocation.cwd, "spawning");

        let mut cmd = Command::new(exe);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &invocation.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            BuildError::tool(
                exe,
                format!(
                    "failed to start: {}. Ensure the tool is installed and available on PATH",
                    e
                ),
            )
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BuildError::tool(exe, "stdout was not captured"))?;
        let stream = invocation.stream;
        let reader = thread::spawn(move || -> io::Result<(String, Vec<ScriptError>)> {
            let mut buffer = String::new();
            let mut script_errors = Vec::new();
            for_each_line(BufReader::new(stdout), |line| {
                if stream {
                    println!("{}", line);
                }
                if let Some(script_error) = parse_script_error(line) {
                    script_errors.push(script_error);
                }
                buffer.push_str(line);
                buffer.push('\n');
            })?;
            Ok((buffer, script_errors))
        });

        // First non-informational line wins; keep reading so the child never
        // blocks on a full pipe.
        let mut first_error: Option<String> = None;
        let drained = match child.stderr.take() {
            Some(stderr) => for_each_line(BufReader::new(stderr), |line| {
                match self.classifier.classify(line) {
                    LineClass::Informational => debug!(target: "tibuild::tool", "{}", line),
                    LineClass::Error => {
                        error!(target: "tibuild::tool", "{}", line);
                        first_error.get_or_insert_with(|| line.to_string());
                    }
                }
            }),
            None => Ok(()),
        };

        // Reap the child and the reader before reporting anything.
        let status = child.wait();
        let collected = reader
            .join()
            .map_err(|_| BuildError::tool(exe, "stdout reader panicked"))?;

        if let Some(message) = first_error {
            return Err(BuildError::tool(exe, message));
        }
        drained?;
        let status = status?;
        let (stdout, script_errors) = collected?;

        if let Some(message) = first_error {
            return Err(BuildError::tool(exe, message));
        }
        if !status.success() {
            return Err(BuildError::tool(
                exe,
                format!("`{}` exited with {}", invocation, status),
            ));
        }

        let json = if invocation.is_structured() {
            let value = serde_json::from_str(&stdout).map_err(|source| {
                BuildError::MalformedOutput {
                    command: invocation.to_string(),
                    source,
                }
            })?;
            Some(value)
        } else {
            None
        };

        Ok(ToolOutput {
            stdout,
            json,
            script_errors,
        })
    }
}

/// Calls `f` with each line of `reader`, without its line terminator.
///
/// Bytes that are not valid UTF-8 are replaced rather than ending the read.
fn for_each_line<R: BufRead>(mut reader: R, mut f: impl FnMut(&str)) -> io::Result<()> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        f(line.trim_end_matches(['\n', '\r']));
    }
}

/// A JavaScript error reported by the build tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub file: String,
    pub line: u32,
    pub column: Option<u32>,
    pub message: String,
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column {
            Some(column) => write!(f, "{}:{}:{}: {}", self.file, self.line, column, self.message),
            None => write!(f, "{}:{}: {}", self.file, self.line, self.message),
        }
    }
}

static SCRIPT_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Script Error at (?:file://)?([^:]+?):([0-9]+):(?:([0-9]+):)?"(.+)""#)
        .expect("script error pattern is valid")
});

/// Parses a `Script Error at file:line[:column]:"message"` line.
pub fn parse_script_error(line: &str) -> Option<ScriptError> {
    let caps = SCRIPT_ERROR.captures(line)?;
    Some(ScriptError {
        file: caps[1].to_string(),
        line: caps[2].parse().ok()?,
        column: caps.get(3).and_then(|c| c.as_str().parse().ok()),
        message: caps[4].to_string(),
    })
}
