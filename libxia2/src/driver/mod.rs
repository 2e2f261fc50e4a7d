//! Process driving for external programs.
//!
//! A driver represents a single invocation of an external program. It is configured
//! (executable, command line, working directory, environment), started, fed a script on
//! standard input, drained of its combined standard output/error, and finally inspected
//! for well known failure messages. Program specific adapters (see [`crate::wrappers`])
//! own a boxed [`ProcessDriver`] and never depend on how the process is actually run.
//!
//! Two implementations are provided:
//!
//! - [`SimpleDriver`]: talks to the child through pipes while it runs
//! - [`ScriptDriver`]: writes the input to a file and runs the program in batch when the
//! input is closed
//!
//! Failure detection works by searching the captured text for known phrases. If a program
//! changes the wording of its messages between versions, the failure will go unnoticed.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use time::OffsetDateTime;

use super::error::DriverError;

#[cfg(test)]
pub mod mock;
pub mod script;
pub mod simple;

pub use script::ScriptDriver;
pub use simple::SimpleDriver;

/// Separator used when prepending to list-like environment variables (PATH etc.)
#[cfg(target_family = "windows")]
const PATH_SEPARATOR: &str = ";";
#[cfg(not(target_family = "windows"))]
const PATH_SEPARATOR: &str = ":";

/// Phrases which indicate that a program died, paired with the condition reported
const KNOWN_FAILURES: [(&str, &str); 7] = [
    ("Segmentation fault", "segmentation fault"),
    ("Bus error", "bus error"),
    ("Illegal instruction", "illegal instruction"),
    ("Floating point exception", "floating point exception"),
    ("Floating exception", "floating point exception"),
    ("forrtl: severe", "Fortran runtime error"),
    ("Killed", "killed"),
];

/// The flavor of driver used to run external programs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverType {
    #[default]
    Simple,
    Script,
}

/// Create a driver of the requested type
pub fn create_driver(driver_type: DriverType) -> Box<dyn ProcessDriver> {
    match driver_type {
        DriverType::Simple => Box::new(SimpleDriver::new()),
        DriverType::Script => Box::new(ScriptDriver::new()),
    }
}

/// Wall clock times of the process
#[derive(Debug, Clone, Default)]
pub struct RuntimeLog {
    pub process_start: Option<OffsetDateTime>,
    pub process_end: Option<OffsetDateTime>,
}

impl RuntimeLog {
    /// Elapsed time of the process, if it has both started and finished
    pub fn elapsed(&self) -> Option<time::Duration> {
        match (self.process_start, self.process_end) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// The configuration and records shared by every driver implementation
#[derive(Debug, Clone)]
pub struct DriverCore {
    executable: Option<PathBuf>,
    command_line: Vec<String>,
    working_directory: PathBuf,
    working_environment: BTreeMap<String, Vec<String>>,
    working_environment_exclusive: BTreeSet<String>,
    input_records: Vec<String>,
    output_records: Vec<String>,
    task: Option<String>,
    runtime: RuntimeLog,
}

impl Default for DriverCore {
    fn default() -> Self {
        Self {
            executable: None,
            command_line: Vec::new(),
            working_directory: PathBuf::from("."),
            working_environment: BTreeMap::new(),
            working_environment_exclusive: BTreeSet::new(),
            input_records: Vec::new(),
            output_records: Vec::new(),
            task: None,
            runtime: RuntimeLog::default(),
        }
    }
}

impl DriverCore {
    pub fn executable(&self) -> Option<&Path> {
        self.executable.as_deref()
    }

    /// Name of the executable for messages; "<unset>" before one is given
    pub fn executable_name(&self) -> String {
        match &self.executable {
            Some(exe) => exe.to_string_lossy().to_string(),
            None => String::from("<unset>"),
        }
    }

    pub fn command_line(&self) -> &[String] {
        &self.command_line
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    pub fn runtime(&self) -> &RuntimeLog {
        &self.runtime
    }

    pub fn input_records(&self) -> &[String] {
        &self.input_records
    }

    pub fn output_records(&self) -> &[String] {
        &self.output_records
    }

    /// Build the full environment of the child from a copy of the parent's.
    ///
    /// Additive variables are prepended to any inherited value using the platform path
    /// separator; exclusive variables replace the inherited value outright.
    pub fn child_environment<I>(&self, parent: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut environment: BTreeMap<String, String> = parent.into_iter().collect();
        for (name, values) in self.working_environment.iter() {
            let added = values.join(PATH_SEPARATOR);
            let value = match environment.get(name) {
                Some(inherited) if !self.working_environment_exclusive.contains(name) => {
                    format!("{added}{PATH_SEPARATOR}{inherited}")
                }
                _ => added,
            };
            environment.insert(name.clone(), value);
        }
        environment
    }

    /// Assemble the Command for this invocation. Stdio is left to the caller.
    fn make_command(&self) -> Result<Command, DriverError> {
        let executable = self.executable.as_ref().ok_or(DriverError::NoExecutable)?;
        let parent = std::env::vars_os().map(|(name, value)| {
            (
                name.to_string_lossy().to_string(),
                value.to_string_lossy().to_string(),
            )
        });
        let mut command = Command::new(executable);
        command
            .args(&self.command_line)
            .current_dir(&self.working_directory)
            .env_clear()
            .envs(self.child_environment(parent));
        Ok(command)
    }

    fn record_output(&mut self, line: &str) {
        self.output_records
            .push(line.trim_end_matches(['\n', '\r']).to_string());
    }

    /// Scan the captured output for phrases which mean the program died
    pub fn check_for_errors(&self) -> Result<(), DriverError> {
        for line in self.output_records.iter() {
            for (phrase, condition) in KNOWN_FAILURES {
                if line.contains(phrase) {
                    return Err(DriverError::KnownFailure {
                        executable: self.executable_name(),
                        condition,
                    });
                }
            }
        }
        Ok(())
    }
}

/// The process execution interface consumed by the program adapters.
///
/// Implementors provide the lifecycle (start, input, output, close, status, kill); the
/// configuration and bookkeeping is shared through [`DriverCore`].
pub trait ProcessDriver {
    fn core(&self) -> &DriverCore;

    fn core_mut(&mut self) -> &mut DriverCore;

    /// Launch the program. Fails if no executable has been set.
    fn start(&mut self) -> Result<(), DriverError>;

    /// Send one line of input to the program
    fn input(&mut self, record: &str) -> Result<(), DriverError>;

    /// Read one line of output (including the newline). Returns an empty string once the
    /// program has closed its output and terminated.
    fn output(&mut self) -> Result<String, DriverError>;

    /// Close the input to the program
    fn close(&mut self) -> Result<(), DriverError>;

    /// The exit status of the program, None while it is still running (or never ran)
    fn status(&mut self) -> Option<i32>;

    /// Forcibly terminate the program
    fn kill(&mut self) -> Result<(), DriverError>;

    fn set_executable(&mut self, executable: &Path) {
        self.core_mut().executable = Some(executable.to_path_buf());
    }

    fn add_command_line(&mut self, token: &str) {
        self.core_mut().command_line.push(token.to_string());
    }

    fn set_working_directory(&mut self, directory: &Path) {
        self.core_mut().working_directory = directory.to_path_buf();
    }

    /// Add a value to a variable of the child environment, ahead of any inherited value
    fn add_working_environment(&mut self, name: &str, value: &str) {
        self.core_mut()
            .working_environment
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }

    /// Set a variable of the child environment, replacing any inherited value
    fn set_working_environment_exclusive(&mut self, name: &str, value: &str) {
        let core = self.core_mut();
        core.working_environment
            .insert(name.to_string(), vec![value.to_string()]);
        core.working_environment_exclusive.insert(name.to_string());
    }

    fn set_task(&mut self, task: &str) {
        self.core_mut().task = Some(task.to_string());
    }

    /// Close the input and read all of the output until the program finishes
    fn close_wait(&mut self) -> Result<(), DriverError> {
        self.close()?;
        while !self.output()?.is_empty() {}
        Ok(())
    }

    fn check_for_errors(&self) -> Result<(), DriverError> {
        self.core().check_for_errors()
    }

    fn all_output(&self) -> &[String] {
        self.core().output_records()
    }

    /// Write the task, command line, input script and captured output to a log file
    fn write_log_file(&self, path: &Path) -> Result<(), DriverError> {
        let core = self.core();
        let mut file = File::create(path)?;
        if let Some(task) = core.task() {
            writeln!(file, "Task: {task}")?;
        }
        writeln!(
            file,
            "Command line: {} {}",
            core.executable_name(),
            core.command_line().join(" ")
        )?;
        for record in core.input_records() {
            writeln!(file, "> {record}")?;
        }
        for record in core.output_records() {
            writeln!(file, "{record}")?;
        }
        Ok(())
    }
}
