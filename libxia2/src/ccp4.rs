use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use super::driver::ProcessDriver;
use super::error::Ccp4Error;

/// Matches the closing status line of a CCP4 program, e.g. ` Scala:  ** Normal termination **`
const TERMINATION_PATTERN: &str = r"(?i)^\s*[a-z][\w\-]*:\s+\**\s*([^*]*termination[^*]*?)\s*\**\s*$";
static TERMINATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TERMINATION_PATTERN).expect("valid termination regex"));
const LIBRARY_SIGNAL: &str = "CCP4 library signal";
const NORMAL_TERMINATION: &str = "normal termination";

/// Ccp4Program adds the CCP4 conventions to a driver.
///
/// CCP4 programs take their reflection files as `hklin`/`hklout` command line keywords,
/// announce how they finished on a status line, and report library failures as
/// `CCP4 library signal` messages.
pub struct Ccp4Program {
    driver: Box<dyn ProcessDriver>,
    hklin: Option<PathBuf>,
    hklout: Option<PathBuf>,
}

impl Ccp4Program {
    pub fn new(mut driver: Box<dyn ProcessDriver>, executable: &Path) -> Self {
        driver.set_executable(executable);
        Self {
            driver,
            hklin: None,
            hklout: None,
        }
    }

    pub fn driver(&self) -> &dyn ProcessDriver {
        self.driver.as_ref()
    }

    pub fn driver_mut(&mut self) -> &mut dyn ProcessDriver {
        self.driver.as_mut()
    }

    pub fn set_hklin(&mut self, hklin: &Path) {
        self.hklin = Some(hklin.to_path_buf());
    }

    pub fn set_hklout(&mut self, hklout: &Path) {
        self.hklout = Some(hklout.to_path_buf());
    }

    pub fn hklin(&self) -> Option<&Path> {
        self.hklin.as_deref()
    }

    pub fn hklout(&self) -> Option<&Path> {
        self.hklout.as_deref()
    }

    pub fn check_hklin(&self) -> Result<&Path, Ccp4Error> {
        self.hklin.as_deref().ok_or(Ccp4Error::NoHklin)
    }

    pub fn check_hklout(&self) -> Result<&Path, Ccp4Error> {
        self.hklout.as_deref().ok_or(Ccp4Error::NoHklout)
    }

    /// Describe what this run of the program does, for the log
    pub fn set_task(&mut self, task: &str) {
        self.driver.set_task(task);
    }

    /// Name of the program for messages, i.e. the executable's file name
    pub fn program_name(&self) -> String {
        self.driver
            .core()
            .executable()
            .and_then(|exe| exe.file_name())
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Put the reflection files on the command line and start the program
    pub fn start(&mut self) -> Result<(), Ccp4Error> {
        if let Some(hklin) = &self.hklin {
            self.driver.add_command_line("hklin");
            self.driver.add_command_line(&hklin.to_string_lossy());
        }
        if let Some(hklout) = &self.hklout {
            self.driver.add_command_line("hklout");
            self.driver.add_command_line(&hklout.to_string_lossy());
        }
        self.driver.start()?;
        Ok(())
    }

    /// Get the status from the program's termination line, lower case.
    ///
    /// Only meaningful once the program has finished. None if no status line was printed.
    pub fn get_ccp4_status(&self) -> Option<String> {
        self.driver
            .all_output()
            .iter()
            .rev()
            .find_map(|line| TERMINATION_RE.captures(line))
            .map(|captures| captures[1].trim().to_lowercase())
    }

    /// Look through the output for CCP4 library failures and abnormal termination
    pub fn check_ccp4_errors(&self) -> Result<(), Ccp4Error> {
        for line in self.driver.all_output() {
            if let Some(position) = line.find(LIBRARY_SIGNAL) {
                let tail = &line[position + LIBRARY_SIGNAL.len()..];
                let signal = tail.trim_start_matches(':').trim();
                return Err(Ccp4Error::LibrarySignal {
                    program: self.program_name(),
                    signal: signal.to_string(),
                });
            }
        }

        match self.get_ccp4_status() {
            Some(status) if status != NORMAL_TERMINATION => Err(Ccp4Error::AbnormalTermination {
                program: self.program_name(),
                status,
            }),
            _ => Ok(()),
        }
    }
}

/// Remove a file if it is there; failures are not interesting to anyone
pub(crate) fn remove_quietly(path: &Path) {
    if path.exists() {
        match std::fs::remove_file(path) {
            Ok(()) => spdlog::debug!("Removed {}", path.display()),
            Err(e) => spdlog::debug!("Could not remove {}: {e}", path.display()),
        }
    }
}
