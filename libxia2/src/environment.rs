//! The operating environment of a run: required installation variables, working
//! directories and the scratch space handed to the CCP4 programs.
//!
//! Nothing here changes the environment of the running process. Values meant for the
//! programs (`CCP4_SCR`, `USER`) are applied to each driver as child scope overrides.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use super::driver::ProcessDriver;
use super::error::EnvironmentError;

/// Variables which must be defined (and clean) for xia2 to run
pub const REQUIRED_VARIABLES: [&str; 3] = ["XIA2_ROOT", "XIA2CORE_ROOT", "CCP4"];
const DEFAULT_USER: &str = "xia2";

#[derive(Debug)]
pub struct Environment {
    variables: BTreeMap<String, String>,
    base_directory: PathBuf,
    scratch: Option<TempDir>,
}

impl Environment {
    /// Capture the environment of this process, with the current directory as the base
    pub fn from_process() -> Result<Self, EnvironmentError> {
        let variables = std::env::vars_os().map(|(name, value)| {
            (
                name.to_string_lossy().to_string(),
                value.to_string_lossy().to_string(),
            )
        });
        Ok(Self::new(variables, &std::env::current_dir()?))
    }

    pub fn new<I>(variables: I, base_directory: &Path) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            variables: variables.into_iter().collect(),
            base_directory: base_directory.to_path_buf(),
            scratch: None,
        }
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Check that every required variable is defined and has no stray whitespace
    pub fn validate(&self) -> Result<(), EnvironmentError> {
        for name in REQUIRED_VARIABLES {
            let value = self
                .get(name)
                .ok_or_else(|| EnvironmentError::Missing(name.to_string()))?;
            if value.trim() != value {
                return Err(EnvironmentError::Whitespace(name.to_string()));
            }
        }
        Ok(())
    }

    /// USER, falling back to USERNAME and then to a fixed name
    pub fn user(&self) -> String {
        self.get("USER")
            .or_else(|| self.get("USERNAME"))
            .unwrap_or(DEFAULT_USER)
            .to_string()
    }

    /// The scratch directory for this run, created on first use and removed on drop
    pub fn scratch_directory(&mut self) -> Result<&Path, EnvironmentError> {
        if self.scratch.is_none() {
            let scratch = tempfile::Builder::new().prefix("xia2-").tempdir()?;
            spdlog::debug!("Created CCP4_SCR: {}", scratch.path().display());
            self.scratch = Some(scratch);
        }
        match &self.scratch {
            Some(scratch) => Ok(scratch.path()),
            None => Err(EnvironmentError::Missing(String::from("CCP4_SCR"))),
        }
    }

    /// Create (if needed) a working directory below the base directory. An absolute first
    /// component replaces the base.
    pub fn generate_directory<P: AsRef<Path>>(
        &self,
        components: &[P],
    ) -> Result<PathBuf, EnvironmentError> {
        let mut path = self.base_directory.clone();
        for component in components {
            path.push(component);
        }
        if path.exists() {
            spdlog::debug!("Directory exists: {}", path.display());
        } else {
            spdlog::debug!("Making directory: {}", path.display());
            std::fs::create_dir_all(&path)?;
        }
        Ok(path)
    }

    /// Give a driver the scratch directory and user name
    pub fn apply_to(&mut self, driver: &mut dyn ProcessDriver) -> Result<(), EnvironmentError> {
        let user = self.user();
        let scratch = self.scratch_directory()?.to_string_lossy().to_string();
        driver.set_working_environment_exclusive("CCP4_SCR", &scratch);
        driver.set_working_environment_exclusive("USER", &user);
        Ok(())
    }
}
