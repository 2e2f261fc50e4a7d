use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::error::ProjectError;
use super::sweep::SweepHandler;

/// Name of the project state file kept in the working directory
pub const PROJECT_FILE_NAME: &str = "xia2.json";

/// The record of a finished scaling run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaledData {
    pub hklout: PathBuf,
    pub scalepack: Option<PathBuf>,
    pub scales_file: Option<PathBuf>,
    pub status: String,
    pub log_file: PathBuf,
}

/// One crystal: its sweeps and, once scaled, the scaled output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crystal {
    pub name: String,
    pub sweeps: SweepHandler,
    #[serde(default)]
    pub scaled: Option<ScaledData>,
}

impl Crystal {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sweeps: SweepHandler::new(),
            scaled: None,
        }
    }
}

/// The persisted state of a processing project.
/// Projects are serializable and deserializable to JSON using serde and serde_json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub working_directory: PathBuf,
    pub crystals: BTreeMap<String, Crystal>,
}

impl Project {
    pub fn new(name: &str, working_directory: &Path) -> Self {
        Self {
            name: name.to_string(),
            working_directory: working_directory.to_path_buf(),
            crystals: BTreeMap::new(),
        }
    }

    /// Read a project from a JSON file
    pub fn read(path: &Path) -> Result<Self, ProjectError> {
        if !path.exists() {
            return Err(ProjectError::BadFilePath(path.to_path_buf()));
        }
        let json_str = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str::<Self>(&json_str)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), ProjectError> {
        let json_str = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json_str)?;
        Ok(())
    }

    pub fn add_crystal(&mut self, crystal: Crystal) {
        self.crystals.insert(crystal.name.clone(), crystal);
    }

    pub fn crystal(&self, name: &str) -> Result<&Crystal, ProjectError> {
        self.crystals
            .get(name)
            .ok_or_else(|| ProjectError::UnknownCrystal(name.to_string()))
    }

    pub fn crystal_mut(&mut self, name: &str) -> Result<&mut Crystal, ProjectError> {
        self.crystals
            .get_mut(name)
            .ok_or_else(|| ProjectError::UnknownCrystal(name.to_string()))
    }

    /// The crystal of a single crystal project
    pub fn single_crystal(&self) -> Result<&Crystal, ProjectError> {
        match self.crystals.len() {
            0 => Err(ProjectError::NoCrystals),
            1 => self.crystals.values().next().ok_or(ProjectError::NoCrystals),
            n => Err(ProjectError::MultipleCrystals(n)),
        }
    }

    /// Name of the requested crystal, or of the only crystal if none was requested
    pub fn select_crystal(&self, name: Option<&str>) -> Result<String, ProjectError> {
        match name {
            Some(name) => Ok(self.crystal(name)?.name.clone()),
            None => Ok(self.single_crystal()?.name.clone()),
        }
    }

    /// Directory holding the scaling results of a crystal
    pub fn scale_directory(&self, crystal: &str) -> PathBuf {
        self.working_directory.join(crystal).join("scale")
    }
}
