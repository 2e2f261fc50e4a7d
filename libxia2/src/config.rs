use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::driver::DriverType;
use super::error::ConfigError;
use super::flags::Flags;
use super::project::PROJECT_FILE_NAME;
use super::wrappers::{ScalingMode, SdCorrection};

/// Executables of the external programs. Bare names are looked up on the PATH, with
/// `$CCP4/bin` searched first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Programs {
    pub scala: PathBuf,
    pub sortmtz: PathBuf,
}

impl Default for Programs {
    fn default() -> Self {
        Self {
            scala: PathBuf::from("scala"),
            sortmtz: PathBuf::from("sortmtz"),
        }
    }
}

/// Parameters handed to the scaler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingParameters {
    pub mode: ScalingMode,
    pub spacing: Option<f64>,
    pub secondary: Option<f64>,
    pub bfactor: bool,
    pub brotation: Option<f64>,
    pub tails: bool,
    pub anomalous: bool,
    pub resolution: Option<f64>,
    pub cycles: u32,
    pub sd_corrections: Vec<SdCorrection>,
}

impl Default for ScalingParameters {
    fn default() -> Self {
        Self {
            mode: ScalingMode::Rotation,
            spacing: None,
            secondary: None,
            bfactor: true,
            brotation: None,
            tails: true,
            anomalous: false,
            resolution: None,
            cycles: 20,
            sd_corrections: Vec::new(),
        }
    }
}

/// Structure representing the application configuration.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub project_file: PathBuf,
    /// The crystal to scale; may be left out for single crystal projects
    pub crystal: Option<String>,
    /// Reflections to scale. If not given the integrated reflections of the sweeps are
    /// sorted together.
    pub hklin: Option<PathBuf>,
    pub scalepack: Option<PathBuf>,
    pub driver_type: DriverType,
    #[serde(default)]
    pub programs: Programs,
    #[serde(default)]
    pub scaling: ScalingParameters,
    #[serde(default)]
    pub flags: Flags,
}

impl Default for Config {
    /// Generate a new Config object for a project in the current directory
    fn default() -> Self {
        Self {
            project_file: PathBuf::from(PROJECT_FILE_NAME),
            crystal: None,
            hklin: None,
            scalepack: None,
            driver_type: DriverType::Simple,
            programs: Programs::default(),
            scaling: ScalingParameters::default(),
            flags: Flags::default(),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write a config to a YAML file, e.g. the default as a template
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrappers::ReflectionClass;

    #[test]
    fn test_template_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        Config::default().write_config_file(&path).unwrap();
        assert_eq!(Config::read_config_file(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_read_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "project_file: /data/lysozyme/xia2.json
crystal: XTAL1
hklin: null
scalepack: null
driver_type: script
scaling:
  mode: batch
  anomalous: true
  sd_corrections:
    - class: full
      sdfac: 1.3
      sdadd: 0.02
flags:
  fiddle_sd: true
  parallel: 8
",
        )
        .unwrap();
        let config = Config::read_config_file(&path).unwrap();
        assert_eq!(config.crystal.as_deref(), Some("XTAL1"));
        assert_eq!(config.driver_type, DriverType::Script);
        assert_eq!(config.scaling.mode, ScalingMode::Batch);
        assert!(config.scaling.anomalous && config.scaling.tails);
        assert_eq!(config.scaling.cycles, 20);
        assert_eq!(config.scaling.sd_corrections[0].class, ReflectionClass::Full);
        assert_eq!(config.scaling.sd_corrections[0].sdb, 0.0);
        assert_eq!(config.flags.parallel, 8);
        assert_eq!(config.programs.scala, PathBuf::from("scala"));
    }

    #[test]
    fn test_missing_config() {
        assert!(matches!(
            Config::read_config_file(Path::new("/nonexistent/config.yaml")),
            Err(ConfigError::BadFilePath(_))
        ));
    }
}
