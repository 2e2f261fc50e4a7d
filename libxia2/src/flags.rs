use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use super::error::ConfigError;

/// Cell refinement strategy used by the Mosflm integrater
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellrefMode {
    Default,
    Parallel,
    Orthogonal,
    #[default]
    Both,
}

impl FromStr for CellrefMode {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "parallel" => Ok(Self::Parallel),
            "orthogonal" => Ok(Self::Orthogonal),
            "both" => Ok(Self::Both),
            _ => Err(ConfigError::UnknownCellrefMode(s.to_string())),
        }
    }
}

impl Display for CellrefMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Parallel => write!(f, "parallel"),
            Self::Orthogonal => write!(f, "orthogonal"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// Switches consulted across the pipeline. Owned by the Config of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Flags {
    pub quick: bool,
    /// Refine the SD corrections with an extra merging pass
    pub fiddle_sd: bool,
    pub migrate_data: bool,
    pub trust_timestamps: bool,
    /// Threads given to the external programs; 0 leaves them to decide
    pub parallel: u32,
    // XDS development parameters
    pub z_min: f64,
    pub refine: bool,
    pub zero_dose: bool,
    pub relax: bool,
    // Mosflm
    pub cellref_mode: CellrefMode,
    pub old_mosflm: bool,
    // Rejection criteria
    pub rejection_threshold: f64,
    pub i_over_sigma_limit: f64,
    pub spacegroup: Option<String>,
    /// Sort the reflections and scale again when the scaler complains they are unsorted
    pub sort_on_failure: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            quick: false,
            fiddle_sd: false,
            migrate_data: false,
            trust_timestamps: false,
            parallel: 0,
            z_min: 0.0,
            refine: true,
            zero_dose: false,
            relax: false,
            cellref_mode: CellrefMode::Both,
            old_mosflm: false,
            rejection_threshold: 1.5,
            i_over_sigma_limit: 2.0,
            spacegroup: None,
            sort_on_failure: true,
        }
    }
}

impl Flags {
    pub fn set_cellref_mode(&mut self, cellref_mode: &str) -> Result<(), ConfigError> {
        self.cellref_mode = CellrefMode::from_str(cellref_mode)?;
        Ok(())
    }

    /// Whether the SD refinement pass should run
    pub fn refine_sd(&self) -> bool {
        self.fiddle_sd && !self.quick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cellref_mode() {
        let mut flags = Flags::default();
        assert_eq!(flags.cellref_mode, CellrefMode::Both);
        flags.set_cellref_mode("orthogonal").unwrap();
        assert_eq!(flags.cellref_mode, CellrefMode::Orthogonal);
        assert!(matches!(
            flags.set_cellref_mode("diagonal"),
            Err(ConfigError::UnknownCellrefMode(_))
        ));
        assert_eq!(flags.cellref_mode, CellrefMode::Orthogonal);
        assert_eq!(flags.cellref_mode.to_string(), "orthogonal");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let flags: Flags = serde_yaml::from_str("fiddle_sd: true\nparallel: 4\n").unwrap();
        assert!(flags.fiddle_sd);
        assert_eq!(flags.parallel, 4);
        assert!(flags.refine);
        assert_eq!(flags.rejection_threshold, 1.5);
        assert!(flags.refine_sd());

        let quick: Flags = serde_yaml::from_str("fiddle_sd: true\nquick: true\n").unwrap();
        assert!(!quick.refine_sd());
        assert!(serde_yaml::from_str::<Flags>("cellref_mode: diagonal\n").is_err());
    }
}
