//! The rogues gallery: match the outliers reported by the scaler back to the sweeps that
//! measured them, so they can be looked at on the images.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::RogueError;
use super::project::{Project, PROJECT_FILE_NAME};
use super::sweep::{BatchRange, SweepHandler};

/// Name of the rogue reflection list written by the scaler
pub const ROGUES_FILE_NAME: &str = "ROGUES";
const MIN_TOKENS: usize = 18;

/// An outlier reflection flagged by the scaler.
/// Miller indices are as written by the scaler, so they are probably reindexed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rogue {
    pub batch: u32,
    pub x: f64,
    pub y: f64,
    pub phi: f64,
    pub h: i32,
    pub k: i32,
    pub l: i32,
}

/// Parse one record of the rogues file. Only records marked with a trailing `*` are
/// rogues; anything else gives None.
pub fn parse_rogue_record(record: &str, line_number: usize) -> Result<Option<Rogue>, RogueError> {
    let tokens: Vec<&str> = record.split_whitespace().collect();
    if tokens.last() != Some(&"*") {
        return Ok(None);
    }
    if tokens.len() < MIN_TOKENS {
        return Err(RogueError::TooFewTokens(line_number, tokens.len()));
    }

    let int = |token: &str| {
        token
            .parse::<i32>()
            .map_err(|e| RogueError::BadInteger(line_number, e))
    };
    let float = |token: &str| {
        token
            .parse::<f64>()
            .map_err(|e| RogueError::BadFloat(line_number, e))
    };

    Ok(Some(Rogue {
        batch: tokens[6]
            .parse::<u32>()
            .map_err(|e| RogueError::BadInteger(line_number, e))?,
        h: int(tokens[3])?,
        k: int(tokens[4])?,
        l: int(tokens[5])?,
        x: float(tokens[15])?,
        y: float(tokens[16])?,
        phi: float(tokens[17])?,
    }))
}

/// Read every rogue from a rogues file
pub fn munch_rogues(path: &Path) -> Result<Vec<Rogue>, RogueError> {
    if !path.exists() {
        return Err(RogueError::BadFilePath(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path)?;
    let mut rogues = Vec::new();
    for (index, record) in contents.lines().enumerate() {
        if record.trim().is_empty() {
            continue;
        }
        if let Some(rogue) = parse_rogue_record(record, index + 1)? {
            rogues.push(rogue);
        }
    }
    Ok(rogues)
}

/// The rogues found in one sweep, with the files needed to find them on the images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRogues {
    pub sweep_name: String,
    pub epoch: u64,
    pub batch_range: BatchRange,
    pub integrated_experiments: Option<PathBuf>,
    pub integrated_reflections: Option<PathBuf>,
    pub rogues: Vec<Rogue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoguesReport {
    pub crystal: String,
    pub sweeps: Vec<SweepRogues>,
    /// Rogues whose batch is not in any sweep
    pub unassigned: Vec<Rogue>,
}

impl RoguesReport {
    pub fn total(&self) -> usize {
        self.sweeps.iter().map(|sweep| sweep.rogues.len()).sum::<usize>() + self.unassigned.len()
    }

    pub fn write(&self, path: &Path) -> Result<(), RogueError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml_str)?;
        Ok(())
    }
}

/// Sort rogues into the sweeps that own their batches
pub fn assign_rogues(crystal: &str, sweeps: &SweepHandler, rogues: &[Rogue]) -> RoguesReport {
    let mut report = RoguesReport {
        crystal: crystal.to_string(),
        sweeps: Vec::new(),
        unassigned: Vec::new(),
    };
    for (range, epoch) in sweeps.batch_map() {
        if let Ok(sweep) = sweeps.get_sweep_information(epoch) {
            report.sweeps.push(SweepRogues {
                sweep_name: sweep.sweep_name.clone(),
                epoch,
                batch_range: range,
                integrated_experiments: sweep.integrated_experiments.clone(),
                integrated_reflections: sweep.integrated_reflections.clone(),
                rogues: Vec::new(),
            });
        }
    }

    for rogue in rogues {
        let owner = sweeps.find_batch(rogue.batch).and_then(|epoch| {
            report.sweeps.iter_mut().find(|sweep| sweep.epoch == epoch)
        });
        match owner {
            Some(sweep) => sweep.rogues.push(*rogue),
            None => report.unassigned.push(*rogue),
        }
    }
    report
}

/// Build the rogues report for the single crystal project in a working directory and
/// write it as YAML to `output`
pub fn reconstruct_rogues(working_directory: &Path, output: &Path) -> Result<RoguesReport, RogueError> {
    let project = Project::read(&working_directory.join(PROJECT_FILE_NAME))?;
    let crystal = project.single_crystal()?;

    let rogues_path = project.scale_directory(&crystal.name).join(ROGUES_FILE_NAME);
    let rogues = munch_rogues(&rogues_path)?;
    spdlog::info!("Read {} rogues from {}", rogues.len(), rogues_path.display());

    let report = assign_rogues(&crystal.name, &crystal.sweeps, &rogues);
    for sweep in report.sweeps.iter() {
        spdlog::info!(
            "Sweep {} (batches {}): {} rogues",
            sweep.sweep_name,
            sweep.batch_range,
            sweep.rogues.len()
        );
    }
    if !report.unassigned.is_empty() {
        spdlog::warn!(
            "{} rogues could not be assigned to a sweep",
            report.unassigned.len()
        );
    }
    report.write(output)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProjectError;
    use crate::project::Crystal;
    use crate::sweep::SweepInformation;

    const ROGUES: &str = "
 Rogues gallery

    1    1    1   12    3   -7    42  1  1  1   1234.5  12.3   0.0   0.0   0.0  1021.4   988.7   21.35  *
    2    1    1    5    8    2  1150  1  1  1    234.5   2.3   0.0   0.0   0.0   101.0  1500.2  150.10  *
    3    1    1    5    8    2   400  1  1  1    234.5   2.3   0.0   0.0   0.0   101.0  1500.2  150.10
    4    1    1    1    1    1  9999  1  1  1     34.5   1.3   0.0   0.0   0.0    10.0    20.0   30.00  *
";

    fn write_rogues(dir: &Path) -> PathBuf {
        let path = dir.join(ROGUES_FILE_NAME);
        std::fs::write(&path, ROGUES).unwrap();
        path
    }

    fn two_sweep_project(dir: &Path) -> Project {
        let mut crystal = Crystal::new("XTAL1");
        let mut first = SweepInformation::new("SWEEP1", 1, 360).unwrap();
        first.integrated_experiments = Some(PathBuf::from("SWEEP1/integrated.expt"));
        first.integrated_reflections = Some(PathBuf::from("SWEEP1/integrated.refl"));
        crystal.sweeps.add_sweep(100, first).unwrap();
        crystal
            .sweeps
            .add_sweep(200, SweepInformation::new("SWEEP2", 1, 360).unwrap())
            .unwrap();
        crystal.sweeps.assign_batches().unwrap();
        let mut project = Project::new("test", dir);
        project.add_crystal(crystal);
        project
    }

    #[test]
    fn test_munch_rogues() {
        let dir = tempfile::tempdir().unwrap();
        let rogues = munch_rogues(&write_rogues(dir.path())).unwrap();
        assert_eq!(rogues.len(), 3);
        assert_eq!(
            rogues[0],
            Rogue {
                batch: 42,
                x: 1021.4,
                y: 988.7,
                phi: 21.35,
                h: 12,
                k: 3,
                l: -7
            }
        );
        assert_eq!(rogues[2].batch, 9999);
    }

    #[test]
    fn test_bad_records() {
        assert!(matches!(
            parse_rogue_record("1 2 3 *", 7),
            Err(RogueError::TooFewTokens(7, 4))
        ));
        let bad = "1 1 1 a 3 -7 42 1 1 1 1.0 1.0 0 0 0 1.0 1.0 1.0 *";
        assert!(matches!(
            parse_rogue_record(bad, 2),
            Err(RogueError::BadInteger(2, _))
        ));
        assert_eq!(parse_rogue_record("Rogues gallery", 1).unwrap(), None);
        assert!(matches!(
            munch_rogues(Path::new("/nonexistent/ROGUES")),
            Err(RogueError::BadFilePath(_))
        ));
    }

    #[test]
    fn test_assign_rogues() {
        let dir = tempfile::tempdir().unwrap();
        let project = two_sweep_project(dir.path());
        let rogues = munch_rogues(&write_rogues(dir.path())).unwrap();
        let crystal = project.single_crystal().unwrap();
        let report = assign_rogues("XTAL1", &crystal.sweeps, &rogues);

        assert_eq!(report.sweeps.len(), 2);
        assert_eq!(report.sweeps[0].rogues.len(), 1);
        assert_eq!(report.sweeps[0].rogues[0].batch, 42);
        assert_eq!(
            report.sweeps[0].integrated_reflections,
            Some(PathBuf::from("SWEEP1/integrated.refl"))
        );
        assert_eq!(report.sweeps[1].rogues[0].batch, 1150);
        for sweep in report.sweeps.iter() {
            for rogue in sweep.rogues.iter() {
                assert_eq!(crystal.sweeps.find_batch(rogue.batch), Some(sweep.epoch));
            }
        }
        assert_eq!(report.unassigned.len(), 1);
        assert_eq!(crystal.sweeps.find_batch(report.unassigned[0].batch), None);
        assert_eq!(report.total(), 3);
    }

    #[test]
    fn test_reconstruct_rogues() {
        let dir = tempfile::tempdir().unwrap();
        let project = two_sweep_project(dir.path());
        project.write(&dir.path().join(PROJECT_FILE_NAME)).unwrap();
        let scale_dir = project.scale_directory("XTAL1");
        std::fs::create_dir_all(&scale_dir).unwrap();
        write_rogues(&scale_dir);

        let output = dir.path().join("xia2-rogues.yaml");
        let report = reconstruct_rogues(dir.path(), &output).unwrap();
        assert_eq!(report.total(), 3);
        let written: RoguesReport =
            serde_yaml::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written, report);
    }

    #[test]
    fn test_reconstruct_requires_single_crystal() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("xia2-rogues.yaml");
        assert!(matches!(
            reconstruct_rogues(dir.path(), &output),
            Err(RogueError::ProjectError(ProjectError::BadFilePath(_)))
        ));

        let mut project = two_sweep_project(dir.path());
        project.add_crystal(Crystal::new("XTAL2"));
        project.write(&dir.path().join(PROJECT_FILE_NAME)).unwrap();
        assert!(matches!(
            reconstruct_rogues(dir.path(), &output),
            Err(RogueError::ProjectError(ProjectError::MultipleCrystals(2)))
        ));
    }
}
