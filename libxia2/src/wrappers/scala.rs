use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::ccp4::{remove_quietly, Ccp4Program};
use crate::driver::ProcessDriver;
use crate::error::ScalaError;

const DEFAULT_SPACING: f64 = 5.0;
const DEFAULT_SECONDARY: f64 = 6.0;
const DEFAULT_CYCLES: u32 = 20;
const NOT_SORTED: &str = "File must be sorted";

/// The class of reflections an SD correction applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReflectionClass {
    Full,
    Partial,
    Both,
}

impl FromStr for ReflectionClass {
    type Err = ScalaError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "partial" => Ok(Self::Partial),
            "both" => Ok(Self::Both),
            _ => Err(ScalaError::UnknownSdClass(s.to_string())),
        }
    }
}

impl Display for ReflectionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Partial => write!(f, "partial"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// Error model coefficients for one class of reflections
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SdCorrection {
    pub class: ReflectionClass,
    pub sdfac: f64,
    pub sdadd: f64,
    #[serde(default)]
    pub sdb: f64,
}

/// Smooth scales as a function of rotation, or one scale per batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingMode {
    #[default]
    Rotation,
    Batch,
}

impl FromStr for ScalingMode {
    type Err = ScalaError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rotation" => Ok(Self::Rotation),
            "batch" => Ok(Self::Batch),
            _ => Err(ScalaError::UnknownScalingMode(s.to_string())),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// A wrapper for the CCP4 program Scala, for scaling and merging reflections.
///
/// Scala runs in one of two mutually exclusive modes: scaling unscaled reflections
/// ([`Scala::scale`]) or merging reflections which are already scaled ([`Scala::merge`]).
/// Either action needs hklin and hklout set beforehand. If anything goes wrong the
/// partially written outputs are removed before the error is returned.
pub struct Scala {
    program: Ccp4Program,
    scalepack: Option<PathBuf>,
    resolution: Option<f64>,
    scales_file: Option<PathBuf>,
    new_scales_file: Option<PathBuf>,
    onlymerge: bool,
    bfactor: bool,
    brotation: Option<f64>,
    anomalous: bool,
    tails: bool,
    mode: ScalingMode,
    spacing: f64,
    secondary: Option<f64>,
    cycles: u32,
    sd_parameters: BTreeMap<ReflectionClass, SdCorrection>,
}

impl Scala {
    pub fn new(driver: Box<dyn ProcessDriver>, executable: &Path) -> Self {
        Self {
            program: Ccp4Program::new(driver, executable),
            scalepack: None,
            resolution: None,
            scales_file: None,
            new_scales_file: None,
            onlymerge: false,
            bfactor: true,
            brotation: None,
            anomalous: false,
            tails: true,
            mode: ScalingMode::Rotation,
            spacing: DEFAULT_SPACING,
            secondary: Some(DEFAULT_SECONDARY),
            cycles: DEFAULT_CYCLES,
            sd_parameters: BTreeMap::new(),
        }
    }

    pub fn set_hklin(&mut self, hklin: &Path) {
        self.program.set_hklin(hklin);
    }

    pub fn set_hklout(&mut self, hklout: &Path) {
        self.program.set_hklout(hklout);
    }

    pub fn hklout(&self) -> Option<&Path> {
        self.program.hklout()
    }

    /// Also write the unmerged reflections in scalepack format to this file
    pub fn set_scalepack(&mut self, scalepack: &Path) {
        self.scalepack = Some(scalepack.to_path_buf());
    }

    pub fn set_resolution(&mut self, resolution: f64) {
        self.resolution = Some(resolution);
    }

    /// Restore scales from this file when merging
    pub fn set_scales_file(&mut self, scales_file: &Path) {
        self.scales_file = Some(scales_file.to_path_buf());
    }

    /// Write the refined scales to this file so they can be restored later
    pub fn set_new_scales_file(&mut self, new_scales_file: &Path) {
        self.new_scales_file = Some(new_scales_file.to_path_buf());
    }

    pub fn set_onlymerge(&mut self, onlymerge: bool) {
        self.onlymerge = onlymerge;
    }

    pub fn set_bfactor(&mut self, bfactor: bool, brotation: Option<f64>) {
        self.bfactor = bfactor;
        if brotation.is_some() {
            self.brotation = brotation;
        }
    }

    pub fn set_anomalous(&mut self, anomalous: bool) {
        self.anomalous = anomalous;
    }

    pub fn set_tails(&mut self, tails: bool) {
        self.tails = tails;
    }

    /// Batch mode ignores spacing and secondary
    pub fn set_scaling_parameters(
        &mut self,
        mode: ScalingMode,
        spacing: Option<f64>,
        secondary: Option<f64>,
    ) {
        self.mode = mode;
        if mode == ScalingMode::Batch {
            return;
        }
        if let Some(spacing) = spacing {
            self.spacing = spacing;
        }
        if secondary.is_some() {
            self.secondary = secondary;
        }
    }

    pub fn set_cycles(&mut self, cycles: u32) {
        self.cycles = cycles;
    }

    /// Add SD correction parameters for a class of reflections (full, partial or both)
    pub fn add_sd_correction(
        &mut self,
        class: &str,
        sdfac: f64,
        sdadd: f64,
        sdb: f64,
    ) -> Result<(), ScalaError> {
        let class = ReflectionClass::from_str(class)?;
        self.sd_parameters.insert(
            class,
            SdCorrection {
                class,
                sdfac,
                sdadd,
                sdb,
            },
        );
        Ok(())
    }

    pub fn driver(&self) -> &dyn ProcessDriver {
        self.program.driver()
    }

    pub fn get_ccp4_status(&self) -> Option<String> {
        self.program.get_ccp4_status()
    }

    pub fn write_log_file(&self, path: &Path) -> Result<(), ScalaError> {
        self.program.driver().write_log_file(path)?;
        Ok(())
    }

    fn bfactor_tokens(&self) -> String {
        let mut tokens = String::new();
        if self.bfactor {
            tokens += " bfactor on";
            if let Some(brotation) = self.brotation {
                tokens += &format!(" brotation {brotation:.6}");
            }
        } else {
            tokens += " bfactor off";
        }
        if self.tails {
            tokens += " tails";
        }
        tokens
    }

    fn anomalous_command(&self) -> String {
        String::from(if self.anomalous {
            "anomalous on"
        } else {
            "anomalous off"
        })
    }

    /// The command script sent to Scala by scale()
    pub fn scale_script(&self) -> Vec<String> {
        let mut script = vec![String::from("usecwd"), String::from("run 1 all")];

        let mut scales = match self.mode {
            ScalingMode::Rotation => {
                let mut command = format!("scales rotation spacing {:.6}", self.spacing);
                if let Some(secondary) = self.secondary {
                    command += &format!(" secondary {secondary:.6}");
                }
                command
            }
            ScalingMode::Batch => String::from("scales batch"),
        };
        scales += &self.bfactor_tokens();
        script.push(scales);

        if let Some(resolution) = self.resolution {
            script.push(format!("resolution {resolution:.6}"));
        }
        script.push(format!("cycles {}", self.cycles));

        // Scala reads these in the order sdfac, sdB, sdadd
        for sd in self.sd_parameters.values() {
            script.push(format!(
                "sdcorrection {} {:.6} {:.6} {:.6}",
                sd.class, sd.sdfac, sd.sdb, sd.sdadd
            ));
        }

        script.push(self.anomalous_command());
        if self.scalepack.is_some() {
            script.push(String::from("output polish unmerged"));
        }
        script
    }

    /// The command script sent to Scala by merge()
    pub fn merge_script(&self) -> Vec<String> {
        let mut script = vec![String::from("usecwd"), String::from("run 1 all")];
        match &self.scales_file {
            Some(scales_file) => {
                script.push(String::from("onlymerge"));
                script.push(format!("restore {}", scales_file.to_string_lossy()));
            }
            None => {
                script.push(String::from("scales constant"));
                script.push(String::from("initial unity"));
            }
        }
        script.push(self.anomalous_command());
        if self.scalepack.is_some() {
            script.push(String::from("output polish unmerged"));
        }
        script
    }

    /// Actually perform the scaling. Returns the CCP4 status of the run.
    pub fn scale(&mut self) -> Result<String, ScalaError> {
        let hklin = file_name(self.program.check_hklin()?);
        let hklout = file_name(self.program.check_hklout()?);
        if self.onlymerge {
            return Err(ScalaError::UseMerge);
        }

        if let Some(new_scales_file) = &self.new_scales_file {
            let driver = self.program.driver_mut();
            driver.add_command_line("SCALES");
            driver.add_command_line(&new_scales_file.to_string_lossy());
        }
        self.describe_task("Scaling", &hklin, &hklout);

        let script = self.scale_script();
        self.program.start()?;
        let result = self.run_script(&script);
        self.finish(result)
    }

    /// Merge reflections which are already scaled. Returns the CCP4 status of the run.
    pub fn merge(&mut self) -> Result<String, ScalaError> {
        let hklin = file_name(self.program.check_hklin()?);
        let hklout = file_name(self.program.check_hklout()?);
        if !self.onlymerge {
            return Err(ScalaError::UseScale);
        }
        self.describe_task("Merging scaled", &hklin, &hklout);

        let script = self.merge_script();
        self.program.start()?;
        let result = self.run_script(&script);
        self.finish(result)
    }

    /// Set the task and, for scalepack output, the extra command line keyword
    fn describe_task(&mut self, action: &str, hklin: &str, hklout: &str) {
        let task = match &self.scalepack {
            Some(scalepack) => {
                let driver = self.program.driver_mut();
                driver.add_command_line("scalepack");
                driver.add_command_line(&scalepack.to_string_lossy());
                format!(
                    "{action} reflections from {hklin} => scalepack {}",
                    file_name(scalepack)
                )
            }
            None => format!("{action} reflections from {hklin} => {hklout}"),
        };
        spdlog::info!("{task}");
        self.program.set_task(&task);
    }

    fn run_script(&mut self, script: &[String]) -> Result<(), ScalaError> {
        let driver = self.program.driver_mut();
        for line in script {
            driver.input(line)?;
        }
        driver.close_wait()?;

        driver.check_for_errors()?;
        self.program.check_ccp4_errors()?;
        self.check_scala_errors()
    }

    /// Look for Scala specific complaints in the output
    pub fn check_scala_errors(&self) -> Result<(), ScalaError> {
        for line in self.program.driver().all_output() {
            if line.contains(NOT_SORTED) {
                return Err(ScalaError::NotSorted);
            }
        }
        Ok(())
    }

    /// Clean up after the run: remove everything on failure, and the intermediate MTZ when
    /// the real output is the scalepack file
    fn finish(&mut self, result: Result<(), ScalaError>) -> Result<String, ScalaError> {
        if let Err(e) = result {
            if let Some(hklout) = self.program.hklout() {
                remove_quietly(hklout);
            }
            if let Some(scalepack) = &self.scalepack {
                remove_quietly(scalepack);
            }
            return Err(e);
        }

        if self.scalepack.is_some() {
            if let Some(hklout) = self.program.hklout() {
                remove_quietly(hklout);
            }
        }
        Ok(self.program.get_ccp4_status().unwrap_or_default())
    }
}
