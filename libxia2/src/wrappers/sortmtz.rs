use std::path::{Path, PathBuf};

use crate::ccp4::{remove_quietly, Ccp4Program};
use crate::driver::ProcessDriver;
use crate::error::SortmtzError;

/// Sort keys used for reflections from multiple sweeps prior to scaling
const SORT_ORDER: &str = "H K L M/ISYM BATCH";

/// A wrapper for the CCP4 program Sortmtz, for sorting (and combining) MTZ files
pub struct Sortmtz {
    program: Ccp4Program,
    hklin_files: Vec<PathBuf>,
}

impl Sortmtz {
    pub fn new(driver: Box<dyn ProcessDriver>, executable: &Path) -> Self {
        Self {
            program: Ccp4Program::new(driver, executable),
            hklin_files: Vec::new(),
        }
    }

    pub fn add_hklin(&mut self, hklin: &Path) {
        self.hklin_files.push(hklin.to_path_buf());
    }

    pub fn set_hklout(&mut self, hklout: &Path) {
        self.program.set_hklout(hklout);
    }

    pub fn driver(&self) -> &dyn ProcessDriver {
        self.program.driver()
    }

    pub fn write_log_file(&self, path: &Path) -> Result<(), SortmtzError> {
        self.program.driver().write_log_file(path)?;
        Ok(())
    }

    pub fn sort(&mut self) -> Result<String, SortmtzError> {
        if self.hklin_files.is_empty() {
            return Err(SortmtzError::NoInputFiles);
        }
        let hklout = self.program.check_hklout()?.to_path_buf();

        let task = format!(
            "Sorting {} reflection file(s) => {}",
            self.hklin_files.len(),
            hklout.display()
        );
        spdlog::info!("{task}");
        self.program.set_task(&task);

        self.program.start()?;
        if let Err(e) = self.run() {
            remove_quietly(&hklout);
            return Err(e);
        }
        Ok(self.program.get_ccp4_status().unwrap_or_default())
    }

    fn run(&mut self) -> Result<(), SortmtzError> {
        let driver = self.program.driver_mut();
        driver.input(SORT_ORDER)?;
        for hklin in self.hklin_files.iter() {
            driver.input(&hklin.to_string_lossy())?;
        }
        driver.close_wait()?;

        driver.check_for_errors()?;
        self.program.check_ccp4_errors()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockDriver;
    use crate::error::Ccp4Error;

    #[test]
    fn test_sort_script() {
        let (driver, record) = MockDriver::new(&[" Sortmtz:  Normal termination"]);
        let mut sortmtz = Sortmtz::new(Box::new(driver), Path::new("sortmtz"));
        sortmtz.add_hklin(Path::new("SWEEP1_INTEGRATE.mtz"));
        sortmtz.add_hklin(Path::new("SWEEP2_INTEGRATE.mtz"));
        sortmtz.set_hklout(Path::new("AUTOMATIC_DEFAULT_sorted.mtz"));
        assert_eq!(sortmtz.sort().unwrap(), "normal termination");

        let record = record.borrow();
        assert_eq!(
            record.command_line,
            ["hklout", "AUTOMATIC_DEFAULT_sorted.mtz"]
        );
        assert_eq!(
            record.inputs,
            [
                "H K L M/ISYM BATCH",
                "SWEEP1_INTEGRATE.mtz",
                "SWEEP2_INTEGRATE.mtz"
            ]
        );
    }

    #[test]
    fn test_requires_files() {
        let (driver, record) = MockDriver::new(&[]);
        let mut sortmtz = Sortmtz::new(Box::new(driver), Path::new("sortmtz"));
        assert!(matches!(sortmtz.sort(), Err(SortmtzError::NoInputFiles)));
        sortmtz.add_hklin(Path::new("in.mtz"));
        assert!(matches!(
            sortmtz.sort(),
            Err(SortmtzError::Ccp4Error(Ccp4Error::NoHklout))
        ));
        assert!(!record.borrow().started);
    }

    #[test]
    fn test_failure_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let hklout = dir.path().join("sorted.mtz");
        let (driver, _) = MockDriver::new(&[
            " >>>>>> CCP4 library signal mtz:Read failed (Error)",
            " Sortmtz:  *** Abnormal termination ***",
        ]);
        let mut sortmtz = Sortmtz::new(
            Box::new(driver.creates_on_close(hklout.clone())),
            Path::new("sortmtz"),
        );
        sortmtz.add_hklin(Path::new("missing.mtz"));
        sortmtz.set_hklout(&hklout);
        assert!(matches!(
            sortmtz.sort(),
            Err(SortmtzError::Ccp4Error(Ccp4Error::LibrarySignal { .. }))
        ));
        assert!(!hklout.exists());
    }
}
