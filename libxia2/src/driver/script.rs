use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::Stdio;
use time::OffsetDateTime;

use super::{DriverCore, ProcessDriver};
use crate::error::DriverError;

/// ScriptDriver runs the program in batch.
///
/// Input is collected in memory while the driver is open. Closing the input writes it to
/// `<name>.xin` in the working directory and runs the program to completion with that file
/// as standard input and `<name>.xout` as standard output and error. Output is then read
/// back from `<name>.xout`.
#[derive(Debug, Default)]
pub struct ScriptDriver {
    core: DriverCore,
    name: Option<String>,
    started: bool,
    closed: bool,
    pending: Vec<String>,
    reader: Option<BufReader<File>>,
    exit_status: Option<i32>,
}

impl ScriptDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stem of the .xin/.xout files; defaults to the executable name
    pub fn set_name(&mut self, name: &str) {
        self.name = Some(name.to_string());
    }

    pub fn name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.core
            .executable
            .as_ref()
            .and_then(|exe| exe.file_stem())
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| String::from("xia2"))
    }

    pub fn input_file(&self) -> PathBuf {
        self.core
            .working_directory
            .join(format!("{}.xin", self.name()))
    }

    pub fn output_file(&self) -> PathBuf {
        self.core
            .working_directory
            .join(format!("{}.xout", self.name()))
    }
}

impl ProcessDriver for ScriptDriver {
    fn core(&self) -> &DriverCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DriverCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<(), DriverError> {
        if self.core.executable.is_none() {
            return Err(DriverError::NoExecutable);
        }
        if self.started {
            return Err(DriverError::AlreadyStarted(self.core.executable_name()));
        }
        self.started = true;
        self.core.runtime.process_start = Some(OffsetDateTime::now_utc());
        Ok(())
    }

    fn input(&mut self, record: &str) -> Result<(), DriverError> {
        if !self.started {
            return Err(DriverError::NotStarted(self.core.executable_name()));
        }
        if self.closed {
            return Err(DriverError::ProcessTerminated(self.core.executable_name()));
        }
        self.core.input_records.push(record.to_string());
        self.pending.push(record.to_string());
        Ok(())
    }

    fn output(&mut self) -> Result<String, DriverError> {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return Err(DriverError::OutputUnavailable(self.core.executable_name())),
        };
        let mut buffer: Vec<u8> = Vec::new();
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            return Ok(String::new());
        }
        let line = String::from_utf8_lossy(&buffer).to_string();
        self.core.record_output(&line);
        Ok(line)
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if !self.started {
            return Err(DriverError::NotStarted(self.core.executable_name()));
        }
        if self.closed {
            return Err(DriverError::ProcessTerminated(self.core.executable_name()));
        }
        self.closed = true;

        let xin = self.input_file();
        let xout = self.output_file();
        let mut script = File::create(&xin)?;
        for record in self.pending.drain(..) {
            writeln!(script, "{record}")?;
        }
        drop(script);

        let stdout = File::create(&xout)?;
        let stderr = stdout.try_clone()?;
        let mut command = self.core.make_command()?;
        command
            .stdin(Stdio::from(File::open(&xin)?))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        spdlog::debug!(
            "Running {} with input {}",
            self.core.executable_name(),
            xin.display()
        );
        let status = command.status().map_err(|e| DriverError::SpawnFailed {
            executable: self.core.executable_name(),
            source: e,
        })?;
        self.exit_status = Some(status.code().unwrap_or(-1));
        self.core.runtime.process_end = Some(OffsetDateTime::now_utc());
        self.reader = Some(BufReader::new(File::open(&xout)?));
        Ok(())
    }

    fn status(&mut self) -> Option<i32> {
        self.exit_status
    }

    /// The program only runs inside close(), so there is never anything to kill
    fn kill(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

#[cfg(all(test, target_family = "unix"))]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_batch_run_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = ScriptDriver::new();
        driver.set_executable(Path::new("cat"));
        driver.set_working_directory(dir.path());
        driver.start().unwrap();
        assert!(matches!(
            driver.output(),
            Err(DriverError::OutputUnavailable(_))
        ));
        driver.input("run 1 all").unwrap();
        driver.input("cycles 20").unwrap();
        driver.close_wait().unwrap();

        assert_eq!(driver.status(), Some(0));
        assert_eq!(driver.all_output(), ["run 1 all", "cycles 20"]);
        assert!(dir.path().join("cat.xin").exists());
        assert!(dir.path().join("cat.xout").exists());
        assert!(matches!(
            driver.input("anomalous on"),
            Err(DriverError::ProcessTerminated(_))
        ));
    }

    #[test]
    fn test_named_script() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = ScriptDriver::new();
        driver.set_executable(Path::new("sh"));
        driver.set_name("scala");
        driver.add_command_line("-c");
        driver.add_command_line("cat; echo 'Bus error' 1>&2");
        driver.set_working_directory(dir.path());
        driver.start().unwrap();
        driver.input("usecwd").unwrap();
        driver.close_wait().unwrap();
        assert!(dir.path().join("scala.xout").exists());
        assert_eq!(driver.all_output(), ["usecwd", "Bus error"]);
        assert!(driver.check_for_errors().is_err());
    }
}
