use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use time::OffsetDateTime;

use super::{DriverCore, ProcessDriver};
use crate::error::DriverError;

/// Forward every line from a child stream into the shared output channel
fn forward_lines<R: Read>(stream: R, tx: Sender<String>) {
    let mut reader = BufReader::new(stream);
    let mut buffer: Vec<u8> = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                if tx.send(String::from_utf8_lossy(&buffer).to_string()).is_err() {
                    break;
                }
            }
        }
    }
}

/// SimpleDriver runs the program with piped standard input and output.
///
/// Standard output and standard error are each read on their own thread and merged into
/// one stream of lines; the relative order is whatever the pipes deliver.
#[derive(Debug, Default)]
pub struct SimpleDriver {
    core: DriverCore,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    lines: Option<Receiver<String>>,
    exit_status: Option<i32>,
}

impl SimpleDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_started(&self) -> bool {
        self.child.is_some() || self.exit_status.is_some()
    }

    /// Poll the child; true if it has terminated
    fn has_exited(&mut self) -> bool {
        if self.exit_status.is_some() {
            return true;
        }
        match self.child.as_mut().map(|child| child.try_wait()) {
            Some(Ok(Some(status))) => {
                self.exit_status = Some(status.code().unwrap_or(-1));
                true
            }
            Some(Ok(None)) => false,
            Some(Err(_)) => true,
            None => false,
        }
    }

    /// The output stream ended; reap the child and note the time
    fn finish(&mut self) -> Result<(), DriverError> {
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            self.exit_status = Some(status.code().unwrap_or(-1));
            self.core.runtime.process_end = Some(OffsetDateTime::now_utc());
            spdlog::debug!(
                "{} finished with status {:?}",
                self.core.executable_name(),
                self.exit_status
            );
        }
        Ok(())
    }
}

impl ProcessDriver for SimpleDriver {
    fn core(&self) -> &DriverCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DriverCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<(), DriverError> {
        let mut command = self.core.make_command()?;
        if self.is_started() {
            return Err(DriverError::AlreadyStarted(self.core.executable_name()));
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        spdlog::debug!(
            "Starting {} {} in {}",
            self.core.executable_name(),
            self.core.command_line.join(" "),
            self.core.working_directory.display()
        );
        self.core.runtime.process_start = Some(OffsetDateTime::now_utc());
        let mut child = command.spawn().map_err(|e| DriverError::SpawnFailed {
            executable: self.core.executable_name(),
            source: e,
        })?;

        let (tx, rx) = mpsc::channel::<String>();
        if let Some(stdout) = child.stdout.take() {
            let tx = tx.clone();
            std::thread::spawn(move || forward_lines(stdout, tx));
        }
        if let Some(stderr) = child.stderr.take() {
            std::thread::spawn(move || forward_lines(stderr, tx));
        }

        self.stdin = child.stdin.take();
        self.lines = Some(rx);
        self.child = Some(child);
        self.exit_status = None;
        Ok(())
    }

    fn input(&mut self, record: &str) -> Result<(), DriverError> {
        if !self.is_started() {
            return Err(DriverError::NotStarted(self.core.executable_name()));
        }
        if self.has_exited() {
            return Err(DriverError::ProcessTerminated(self.core.executable_name()));
        }
        let stdin = match self.stdin.as_mut() {
            Some(stdin) => stdin,
            None => return Err(DriverError::InputClosed(self.core.executable_name())),
        };
        self.core.input_records.push(record.to_string());

        let written = writeln!(stdin, "{record}").and_then(|_| stdin.flush());
        if let Err(e) = written {
            // Whatever the program said before it stopped listening explains the failure
            loop {
                let line = self.output()?;
                if line.trim().is_empty() {
                    break;
                }
                self.core.check_for_errors()?;
            }
            return Err(DriverError::IOError(e));
        }
        Ok(())
    }

    fn output(&mut self) -> Result<String, DriverError> {
        let received = match &self.lines {
            Some(rx) => rx.recv(),
            None => return Err(DriverError::NotStarted(self.core.executable_name())),
        };
        match received {
            Ok(line) => {
                self.core.record_output(&line);
                Ok(line)
            }
            Err(_) => {
                self.finish()?;
                Ok(String::new())
            }
        }
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if !self.is_started() {
            return Err(DriverError::NotStarted(self.core.executable_name()));
        }
        if self.has_exited() {
            return Err(DriverError::ProcessTerminated(self.core.executable_name()));
        }
        match self.stdin.take() {
            Some(stdin) => {
                drop(stdin);
                Ok(())
            }
            None => Err(DriverError::InputClosed(self.core.executable_name())),
        }
    }

    fn status(&mut self) -> Option<i32> {
        self.has_exited();
        self.exit_status
    }

    fn kill(&mut self) -> Result<(), DriverError> {
        if let Some(child) = self.child.as_mut() {
            spdlog::warn!("Killing {}", self.core.executable_name());
            child.kill()?;
        }
        Ok(())
    }
}

impl Drop for SimpleDriver {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                let _ = child.kill();
            }
            let _ = child.wait();
        }
    }
}
