//! A scripted stand-in for a real program, for exercising the wrappers without processes.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;

use super::{DriverCore, ProcessDriver};
use crate::error::DriverError;

/// What the wrapper did to the mock, shared with the test
#[derive(Debug, Default)]
pub struct MockRecord {
    pub started: bool,
    pub closed: bool,
    pub command_line: Vec<String>,
    pub inputs: Vec<String>,
}

#[derive(Debug)]
pub struct MockDriver {
    core: DriverCore,
    record: Rc<RefCell<MockRecord>>,
    responses: VecDeque<String>,
    creates_on_close: Vec<PathBuf>,
    started: bool,
    closed: bool,
}

impl MockDriver {
    /// A mock which answers with the given lines once its input is closed
    pub fn new(responses: &[&str]) -> (Self, Rc<RefCell<MockRecord>>) {
        let record = Rc::new(RefCell::new(MockRecord::default()));
        let driver = Self {
            core: DriverCore::default(),
            record: record.clone(),
            responses: responses.iter().map(|line| format!("{line}\n")).collect(),
            creates_on_close: Vec::new(),
            started: false,
            closed: false,
        };
        (driver, record)
    }

    /// Write an (empty) file when closed, as a program writing its output would
    pub fn creates_on_close(mut self, path: PathBuf) -> Self {
        self.creates_on_close.push(path);
        self
    }
}

impl ProcessDriver for MockDriver {
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
        self.started = true;
        let mut record = self.record.borrow_mut();
        record.started = true;
        record.command_line = self.core.command_line.clone();
        Ok(())
    }

    fn input(&mut self, record: &str) -> Result<(), DriverError> {
        if !self.started {
            return Err(DriverError::NotStarted(self.core.executable_name()));
        }
        if self.closed {
            return Err(DriverError::InputClosed(self.core.executable_name()));
        }
        self.core.input_records.push(record.to_string());
        self.record.borrow_mut().inputs.push(record.to_string());
        Ok(())
    }

    fn output(&mut self) -> Result<String, DriverError> {
        if !self.closed {
            return Err(DriverError::OutputUnavailable(self.core.executable_name()));
        }
        match self.responses.pop_front() {
            Some(line) => {
                self.core.record_output(&line);
                Ok(line)
            }
            None => Ok(String::new()),
        }
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if !self.started {
            return Err(DriverError::NotStarted(self.core.executable_name()));
        }
        self.closed = true;
        self.record.borrow_mut().closed = true;
        for path in self.creates_on_close.iter() {
            std::fs::write(path, b"")?;
        }
        Ok(())
    }

    fn status(&mut self) -> Option<i32> {
        if self.closed && self.responses.is_empty() {
            Some(0)
        } else {
            None
        }
    }

    fn kill(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}
