use std::path::PathBuf;
use thiserror::Error;

use super::status::ProcessStatus;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Driver cannot start because no executable is set")]
    NoExecutable,
    #[error("Driver for {0} has not been started")]
    NotStarted(String),
    #[error("Driver for {0} was already started")]
    AlreadyStarted(String),
    #[error("Child process {0} has terminated")]
    ProcessTerminated(String),
    #[error("Input to child process {0} is already closed")]
    InputClosed(String),
    #[error("Output of {0} is not available until the program has run")]
    OutputUnavailable(String),
    #[error("Child process {executable} failed with {condition}")]
    KnownFailure {
        executable: String,
        condition: &'static str,
    },
    #[error("Driver failed to spawn {executable}: {source}")]
    SpawnFailed {
        executable: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Driver failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum Ccp4Error {
    #[error("CCP4 program requires an input reflection file (hklin) to be set")]
    NoHklin,
    #[error("CCP4 program requires an output reflection file (hklout) to be set")]
    NoHklout,
    #[error("{program} raised a CCP4 library signal: {signal}")]
    LibrarySignal { program: String, signal: String },
    #[error("{program} terminated abnormally: {status}")]
    AbnormalTermination { program: String, status: String },
    #[error("CCP4 program failed due to Driver error: {0}")]
    DriverError(#[from] DriverError),
}

#[derive(Debug, Error)]
pub enum ScalaError {
    #[error("Scala is configured to merge only; use merge() instead of scale()")]
    UseMerge,
    #[error("Scala is configured for scaling; use scale() instead of merge()")]
    UseScale,
    #[error("Scala reported that hklin is not sorted")]
    NotSorted,
    #[error("Unknown SD correction reflection class \"{0}\"; expected full, partial or both")]
    UnknownSdClass(String),
    #[error("Unknown scaling mode \"{0}\"; expected rotation or batch")]
    UnknownScalingMode(String),
    #[error("Scala failed due to CCP4 error: {0}")]
    Ccp4Error(#[from] Ccp4Error),
    #[error("Scala failed due to Driver error: {0}")]
    DriverError(#[from] DriverError),
}

#[derive(Debug, Error)]
pub enum SortmtzError {
    #[error("Sortmtz was not given any input reflection files")]
    NoInputFiles,
    #[error("Sortmtz failed due to CCP4 error: {0}")]
    Ccp4Error(#[from] Ccp4Error),
    #[error("Sortmtz failed due to Driver error: {0}")]
    DriverError(#[from] DriverError),
}

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("Required environment variable {0} is not defined")]
    Missing(String),
    #[error("Environment variable {0} has leading or trailing whitespace")]
    Whitespace(String),
    #[error("Environment failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("A sweep with epoch {0} is already registered")]
    DuplicateEpoch(u64),
    #[error("No sweep is registered with epoch {0}")]
    UnknownEpoch(u64),
    #[error("Invalid range {0}-{1}: the first value must not exceed the last")]
    InvalidRange(u32, u32),
    #[error("Batch numbers of sweep with epoch {0} do not fit in 32 bits")]
    BatchOverflow(u64),
    #[error("Sweep with epoch {0} has not been assigned a batch range")]
    Unassigned(u64),
    #[error("Batch range of sweep with epoch {0} overlaps the batch range of sweep with epoch {1}")]
    Overlap(u64, u64),
    #[error("Batch range of sweep with epoch {0} precedes the batch range of the earlier sweep with epoch {1}")]
    OutOfOrder(u64, u64),
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Failed to load project as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Project failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Project failed to parse JSON: {0}")]
    ParsingError(#[from] serde_json::Error),
    #[error("Project does not contain any crystals")]
    NoCrystals,
    #[error("Project contains {0} crystals where exactly one was expected")]
    MultipleCrystals(usize),
    #[error("Project does not contain a crystal named {0}")]
    UnknownCrystal(String),
}

#[derive(Debug, Error)]
pub enum RogueError {
    #[error("Could not read rogues as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Rogues record on line {0} has {1} tokens; at least 18 are required")]
    TooFewTokens(usize, usize),
    #[error("Rogues record on line {0} has a bad integer: {1}")]
    BadInteger(usize, std::num::ParseIntError),
    #[error("Rogues record on line {0} has a bad float: {1}")]
    BadFloat(usize, std::num::ParseFloatError),
    #[error("Rogues failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Rogues failed due to project error: {0}")]
    ProjectError(#[from] ProjectError),
    #[error("Rogues failed to write YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Unknown cell refinement mode \"{0}\"; expected default, parallel, orthogonal or both")]
    UnknownCellrefMode(String),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Unit cell parameters do not describe a valid cell")]
    DegenerateCell,
    #[error("Inversion error while building the B matrix: axis length {0} recovered as {1}")]
    InversionError(f64, f64),
    #[error("Reflection 0 0 0 is the origin of reciprocal space and has no resolution")]
    OriginReflection,
}

#[derive(Debug, Error)]
pub enum ShelxError {
    #[error("Compound formula has an unexpected character '{0}'")]
    BadCompound(char),
    #[error("Reflection record on line {0} must have 5 columns (h k l I sigI)")]
    BadRecord(usize),
    #[error("Reflection record on line {0} has a bad integer: {1}")]
    BadInteger(usize, std::num::ParseIntError),
    #[error("Reflection record on line {0} has a bad float: {1}")]
    BadFloat(usize, std::num::ParseFloatError),
    #[error("Shelx failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Environment error: {0}")]
    EnvironmentError(#[from] EnvironmentError),
    #[error("Processor failed due to Project error: {0}")]
    ProjectError(#[from] ProjectError),
    #[error("Processor failed due to Sweep error: {0}")]
    SweepError(#[from] SweepError),
    #[error("Processor failed due to Scala error: {0}")]
    ScalaError(#[from] ScalaError),
    #[error("Processor failed due to Sortmtz error: {0}")]
    SortmtzError(#[from] SortmtzError),
    #[error("Processor failed because crystal {0} has no integrated reflection files to sort")]
    NoIntegratedData(String),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<ProcessStatus>),
}
