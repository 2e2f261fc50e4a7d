//! Adapters for the CCP4 programs used in scaling.
//!
//! Each adapter owns its driver and is the only place that knows the command grammar of
//! its program.
pub mod scala;
pub mod sortmtz;

pub use scala::{ReflectionClass, Scala, ScalingMode, SdCorrection};
pub use sortmtz::Sortmtz;
