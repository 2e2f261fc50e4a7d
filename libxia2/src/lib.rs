//! # xia2
//!
//! xia2 drives the programs of macromolecular crystallography data reduction. It runs
//! external programs (the CCP4 suite in particular), feeds them scripted input, reads back
//! their output and keeps track of the sweeps of diffraction images being processed. This
//! library holds the process driving layer and the scaling pipeline built on top of it;
//! the `xia2_cli` crate is the command line front end.
//!
//! ## Installation
//!
//! The only method of install is from source. If you have not used Rust before, you will
//! most likely need to install the Rust tool chain. See the
//! [Rust docs](https://www.rust-lang.org/tools/install) for installation instructions.
//!
//! To build and install the CLI use `cargo install --path ./xia2_cli` from the top level
//! of the repository. This installs the `xia2` binary to your cargo install location
//! (typically something like `~/.cargo/bin/`).
//!
//! ### External programs
//!
//! xia2 does no crystallography itself. A working CCP4 installation is required, and the
//! following environment variables must be defined (without leading or trailing
//! whitespace) before running:
//!
//! - `XIA2_ROOT`
//! - `XIA2CORE_ROOT`
//! - `CCP4`
//!
//! Programs are looked up in `$CCP4/bin` before the rest of the `PATH`. Every run gets its
//! own scratch directory, handed to the programs as `CCP4_SCR` and removed afterwards.
//!
//! ## Configuration
//!
//! Runs are configured with a YAML file; `xia2 new -p config.yaml` writes a template. The
//! format is as follows:
//!
//! ```yml
//! project_file: xia2.json
//! crystal: null
//! hklin: null
//! scalepack: null
//! driver_type: simple
//! programs:
//!   scala: scala
//!   sortmtz: sortmtz
//! scaling:
//!   mode: rotation
//!   spacing: null
//!   secondary: null
//!   bfactor: true
//!   brotation: null
//!   tails: true
//!   anomalous: false
//!   resolution: null
//!   cycles: 20
//!   sd_corrections: []
//! flags:
//!   quick: false
//!   fiddle_sd: false
//!   parallel: 0
//!   sort_on_failure: true
//!   ...
//! ```
//!
//! - `crystal` may be left `null` when the project has a single crystal.
//! - When `hklin` is `null` the integrated reflections of every sweep are sorted together
//! with Sortmtz and the result is scaled.
//! - `driver_type` is either `simple` (programs talk through pipes while they run) or
//! `script` (input is written to `<program>.xin` and the program is run in batch, with its
//! output in `<program>.xout`).
//! - `sd_corrections` entries have a `class` (`full`, `partial` or `both`), `sdfac`, `sdadd`
//! and optionally `sdb`.
//! - With `flags.sort_on_failure` set, input which Scala reports as unsorted is sorted and
//! scaled once more. With `flags.fiddle_sd` set (and `flags.quick` not), the refined scales
//! are restored for an extra merging pass. `flags.parallel` is passed to the programs as
//! `OMP_NUM_THREADS`.
//!
//! ## Output
//!
//! Scaling results are written to `<crystal>/scale` below the project directory, along with
//! the log of every program run. The project file (`xia2.json`) is updated with the batch
//! range of every sweep and the location of the scaled data. The CLI also writes a log file
//! (`xia2.log`), and on failure the full chain of errors to `xia2-error.txt`.
//!
//! ### Known limitations
//!
//! Failures of the external programs are recognized by searching their output for known
//! phrases (`Segmentation fault`, `File must be sorted`, `Normal termination` and so on).
//! If a program changes its wording between versions, a failure may go unnoticed.
pub mod ccp4;
pub mod config;
pub mod driver;
pub mod environment;
pub mod error;
pub mod flags;
pub mod process;
pub mod project;
pub mod resolution;
pub mod rogues;
pub mod shelx;
pub mod status;
pub mod sweep;
pub mod wrappers;
