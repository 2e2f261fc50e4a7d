//! # xia2_cli
//!
//! Part of the xia2 crate family.
//!
//! This is the command line application for scaling crystallography data with xia2.
//!
//! ## Install
//!
//! Use `cargo install --path ./xia2_cli`
//!
//! ## Use
//!
//! Make a template configuration, edit it, and then run the pipeline with it:
//!
//! ```bash
//! xia2 new -p config.yaml
//! xia2 run -p config.yaml
//! ```
//!
//! Other tools:
//!
//! - `xia2 rogues` matches the outliers in `<crystal>/scale/ROGUES` to the sweeps which
//! measured them and writes a YAML report
//! - `xia2 to-shelx <reflections> <prefix> [atoms...]` writes a SHELX HKLF 4 file from a
//! plain text `h k l I sigI` reflection list
//! - `xia2 resolution --cell a b c alpha beta gamma --hkl h k l` prints the resolution of a
//! reflection
use clap::{Arg, ArgAction, ArgMatches, Command};
use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use libxia2::config::Config;
use libxia2::environment::Environment;
use libxia2::process::process;
use libxia2::resolution::d_spacing;
use libxia2::rogues::reconstruct_rogues;
use libxia2::shelx::{parse_compound, read_reflections, write_hklf4};

const ERROR_FILE: &str = "xia2-error.txt";

/// Log to the terminal and to xia2.log
fn setup_logging() -> Result<(), Box<dyn Error>> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./xia2.log"))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sinks(spdlog::default_logger().sinks().iter().cloned())
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

/// Write every error of the chain to the error file, so the terminal only needs one line
fn report_error(error: &dyn Error) {
    let mut report = format!("Error: {error}\n");
    let mut source = error.source();
    while let Some(cause) = source {
        report += &format!("Caused by: {cause}\n");
        source = cause.source();
    }
    match std::fs::write(ERROR_FILE, report) {
        Ok(()) => spdlog::error!("Status: error \"{error}\" (details in {ERROR_FILE})"),
        Err(e) => spdlog::error!("Status: error \"{error}\" (could not write {ERROR_FILE}: {e})"),
    }
}

fn config_path(matches: &ArgMatches) -> PathBuf {
    matches
        .get_one::<PathBuf>("path")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("config.yaml"))
}

fn floats(matches: &ArgMatches, name: &str) -> Vec<f64> {
    matches
        .get_many::<f64>(name)
        .map(|values| values.copied().collect())
        .unwrap_or_default()
}

fn run(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let config_path = config_path(matches);
    spdlog::info!("Loading config from {}...", config_path.display());
    let config = Config::read_config_file(&config_path)?;
    spdlog::info!("Config successfully loaded.");
    spdlog::info!("Project file: {}", config.project_file.display());
    spdlog::info!("Crystal: {}", config.crystal.as_deref().unwrap_or("(only crystal)"));
    spdlog::info!("Driver: {:?}", config.driver_type);
    spdlog::info!("Scaling mode: {:?}", config.scaling.mode);
    spdlog::info!("Parallel: {}", config.flags.parallel);

    let mut environment = Environment::from_process()?;

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let start = Instant::now();
    let (tx, rx) = std::sync::mpsc::channel();
    let handle = std::thread::spawn(move || process(&config, &mut environment, &tx));

    let result = loop {
        while let Ok(status) = rx.try_recv() {
            pb.set_position((status.progress * 100.0) as u64);
            pb.set_message(format!("{} {}", status.crystal, status.stage));
        }
        if handle.is_finished() {
            break handle.join();
        }
        std::thread::sleep(Duration::from_millis(250));
    };
    pb.finish();

    let elapsed = start.elapsed().as_secs();
    spdlog::info!(
        "Processing took {:02}h {:02}m {:02}s",
        elapsed / 3600,
        (elapsed % 3600) / 60,
        elapsed % 60
    );

    match result {
        Ok(Ok(scaled)) => {
            spdlog::info!("Scaled data written to {}", scaled.hklout.display());
            if let Some(scalepack) = &scaled.scalepack {
                spdlog::info!("Scalepack output written to {}", scalepack.display());
            }
            spdlog::info!("Status: normal termination");
            Ok(())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err("Failed to join processing task!".into()),
    }
}

fn rogues(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let directory = matches
        .get_one::<PathBuf>("directory")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));
    let output = matches
        .get_one::<PathBuf>("output")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("xia2-rogues.yaml"));
    let report = reconstruct_rogues(&directory, &output)?;
    spdlog::info!(
        "Wrote {} rogues of crystal {} to {}",
        report.total(),
        report.crystal,
        output.display()
    );
    Ok(())
}

fn to_shelx(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let reflections = matches
        .get_one::<PathBuf>("reflections")
        .ok_or("A reflection file is required")?;
    let prefix = matches
        .get_one::<String>("prefix")
        .ok_or("An output prefix is required")?;

    let atoms: String = matches
        .get_many::<String>("atoms")
        .map(|values| values.map(String::as_str).collect())
        .unwrap_or_default();
    if !atoms.is_empty() {
        spdlog::info!("Atoms: {atoms}");
        for (element, count) in parse_compound(&atoms)? {
            spdlog::info!("  {element}: {count}");
        }
    }

    let reflections = read_reflections(reflections)?;
    write_hklf4(&reflections, &PathBuf::from(format!("{prefix}.hkl")))?;
    Ok(())
}

fn resolution(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let cell = floats(matches, "cell");
    let cell: [f64; 6] = cell
        .try_into()
        .map_err(|_| "The cell needs six parameters: a b c alpha beta gamma")?;
    let hkl: Vec<i32> = matches
        .get_many::<i32>("hkl")
        .map(|values| values.copied().collect())
        .unwrap_or_default();
    let [h, k, l]: [i32; 3] = hkl
        .try_into()
        .map_err(|_| "A reflection needs three indices: h k l")?;
    let d = d_spacing(h, k, l, &cell)?;
    spdlog::info!("Resolution of {h} {k} {l}: {d:.4} Å");
    Ok(())
}

fn main() {
    // Create a cli
    let path_arg = Arg::new("path")
        .short('p')
        .long("path")
        .value_parser(clap::value_parser!(PathBuf))
        .help("Path to the configuration file");
    let matches = Command::new("xia2")
        .about("Drive crystallography programs to scale diffraction data")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("new")
                .about("Make a template configuration yaml file")
                .arg(path_arg.clone()),
        )
        .subcommand(
            Command::new("run")
                .about("Scale the data of a project")
                .arg(path_arg),
        )
        .subcommand(
            Command::new("rogues")
                .about("Match the rogue reflections of a scaled project to their sweeps")
                .arg(
                    Arg::new("directory")
                        .short('d')
                        .long("directory")
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Project directory, containing xia2.json"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Path of the YAML report"),
                ),
        )
        .subcommand(
            Command::new("to-shelx")
                .about("Write a SHELX HKLF 4 file from a plain text reflection list")
                .arg(
                    Arg::new("reflections")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(Arg::new("prefix").required(true))
                .arg(Arg::new("atoms").num_args(1..).action(ArgAction::Append)),
        )
        .subcommand(
            Command::new("resolution")
                .about("Print the resolution of a reflection")
                .arg(
                    Arg::new("cell")
                        .long("cell")
                        .num_args(6)
                        .required(true)
                        .allow_negative_numbers(true)
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    Arg::new("hkl")
                        .long("hkl")
                        .num_args(3)
                        .required(true)
                        .allow_negative_numbers(true)
                        .value_parser(clap::value_parser!(i32)),
                ),
        )
        .get_matches();

    // Initialize feedback
    if let Err(e) = setup_logging() {
        eprintln!("Could not create log file: {e}");
    }

    let result = match matches.subcommand() {
        Some(("new", sub)) => {
            let path = config_path(sub);
            spdlog::info!("Making a template config at {}...", path.display());
            Config::default()
                .write_config_file(&path)
                .map_err(Into::into)
        }
        Some(("run", sub)) => run(sub),
        Some(("rogues", sub)) => rogues(sub),
        Some(("to-shelx", sub)) => to_shelx(sub),
        Some(("resolution", sub)) => resolution(sub),
        _ => Ok(()),
    };

    match result {
        Ok(()) => spdlog::info!("Done."),
        Err(e) => {
            report_error(e.as_ref());
            std::process::exit(1);
        }
    }
}
