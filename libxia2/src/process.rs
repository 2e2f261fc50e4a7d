use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use super::config::Config;
use super::driver::{create_driver, ProcessDriver};
use super::environment::Environment;
use super::error::{ProcessorError, ScalaError};
use super::project::{Project, ScaledData};
use super::status::{ProcessStatus, Stage};
use super::wrappers::{Scala, Sortmtz};

/// Resolve a path against a base directory, leaving absolute paths alone
fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Write a program log, but don't let a failure to do so hide the result of the program
fn keep_log<E: std::fmt::Display>(result: Result<(), E>, path: &Path) {
    match result {
        Ok(()) => spdlog::debug!("Wrote log {}", path.display()),
        Err(e) => spdlog::warn!("Could not write log {}: {e}", path.display()),
    }
}

/// Make a driver for a program which runs in the working directory.
///
/// The driver gets the scratch directory and user of the environment, `$CCP4/bin` ahead of
/// the inherited PATH, and the thread count when one is configured.
fn make_driver(
    config: &Config,
    environment: &mut Environment,
    working_directory: &Path,
) -> Result<Box<dyn ProcessDriver>, ProcessorError> {
    let mut driver = create_driver(config.driver_type);
    driver.set_working_directory(working_directory);
    environment.apply_to(driver.as_mut())?;
    if let Some(ccp4) = environment.get("CCP4") {
        driver.add_working_environment("PATH", &Path::new(ccp4).join("bin").to_string_lossy());
    }
    if config.flags.parallel > 0 {
        driver.set_working_environment_exclusive(
            "OMP_NUM_THREADS",
            &config.flags.parallel.to_string(),
        );
    }
    Ok(driver)
}

/// Sort (and combine) reflection files into hklout
fn sort_reflections(
    config: &Config,
    environment: &mut Environment,
    scale_directory: &Path,
    hklin_files: &[PathBuf],
    hklout: &Path,
) -> Result<PathBuf, ProcessorError> {
    let driver = make_driver(config, environment, scale_directory)?;
    let mut sortmtz = Sortmtz::new(driver, &config.programs.sortmtz);
    for hklin in hklin_files {
        sortmtz.add_hklin(hklin);
    }
    sortmtz.set_hklout(hklout);

    let result = sortmtz.sort();
    let log_path = scale_directory.join("sortmtz.log");
    keep_log(sortmtz.write_log_file(&log_path), &log_path);
    let status = result?;
    spdlog::info!("Sortmtz finished with status: {status}");
    Ok(hklout.to_path_buf())
}

/// A Scala set up with the configured scaling parameters
fn configure_scala(
    config: &Config,
    environment: &mut Environment,
    scale_directory: &Path,
    hklin: &Path,
    hklout: &Path,
) -> Result<Scala, ProcessorError> {
    let driver = make_driver(config, environment, scale_directory)?;
    let mut scala = Scala::new(driver, &config.programs.scala);
    let params = &config.scaling;

    scala.set_hklin(hklin);
    scala.set_hklout(hklout);
    if let Some(scalepack) = &config.scalepack {
        scala.set_scalepack(&absolutize(environment.base_directory(), scalepack));
    }
    if let Some(resolution) = params.resolution {
        scala.set_resolution(resolution);
    }
    scala.set_scaling_parameters(params.mode, params.spacing, params.secondary);
    scala.set_bfactor(params.bfactor, params.brotation);
    scala.set_tails(params.tails);
    scala.set_anomalous(params.anomalous);
    scala.set_cycles(params.cycles);
    for sd in params.sd_corrections.iter() {
        scala.add_sd_correction(&sd.class.to_string(), sd.sdfac, sd.sdadd, sd.sdb)?;
    }
    Ok(scala)
}

/// Run one scaling pass, keeping the log under the given name whatever the outcome
fn run_scale(mut scala: Scala, log_path: &Path) -> Result<String, ScalaError> {
    let result = scala.scale();
    keep_log(scala.write_log_file(log_path), log_path);
    result
}

/// The scaling pipeline for one crystal of a project.
///
/// This takes in a config and environment (and progress monitor), assigns the batches of
/// the crystal's sweeps, scales the reflections with Scala (sorting them first when needed)
/// and records the result in the project file.
pub fn process(
    config: &Config,
    environment: &mut Environment,
    tx: &Sender<ProcessStatus>,
) -> Result<ScaledData, ProcessorError> {
    environment.validate()?;

    tx.send(ProcessStatus::new(0.0, "", Stage::LoadingProject))?;
    let project_file = absolutize(environment.base_directory(), &config.project_file);
    spdlog::info!("Loading project from {}...", project_file.display());
    let mut project = Project::read(&project_file)?;
    let project_directory = absolutize(environment.base_directory(), &project.working_directory);
    let crystal_name = project.select_crystal(config.crystal.as_deref())?;
    spdlog::info!("Scaling crystal {crystal_name} of project {}", project.name);

    tx.send(ProcessStatus::new(
        0.1,
        &crystal_name,
        Stage::AssigningBatches,
    ))?;
    let crystal = project.crystal_mut(&crystal_name)?;
    crystal.sweeps.assign_batches()?;
    crystal.sweeps.validate()?;
    for (range, epoch) in crystal.sweeps.batch_map() {
        let sweep = crystal.sweeps.get_sweep_information(epoch)?;
        spdlog::info!("Sweep {}: batches {range}", sweep.sweep_name);
    }
    let integrated: Vec<PathBuf> = crystal
        .sweeps
        .sweeps()
        .filter_map(|(_, sweep)| sweep.integrated_mtz.as_deref())
        .map(|mtz| absolutize(&project_directory, mtz))
        .collect();

    let scale_directory = environment.generate_directory(&[
        project_directory.as_path(),
        Path::new(&crystal_name),
        Path::new("scale"),
    ])?;
    let sorted = scale_directory.join(format!("{crystal_name}_sorted.mtz"));
    let hklout = scale_directory.join(format!("{crystal_name}_scaled.mtz"));
    let scales_file = scale_directory.join("SCALES");
    let scala_log = scale_directory.join("scala.log");

    let mut hklin = match &config.hklin {
        Some(hklin) => absolutize(environment.base_directory(), hklin),
        None => {
            if integrated.is_empty() {
                return Err(ProcessorError::NoIntegratedData(crystal_name));
            }
            tx.send(ProcessStatus::new(0.2, &crystal_name, Stage::Sorting))?;
            sort_reflections(config, environment, &scale_directory, &integrated, &sorted)?
        }
    };

    tx.send(ProcessStatus::new(0.3, &crystal_name, Stage::Scaling))?;
    let mut scala = configure_scala(config, environment, &scale_directory, &hklin, &hklout)?;
    scala.set_new_scales_file(&scales_file);
    let mut status = match run_scale(scala, &scala_log) {
        Ok(status) => status,
        Err(ScalaError::NotSorted) if hklin == sorted => {
            spdlog::error!(
                "Scala reports the Sortmtz output {} is not sorted",
                hklin.display()
            );
            return Err(ScalaError::NotSorted.into());
        }
        Err(ScalaError::NotSorted) if config.flags.sort_on_failure => {
            spdlog::warn!(
                "Scala reports {} is not sorted; sorting and scaling again",
                hklin.display()
            );
            let unsorted_log = scale_directory.join("scala_unsorted.log");
            if let Err(e) = std::fs::rename(&scala_log, &unsorted_log) {
                spdlog::warn!("Could not keep log {}: {e}", unsorted_log.display());
            }

            tx.send(ProcessStatus::new(0.4, &crystal_name, Stage::Sorting))?;
            hklin = sort_reflections(config, environment, &scale_directory, &[hklin], &sorted)?;

            tx.send(ProcessStatus::new(0.5, &crystal_name, Stage::Rescaling))?;
            let mut scala =
                configure_scala(config, environment, &scale_directory, &hklin, &hklout)?;
            scala.set_new_scales_file(&scales_file);
            run_scale(scala, &scala_log)?
        }
        Err(e) => return Err(e.into()),
    };
    spdlog::info!("Scala finished with status: {status}");

    let mut scaled = ScaledData {
        hklout: hklout.clone(),
        scalepack: config
            .scalepack
            .as_ref()
            .map(|scalepack| absolutize(environment.base_directory(), scalepack)),
        scales_file: Some(scales_file.clone()),
        status: status.clone(),
        log_file: scala_log,
    };

    if config.flags.refine_sd() {
        tx.send(ProcessStatus::new(0.7, &crystal_name, Stage::RefiningSd))?;
        let merged = scale_directory.join(format!("{crystal_name}_merged.mtz"));
        let mut scala = configure_scala(config, environment, &scale_directory, &hklin, &merged)?;
        scala.set_onlymerge(true);
        scala.set_scales_file(&scales_file);

        let result = scala.merge();
        let merge_log = scale_directory.join("scala_merge.log");
        keep_log(scala.write_log_file(&merge_log), &merge_log);
        status = result?;
        spdlog::info!("Merging with restored scales finished with status: {status}");

        scaled.hklout = merged;
        scaled.status = status;
        scaled.log_file = merge_log;
    }

    tx.send(ProcessStatus::new(
        0.9,
        &crystal_name,
        Stage::SavingProject,
    ))?;
    project.crystal_mut(&crystal_name)?.scaled = Some(scaled.clone());
    project.write(&project_file)?;
    spdlog::info!("Saved project to {}", project_file.display());

    tx.send(ProcessStatus::new(1.0, &crystal_name, Stage::Done))?;
    Ok(scaled)
}
