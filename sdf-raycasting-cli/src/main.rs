use std::{fs::File, io::BufReader, path::PathBuf, time::Instant};

use anyhow::{bail, Result};
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use options::Options;
use sdf_raycasting::{RenderConfig, RenderExecutor, Stats, StatsNodeTrait};

mod options;

/// Initializes the program logging
///
/// # Arguments
/// * `filter` - The log level filter, i.e., the minimum log level to be logged.
fn initialize_logging(filter: LevelFilter) {
    let mut builder = pretty_env_logger::formatted_timed_builder();

    builder.filter_level(filter).init();
}

/// Returns all files matching the provided glob pattern.
///
/// # Arguments
/// * `pattern` - The glob pattern for the input files.
fn find_input_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = match glob::glob(pattern) {
        Ok(paths) => paths,
        Err(err) => {
            error!("Invalid input pattern '{}': {:?}", pattern, err);
            return Err(err.into());
        }
    };

    let mut files = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => files.push(path),
            Err(err) => {
                error!("Failed to read entry: {:?}", err);
                info!("Skipping entry...");
            }
        }
    }

    Ok(files)
}

/// Runs the program.
///
/// # Arguments
/// * `options` - The program options.
fn run_program(options: Options) -> Result<()> {
    let s = Stats::root();

    let config = {
        let reader = BufReader::new(File::open(&options.config)?);
        RenderConfig::read(reader).map_err(|err| {
            error!("Failed to load the configuration {:?}: {:?}", options.config, err);
            err
        })?
    };

    let pattern = options.input.clone().unwrap_or_else(|| config.input.clone());
    let inputs = find_input_files(&pattern)?;
    if inputs.is_empty() {
        bail!("No input files match '{}'", pattern);
    }

    let t = Instant::now();
    let executor = RenderExecutor::new(config, options.out_dir.clone());
    let num_rendered = {
        let _t = s.get_child("run").register_timing();
        executor.run(&inputs, s.clone())?
    };

    info!(
        "Rendered {}/{} inputs in {} ms",
        num_rendered,
        inputs.len(),
        t.elapsed().as_secs_f64() * 1e3f64
    );

    if num_rendered == 0 {
        bail!("None of the inputs could be rendered");
    } else if num_rendered < inputs.len() {
        warn!("{} inputs failed", inputs.len() - num_rendered);
    }

    Ok(())
}

fn main() {
    let options = Options::parse();
    initialize_logging(options.log_level.into());
    options.dump_to_log();

    match run_program(options) {
        Ok(_) => {
            let stats = Stats::root();
            let stats = stats.lock().unwrap_or_else(|err| err.into_inner());
            info!("Stat:");
            info!("{}", *stats);
            info!("Program completed successfully");
        }
        Err(err) => {
            error!("Program failed: {:?}", err);
            std::process::exit(1);
        }
    }
}
