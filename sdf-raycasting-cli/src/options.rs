use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::{info, LevelFilter};

/// Workaround for parsing the different log level
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

/// CLI for rendering meshes and signed distance fields with raycasting.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Options {
    /// The log level
    #[arg(short, value_enum, long, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// The render configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Overrides the input pattern of the configuration, e.g., `models/*.glb`
    #[arg(short, long)]
    pub input: Option<String>,

    /// The directory into which the frames are written
    #[arg(short, long, default_value = "out")]
    pub out_dir: PathBuf,
}

impl Options {
    /// Dumps the options to the log.
    pub fn dump_to_log(&self) {
        info!("Log Level: {:?}", self.log_level);
        info!("Config file: {:?}", self.config);
        if let Some(input) = self.input.as_ref() {
            info!("Input: {}", input);
        }
        info!("Output directory: {:?}", self.out_dir);
    }
}
