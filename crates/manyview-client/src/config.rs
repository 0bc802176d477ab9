use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_PORT: u16 = 11111;

/// Voltage island layout of the default 48-core target: six islands of
/// eight cores each.
pub fn default_voltage_islands() -> Vec<Vec<u32>> {
    vec![
        vec![0, 1, 2, 3, 12, 13, 14, 15],
        vec![4, 5, 6, 7, 16, 17, 18, 19],
        vec![8, 9, 10, 11, 20, 21, 22, 23],
        vec![24, 25, 26, 27, 36, 37, 38, 39],
        vec![28, 29, 30, 31, 40, 41, 42, 43],
        vec![32, 33, 34, 35, 44, 45, 46, 47],
    ]
}

/// On-disk settings. Every field has a default, so a partial file is fine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub address: String,
    pub client_name: String,
    pub selections_file: PathBuf,
    pub output_folder: PathBuf,
    pub output_to_file: bool,
    pub command_queue: usize,
    pub voltage_islands: Vec<Vec<u32>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            address: format!("127.0.0.1:{DEFAULT_PORT}"),
            client_name: "manyview".to_string(),
            selections_file: PathBuf::from("selections.txt"),
            output_folder: PathBuf::from("output"),
            output_to_file: true,
            command_queue: 64,
            voltage_islands: default_voltage_islands(),
        }
    }
}

impl Settings {
    /// Reads the settings file. A missing file is normal; a present but
    /// unparsable one is reported and ignored.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!(event = "settings_file_invalid", path = %path.display(), error = %err);
                    Self::default()
                }
            },
            Err(err) => {
                debug!(event = "settings_file_missing", path = %path.display(), error = %err);
                Self::default()
            }
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "manyview", about = "Many-core chip monitor client")]
pub struct Cli {
    /// Settings file; missing means built-in defaults.
    #[arg(long, default_value = "settings.json")]
    pub settings: PathBuf,

    /// Backend address, host:port. Overrides the settings file.
    #[arg(long, env = "MANYVIEW_ADDR")]
    pub address: Option<String>,

    /// Name announced in the handshake.
    #[arg(long)]
    pub client_name: Option<String>,

    /// Named-selection store.
    #[arg(long)]
    pub selections_file: Option<PathBuf>,

    /// Folder for per-task output logs.
    #[arg(long)]
    pub output_folder: Option<PathBuf>,

    /// Keep task output in memory only.
    #[arg(long)]
    pub no_output_files: bool,

    /// Outbound command queue depth.
    #[arg(long)]
    pub command_queue: Option<usize>,
}

/// Effective configuration: settings file first, CLI and environment on top.
#[derive(Debug, Clone)]
pub struct Config {
    pub address: String,
    pub client_name: String,
    pub selections_file: PathBuf,
    pub output_folder: PathBuf,
    pub output_to_file: bool,
    pub command_queue: usize,
    pub voltage_islands: Vec<Vec<u32>>,
}

impl Config {
    pub fn load(cli: Cli) -> Self {
        let settings = Settings::load(&cli.settings);
        Self {
            address: cli.address.unwrap_or(settings.address),
            client_name: cli.client_name.unwrap_or(settings.client_name),
            selections_file: cli.selections_file.unwrap_or(settings.selections_file),
            output_folder: cli.output_folder.unwrap_or(settings.output_folder),
            output_to_file: settings.output_to_file && !cli.no_output_files,
            command_queue: cli.command_queue.unwrap_or(settings.command_queue).max(1),
            voltage_islands: settings.voltage_islands,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            address: settings.address,
            client_name: settings.client_name,
            selections_file: settings.selections_file,
            output_folder: settings.output_folder,
            output_to_file: settings.output_to_file,
            command_queue: settings.command_queue,
            voltage_islands: settings.voltage_islands,
        }
    }
}
