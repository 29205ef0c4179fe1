use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::marker::DEFAULT_COLOR;

#[derive(Parser, Debug)]
#[command(name = "hilite")]
#[command(about = "Keeps text highlights for web pages and puts them back on later visits", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config", global = true)]
    pub config_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Runs the HTTP service the browser extension talks to
    Serve,
    /// Highlights a passage of a saved page
    Capture {
        #[arg(long)]
        url: String,
        /// HTML file of the page
        #[arg(long)]
        file: PathBuf,
        /// Text to highlight
        #[arg(long)]
        text: String,
        /// Which match of the text to use, counting from 1
        #[arg(long, default_value_t = 1)]
        occurrence: usize,
        /// Where to write the marked page, stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Opens a saved page and restores its active highlight
    Open {
        #[arg(long)]
        url: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Makes a stored highlight the active one
    Select {
        #[arg(long)]
        url: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Clears the active highlight of a page
    Clear {
        #[arg(long)]
        url: String,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Lists the highlights of a page
    List {
        #[arg(long)]
        url: String,
        #[arg(short = 'q', long)]
        query: Option<String>,
    },
    /// Lists every page with highlights
    Dashboard {
        #[arg(short = 'q', long)]
        query: Option<String>,
    },
    /// Deletes one highlight, or the whole page when no id is given
    Delete {
        #[arg(long)]
        url: String,
        #[arg(long)]
        id: Option<String>,
    },
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hilite")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize, Clone)]
pub struct App {
    #[serde(default = "default_database")]
    database: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    pub turso_url: Option<String>,
    #[serde(default)]
    pub turso_auth_token: Option<String>,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_seconds: u64,
}

fn default_database() -> String {
    "hilite.db".to_string()
}

fn default_port() -> u16 {
    7331
}

fn default_sync_interval() -> u64 {
    60
}

impl Default for App {
    fn default() -> Self {
        Self {
            database: default_database(),
            port: default_port(),
            turso_url: None,
            turso_auth_token: None,
            sync_interval_seconds: default_sync_interval(),
        }
    }
}

impl App {
    pub fn get_db(&self) -> &str {
        &self.database
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Marker {
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

impl Default for Marker {
    fn default() -> Self {
        Self { color: default_color() }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub marker: Marker,
}

impl Config {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn new(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = ?path, "no config file, using defaults");
            return Ok(Config::default());
        }
        let cfg = Config::load_config(path)?;
        Ok(cfg)
    }

    fn load_config(path: &Path) -> Result<Config> {
        let yaml_str = fs::read_to_string(path)?;
        let yaml_with_env = Config::substitute_env_vars(&yaml_str)?;
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        Ok(config)
    }

    fn substitute_env_vars(yaml_str: &str) -> Result<String> {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            if let Some(end) = result[actual_start..].find('}') {
                let var_name = &result[actual_start + 2..actual_start + end];

                // ${VAR:-default}
                let env_value = if let Some(default_start) = var_name.find(":-") {
                    let actual_var = &var_name[..default_start];
                    let default_val = &var_name[default_start + 2..];
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                } else {
                    env::var(var_name).unwrap_or_else(|_| {
                        tracing::warn!(var = var_name, "environment variable not found");
                        String::new()
                    })
                };

                result.replace_range(actual_start..actual_start + end + 1, &env_value);
                offset = actual_start + env_value.len();
            } else {
                break;
            }
        }

        Ok(result)
    }
}
