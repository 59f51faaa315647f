//! Small `toml`-backed config file: remembers the last-used VID/PID
//! pair and bundle path so a second invocation in the same directory
//! can omit `--vid`/`--pid`/`--axp`.
//!
//! Configuration is loaded from, in increasing priority: the global
//! config file (`~/.config/axdl/config.toml`), then a local
//! `axdl.toml` in the current directory. CLI flags always win over
//! both; this file only supplies defaults.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use log::debug;
use serde::{Deserialize, Serialize};

const LOCAL_CONFIG_FILE: &str = "axdl.toml";

/// Remembered defaults for a flash job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Last-used USB vendor ID.
    pub vid: Option<u16>,
    /// Last-used USB product ID.
    pub pid: Option<u16>,
    /// Last-used bundle path.
    pub axp: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the global file, then overlay a local
    /// `axdl.toml` if one exists in the current directory.
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(path) = Self::global_config_path() {
            if let Some(global) = Self::load_from_file(&path) {
                debug!("loaded global config from {}", path.display());
                config.merge(global);
            }
        }

        if let Some(local) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local);
        }

        config
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        let content = fs::read_to_string(path).ok()?;
        toml::from_str(&content).ok()
    }

    fn merge(&mut self, other: Self) {
        if other.vid.is_some() {
            self.vid = other.vid;
        }
        if other.pid.is_some() {
            self.pid = other.pid;
        }
        if other.axp.is_some() {
            self.axp = other.axp;
        }
    }

    fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "axdl").map(|dirs| dirs.config_dir().to_path_buf())
    }

    fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Persist the VID/PID/bundle path actually used by this run, so
    /// the next invocation in this directory can omit them.
    pub fn remember(&self, vid: u16, pid: u16, axp: &Path) -> Result<()> {
        let config = Self { vid: Some(vid), pid: Some(pid), axp: Some(axp.to_path_buf()) };
        let content = toml::to_string_pretty(&config).context("serializing config")?;
        fs::write(LOCAL_CONFIG_FILE, content)
            .with_context(|| format!("writing {LOCAL_CONFIG_FILE}"))?;
        Ok(())
    }
}
