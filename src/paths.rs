//! Locations of the config file and logs.

use std::env;
use std::path::PathBuf;

use anyhow::Context;

/// Overrides both the config and state directories.
const HOME_ENV_VAR: &str = "RUBBERSOUL_HOME";

const APP_DIR: &str = "rubbersoul";

fn home_dir() -> anyhow::Result<PathBuf> {
    let home = env::var_os("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home))
}

fn app_home() -> Option<PathBuf> {
    env::var_os(HOME_ENV_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Directory holding `config.toml`. Not created here.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    if let Some(base) = app_home() {
        return Ok(base);
    }

    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg).join(APP_DIR));
    }

    Ok(home_dir()?.join(".config").join(APP_DIR))
}

/// Directory holding log files. Not created here.
pub fn log_dir() -> anyhow::Result<PathBuf> {
    if let Some(base) = app_home() {
        return Ok(base.join("logs"));
    }

    if let Some(xdg) = env::var_os("XDG_STATE_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg).join(APP_DIR).join("logs"));
    }

    Ok(home_dir()?.join(".local").join("state").join(APP_DIR).join("logs"))
}

pub fn config_file() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}
