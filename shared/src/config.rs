use std::env::VarError;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Result};

/// Loads `path` (or `.env` when none was given) into the process environment. Variables that are
/// already set win over the file.
pub fn load_environment(path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            dotenvy::from_path(path).map_err(|e| anyhow!("Failed to load configuration file {}: {e}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}

pub fn env_required(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| anyhow!("Missing required setting {name}"))
}

pub fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid value '{value}' for setting {name}: {e}")),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(anyhow!("Setting {name} is not valid unicode")),
    }
}
