// SPDX-License-Identifier: MIT

//! Runtime settings read from the environment (after `.env` is loaded)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::PlaybookError;

pub const SAVE_TIMEOUT_VAR: &str = "CACAO_SAVE_TIMEOUT_MS";
pub const SERVER_PORT_VAR: &str = "CACAO_SERVER_PORT";
pub const STORE_PATH_VAR: &str = "CACAO_STORE_PATH";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Deadline for one save transaction
    pub save_timeout: Duration,
    pub server_port: u16,
    /// Snapshot file of the file-backed store
    pub store_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            save_timeout: Duration::from_millis(5000),
            server_port: 3000,
            store_path: PathBuf::from("playbooks.json"),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, PlaybookError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PlaybookError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        let save_timeout: Option<u64> = parse_var(&lookup, SAVE_TIMEOUT_VAR)?;
        if let Some(ms) = save_timeout {
            if ms == 0 {
                return Err(PlaybookError::config(format!("{} must be positive", SAVE_TIMEOUT_VAR)));
            }
            settings.save_timeout = Duration::from_millis(ms);
        }
        let server_port: Option<u16> = parse_var(&lookup, SERVER_PORT_VAR)?;
        if let Some(port) = server_port {
            settings.server_port = port;
        }
        if let Some(path) = lookup(STORE_PATH_VAR).filter(|p| !p.trim().is_empty()) {
            settings.store_path = PathBuf::from(path);
        }
        Ok(settings)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, PlaybookError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PlaybookError::config(format!("{}='{}' is not a valid value", key, raw))),
    }
}
