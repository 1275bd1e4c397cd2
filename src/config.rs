use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::options::MAX_OPTION_LEN;
use crate::session::default_vendor_class;

const DEFAULT_TIMEOUT_SECS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub interface: Option<String>,
    pub timeout_secs: i64,
    pub send_only: bool,
    pub vendor_class: Option<String>,
    pub oui_database: Option<PathBuf>,
    pub resolve_names: bool,
    pub quiet: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            send_only: false,
            vendor_class: None,
            oui_database: None,
            resolve_names: true,
            quiet: false,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(interface) = &self.interface
            && interface.trim().is_empty()
        {
            return Err(Error::InvalidConfig(
                "interface must not be empty".to_string(),
            ));
        }

        if let Some(class) = &self.vendor_class {
            if class.is_empty() {
                return Err(Error::InvalidConfig(
                    "vendor_class must not be empty".to_string(),
                ));
            }
            if class.len() > MAX_OPTION_LEN {
                return Err(Error::InvalidConfig(format!(
                    "vendor_class is {} bytes, options hold at most {}",
                    class.len(),
                    MAX_OPTION_LEN
                )));
            }
        }

        Ok(())
    }

    /// Listening window; zero means send-only.
    pub fn timeout(&self) -> Duration {
        if self.send_only || self.timeout_secs <= 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(self.timeout_secs as u64)
        }
    }

    pub fn vendor_class_identifier(&self) -> String {
        self.vendor_class
            .clone()
            .unwrap_or_else(default_vendor_class)
    }
}
