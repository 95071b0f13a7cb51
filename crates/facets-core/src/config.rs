//! Runtime configuration
//!
//! Configuration is a plain TOML document. It is read once from the file
//! named by `FACETS_CONFIG` (when set) and can be replaced at runtime with
//! [`install`].

use crate::error::{FacetError, FacetResult};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "FACETS_CONFIG";

/// Facets runtime configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FacetsConfig {
    /// Selected UI toolkit; can be chosen only once
    pub toolkit: Option<String>,
    /// Dispatch mode used by subscriptions that do not choose one
    pub default_dispatch: String,
    /// Log notification failures when no exception handler is installed
    pub log_notification_errors: bool,
    /// Name given to the UI dispatch thread
    pub ui_thread_name: String,
    /// Directory for application data; defaults under the platform data dir
    pub application_data: Option<PathBuf>,
}

impl Default for FacetsConfig {
    fn default() -> Self {
        Self {
            toolkit: None,
            default_dispatch: "same".to_string(),
            log_notification_errors: true,
            ui_thread_name: "facets-ui".to_string(),
            application_data: None,
        }
    }
}

impl FacetsConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> FacetResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> FacetResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Read the file named by `FACETS_CONFIG`, or use the defaults
    pub fn from_env() -> FacetResult<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(PathBuf::from(path)),
            None => Ok(Self::default()),
        }
    }

    /// Directory used for application data
    pub fn application_data_dir(&self) -> Option<PathBuf> {
        self.application_data
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join("facets")))
    }
}

static CONFIG: Lazy<RwLock<FacetsConfig>> = Lazy::new(|| {
    let config = FacetsConfig::from_env().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "ignoring unreadable facets configuration");
        FacetsConfig::default()
    });
    RwLock::new(config)
});

/// Snapshot of the active configuration
pub fn current() -> FacetsConfig {
    CONFIG.read().clone()
}

/// Replace the active configuration
pub fn install(config: FacetsConfig) {
    *CONFIG.write() = config;
}

/// Choose the UI toolkit
///
/// The toolkit can be selected once; selecting the same toolkit again is
/// allowed, selecting a different one is an error.
pub fn set_toolkit(name: &str) -> FacetResult<()> {
    let mut config = CONFIG.write();
    match &config.toolkit {
        Some(current) if current != name => Err(FacetError::Config(format!(
            "the toolkit has already been set to '{}'",
            current
        ))),
        _ => {
            config.toolkit = Some(name.to_string());
            Ok(())
        }
    }
}
