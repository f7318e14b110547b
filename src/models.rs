//! Configuration model
//!
//! The configuration is loaded once from a TOML file before anything starts and is
//! immutable afterwards. Components receive the parts they need at construction.

use std::{collections::BTreeMap, path::Path, time::Duration};

use serde_derive::{Deserialize, Serialize};
use strum_macros::{EnumString, IntoStaticStr};
use thiserror::Error;
use validator::Validate;

use crate::{
    color::{Color, ColorError},
    PanelId,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("invalid color for {location}: {source}")]
    Color {
        location: String,
        #[source]
        source: ColorError,
    },
    #[error("status '{status}' has unsupported type '{ty}'")]
    UnsupportedStatusType { status: String, ty: String },
    #[error("thing '{thing}' references panel 0, panel ids start at 1")]
    InvalidPanel { thing: String },
}

fn default_true() -> bool {
    true
}

/// Kind of rendering a status resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum StatusType {
    Solid,
}

fn default_status_type() -> String {
    "solid".to_owned()
}

/// How a status name is rendered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusConfig {
    pub color: String,
    #[serde(rename = "type", default = "default_status_type")]
    pub ty: String,
}

impl StatusConfig {
    pub fn status_type(&self) -> Option<StatusType> {
        self.ty.parse().ok()
    }
}

/// Panels assigned to a thing, with optional colors painted when the daemon starts or stops
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThingConfig {
    pub panels: Vec<PanelId>,
    #[serde(default)]
    pub onstart: Option<String>,
    #[serde(default)]
    pub onstop: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ThingConfig {
    pub fn on_start(&self) -> Option<&str> {
        non_empty(&self.onstart)
    }

    pub fn on_stop(&self) -> Option<&str> {
        non_empty(&self.onstop)
    }
}

/// Control-plane access to the device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelSettings {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PollSettings {
    #[validate(length(min = 1))]
    pub location: String,
    /// Poll interval, in seconds
    #[validate(range(min = 1))]
    pub interval: u64,
    /// Timeout of a single poll request, in seconds
    #[validate(range(min = 1, max = 300))]
    pub timeout: u64,
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            location: "http://localhost:8080/".to_owned(),
            interval: 3,
            timeout: 10,
        }
    }
}

/// Which unknown entries of a status document produce warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateSettings {
    #[serde(default = "default_true")]
    pub thing: bool,
    #[serde(default = "default_true")]
    pub status: bool,
}

impl Default for ValidateSettings {
    fn default() -> Self {
        Self {
            thing: true,
            status: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Color painted on every panel of the device before things start
    #[serde(default)]
    pub onstart: Option<String>,
    #[serde(default)]
    pub panel: PanelSettings,
    #[serde(default)]
    #[validate(nested)]
    pub poll: PollSettings,
    #[serde(default)]
    pub validate: ValidateSettings,
    #[serde(default)]
    pub statuses: BTreeMap<String, StatusConfig>,
    #[serde(default)]
    pub things: BTreeMap<String, ThingConfig>,
}

impl Config {
    pub async fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let full = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&full)
    }

    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.check()?;
        Ok(config)
    }

    pub fn on_start(&self) -> Option<&str> {
        non_empty(&self.onstart)
    }

    /// Check everything that can be checked before the pipeline starts
    ///
    /// Overlapping panel assignments are rejected when the registry is built.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;

        let parse = |location: String, hex: &str| {
            Color::from_hex(hex)
                .map(|_| ())
                .map_err(|source| ConfigError::Color { location, source })
        };

        if let Some(onstart) = self.on_start() {
            parse("onstart".to_owned(), onstart)?;
        }

        for (name, status) in &self.statuses {
            if status.status_type().is_none() {
                return Err(ConfigError::UnsupportedStatusType {
                    status: name.clone(),
                    ty: status.ty.clone(),
                });
            }

            parse(format!("status '{}'", name), &status.color)?;
        }

        for (name, thing) in &self.things {
            if thing.panels.contains(&0) {
                return Err(ConfigError::InvalidPanel {
                    thing: name.clone(),
                });
            }

            if let Some(onstart) = thing.on_start() {
                parse(format!("thing '{}' onstart", name), onstart)?;
            }

            if let Some(onstop) = thing.on_stop() {
                parse(format!("thing '{}' onstop", name), onstop)?;
            }
        }

        Ok(())
    }
}
