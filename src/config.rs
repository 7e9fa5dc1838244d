//! Configuration loading via `ortho-config` and the host option surface.

use std::collections::BTreeMap;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Server class requested when none is configured.
pub const DEFAULT_SERVER_TYPE: &str = "cx11";
/// Image requested when none is configured.
pub const DEFAULT_IMAGE: &str = "ubuntu-20.04";
/// Location requested when none is configured.
pub const DEFAULT_LOCATION: &str = "nbg1";

/// Host option carrying the API token.
pub const FLAG_API_TOKEN: &str = "hetzner-api-token";
/// Host option carrying the server class.
pub const FLAG_SERVER_TYPE: &str = "hetzner-server-type";
/// Host option carrying the image name.
pub const FLAG_IMAGE: &str = "hetzner-image";
/// Host option carrying the location.
pub const FLAG_LOCATION: &str = "hetzner-location";

/// Hetzner settings derived from environment variables and configuration
/// files.
#[derive(Clone, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "HETZNER",
    discovery(
        app_name = "hcloud-driver",
        env_var = "HCLOUD_DRIVER_CONFIG_PATH",
        config_file_name = "hcloud-driver.toml",
        dotfile_name = ".hcloud-driver.toml",
        project_file_name = "hcloud-driver.toml"
    )
)]
pub struct HetznerConfig {
    /// API token used for every provider call. Required, no default.
    #[ortho_config(default = String::new())]
    pub api_token: String,
    /// Server class for new machines. Defaults to `cx11`.
    #[ortho_config(default = DEFAULT_SERVER_TYPE.to_owned())]
    pub server_type: String,
    /// Image for new machines. Defaults to `ubuntu-20.04`.
    #[ortho_config(default = DEFAULT_IMAGE.to_owned())]
    pub image: String,
    /// Location for new machines. Defaults to `nbg1`.
    #[ortho_config(default = DEFAULT_LOCATION.to_owned())]
    pub location: String,
}

impl std::fmt::Debug for HetznerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HetznerConfig")
            .field("api_token", &"<redacted>")
            .field("server_type", &self.server_type)
            .field("image", &self.image)
            .field("location", &self.location)
            .finish()
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    flag: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        flag: &'static str,
        toml_key: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            flag,
            toml_key,
        }
    }
}

impl HetznerConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {}, pass --{}, or add {} to hcloud-driver.toml",
                metadata.description, metadata.env_var, metadata.flag, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("hcloud-driver")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Builds configuration from the option map handed over by a host,
    /// applying defaults for absent optional values.
    #[must_use]
    pub fn from_options(options: &dyn DriverOptions) -> Self {
        let value_or = |key: &str, default: &str| {
            options
                .string(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_owned())
        };
        Self {
            api_token: value_or(FLAG_API_TOKEN, ""),
            server_type: value_or(FLAG_SERVER_TYPE, DEFAULT_SERVER_TYPE),
            image: value_or(FLAG_IMAGE, DEFAULT_IMAGE),
            location: value_or(FLAG_LOCATION, DEFAULT_LOCATION),
        }
    }

    /// Performs semantic validation on required fields. Error messages name
    /// the environment variable, host flag and TOML key for the field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.api_token,
            &FieldMetadata::new(
                "Hetzner API token",
                "HETZNER_API_TOKEN",
                FLAG_API_TOKEN,
                "api_token",
            ),
        )?;
        Self::require_field(
            &self.server_type,
            &FieldMetadata::new(
                "server type",
                "HETZNER_SERVER_TYPE",
                FLAG_SERVER_TYPE,
                "server_type",
            ),
        )?;
        Self::require_field(
            &self.image,
            &FieldMetadata::new("image", "HETZNER_IMAGE", FLAG_IMAGE, "image"),
        )?;
        Self::require_field(
            &self.location,
            &FieldMetadata::new("location", "HETZNER_LOCATION", FLAG_LOCATION, "location"),
        )?;
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

/// Option values supplied by the host when it configures a driver.
pub trait DriverOptions {
    /// Returns the string value for `key`, if the host supplied one.
    fn string(&self, key: &str) -> Option<String>;
}

impl DriverOptions for BTreeMap<String, String> {
    fn string(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Description of an option the driver accepts when creating a machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CreateFlag {
    /// Option name as the host spells it.
    pub name: &'static str,
    /// One-line help text.
    pub usage: &'static str,
    /// Environment variable the host may read the value from.
    pub env_var: &'static str,
    /// Default value, if any.
    pub default: Option<&'static str>,
}

/// Options accepted by [`HetznerConfig::from_options`].
pub const CREATE_FLAGS: [CreateFlag; 4] = [
    CreateFlag {
        name: FLAG_API_TOKEN,
        usage: "Hetzner Cloud API token",
        env_var: "HETZNER_API_TOKEN",
        default: None,
    },
    CreateFlag {
        name: FLAG_SERVER_TYPE,
        usage: "Hetzner server type (e.g. cx11)",
        env_var: "HETZNER_SERVER_TYPE",
        default: Some(DEFAULT_SERVER_TYPE),
    },
    CreateFlag {
        name: FLAG_IMAGE,
        usage: "Image name (e.g. ubuntu-20.04)",
        env_var: "HETZNER_IMAGE",
        default: Some(DEFAULT_IMAGE),
    },
    CreateFlag {
        name: FLAG_LOCATION,
        usage: "Datacenter location (e.g. fsn1, nbg1)",
        env_var: "HETZNER_LOCATION",
        default: Some(DEFAULT_LOCATION),
    },
];
