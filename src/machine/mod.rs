//! Per-machine state shared by the lifecycle controller and the driver.

mod store;

use std::fmt;
use std::net::Ipv4Addr;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_IMAGE, DEFAULT_LOCATION, DEFAULT_SERVER_TYPE, HetznerConfig};
use crate::gateway::{InstanceRequest, RequestError};
use crate::settings::DEFAULT_SSH_USER;

pub use store::{MachineStore, RECORD_FILE_NAME, StoreError};

/// Progress of a machine through provisioning.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum Phase {
    /// Nothing exists remotely.
    #[default]
    Unprovisioned,
    /// The public key is registered with the provider.
    KeyUploaded,
    /// The server exists but has no public address yet.
    InstanceRequested,
    /// The server has a public IPv4 address.
    Addressable,
    /// Remote resources have been torn down.
    Removed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unprovisioned => "unprovisioned",
            Self::KeyUploaded => "key-uploaded",
            Self::InstanceRequested => "instance-requested",
            Self::Addressable => "addressable",
            Self::Removed => "removed",
        };
        f.write_str(label)
    }
}

/// Everything known about one machine.
#[derive(Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct MachineRecord {
    /// Host-assigned machine name, unique per deployment.
    pub machine_name: String,
    /// Directory holding the machine's key file and record.
    pub store_path: Utf8PathBuf,
    /// Provider API token. Never persisted.
    #[serde(skip)]
    pub api_token: String,
    /// Provider server identifier once created.
    pub server_id: Option<i64>,
    /// Provider SSH key identifier once uploaded.
    pub ssh_key_id: Option<i64>,
    /// Requested server class.
    pub server_type: String,
    /// Requested image.
    pub image: String,
    /// Requested location.
    pub location: String,
    /// Public IPv4 address once the server is addressable.
    pub ip_address: Option<Ipv4Addr>,
    /// Private key location once generated.
    pub ssh_key_path: Option<Utf8PathBuf>,
    /// SSH login user.
    pub ssh_user: String,
    /// Current provisioning phase.
    #[serde(default)]
    pub phase: Phase,
}

impl MachineRecord {
    /// Creates an unprovisioned record with default server parameters.
    #[must_use]
    pub fn new(machine_name: impl Into<String>, store_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            machine_name: machine_name.into(),
            store_path: store_path.into(),
            api_token: String::new(),
            server_id: None,
            ssh_key_id: None,
            server_type: DEFAULT_SERVER_TYPE.to_owned(),
            image: DEFAULT_IMAGE.to_owned(),
            location: DEFAULT_LOCATION.to_owned(),
            ip_address: None,
            ssh_key_path: None,
            ssh_user: DEFAULT_SSH_USER.to_owned(),
            phase: Phase::Unprovisioned,
        }
    }

    /// Copies credential and server parameters from configuration.
    pub fn apply_config(&mut self, config: &HetznerConfig) {
        self.api_token.clone_from(&config.api_token);
        self.server_type.clone_from(&config.server_type);
        self.image.clone_from(&config.image);
        self.location.clone_from(&config.location);
    }

    /// Builds the server request for this machine.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] when a server parameter is blank.
    pub fn instance_request(&self) -> Result<InstanceRequest, RequestError> {
        InstanceRequest::builder()
            .name(self.machine_name.as_str())
            .server_type(self.server_type.as_str())
            .image(self.image.as_str())
            .location(self.location.as_str())
            .build()
    }
}

impl fmt::Debug for MachineRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineRecord")
            .field("machine_name", &self.machine_name)
            .field("store_path", &self.store_path)
            .field("api_token", &"<redacted>")
            .field("server_id", &self.server_id)
            .field("ssh_key_id", &self.ssh_key_id)
            .field("server_type", &self.server_type)
            .field("image", &self.image)
            .field("location", &self.location)
            .field("ip_address", &self.ip_address)
            .field("ssh_key_path", &self.ssh_key_path)
            .field("ssh_user", &self.ssh_user)
            .field("phase", &self.phase)
            .finish()
    }
}

/// Checks that a machine name can be used as a single path component.
///
/// # Errors
///
/// Returns a description of the problem when the name is empty, is a
/// relative path marker, or contains a path separator.
pub fn validate_machine_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err(String::from("machine name is empty"));
    }
    if name == "." || name.contains("..") {
        return Err(format!("machine name {name:?} is a relative path"));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(format!("machine name {name:?} contains a path separator"));
    }
    Ok(())
}
