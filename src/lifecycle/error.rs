//! Errors surfaced by machine lifecycle operations.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::gateway::{GatewayError, PowerAction, RequestError};
use crate::keys::KeyError;
use crate::machine::Phase;

/// Lifecycle step a gateway failure happened in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    /// Registering the public key.
    UploadKey,
    /// Requesting the server.
    CreateInstance,
    /// Waiting for the creation action.
    AwaitCreation,
    /// Polling for a public address.
    PollAddress,
    /// Deleting the server.
    DeleteInstance,
    /// Waiting for the deletion action.
    AwaitDeletion,
    /// Deleting the registered key.
    DeleteKey,
    /// Reading the server for a state query or power operation.
    FetchInstance,
    /// Issuing or awaiting a power operation.
    Power(PowerAction),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UploadKey => f.write_str("upload ssh key"),
            Self::CreateInstance => f.write_str("create server"),
            Self::AwaitCreation => f.write_str("await server creation"),
            Self::PollAddress => f.write_str("poll server address"),
            Self::DeleteInstance => f.write_str("delete server"),
            Self::AwaitDeletion => f.write_str("await server deletion"),
            Self::DeleteKey => f.write_str("delete ssh key"),
            Self::FetchInstance => f.write_str("fetch server"),
            Self::Power(action) => write!(f, "{action} server"),
        }
    }
}

/// Errors raised by the lifecycle controller and the driver contract.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Raised when required configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Raised when the SSH identity cannot be created or discarded.
    #[error(transparent)]
    Key(#[from] KeyError),
    /// Raised when a provider call fails.
    #[error("{step} failed for {target}: {source}")]
    Gateway {
        /// Step the call belonged to.
        step: Step,
        /// Machine name or provider identifier the call targeted.
        target: String,
        /// Provider failure.
        #[source]
        source: GatewayError,
    },
    /// Raised when the server never reports a public address.
    #[error("server {server_id} had no public address after {attempts} polls")]
    ProvisioningTimeout {
        /// Provider server identifier.
        server_id: i64,
        /// Number of polls performed.
        attempts: u32,
    },
    /// Raised when Create runs against a record that is already in flight.
    #[error("machine {machine} is already {phase}; remove it before creating again")]
    AlreadyProvisioned {
        /// Machine name.
        machine: String,
        /// Phase the record is in.
        phase: Phase,
    },
    /// Raised when an operation needs a server that does not exist yet.
    #[error("machine {machine} has no server")]
    NotProvisioned {
        /// Machine name.
        machine: String,
    },
    /// Raised when the public address is requested before it is known.
    #[error("machine {machine} has no public address yet")]
    AddressUnavailable {
        /// Machine name.
        machine: String,
    },
    /// Raised when Remove could not delete every resource.
    #[error("cleanup of {machine} incomplete: {}", .failures.join("; "))]
    Cleanup {
        /// Machine name.
        machine: String,
        /// One entry per failed deletion.
        failures: Vec<String>,
    },
}

impl DriverError {
    pub(crate) fn gateway(step: Step, target: impl fmt::Display, source: GatewayError) -> Self {
        Self::Gateway {
            step,
            target: target.to_string(),
            source,
        }
    }

    /// Returns the provider failure, if this error wraps one.
    #[must_use]
    pub const fn gateway_source(&self) -> Option<&GatewayError> {
        match self {
            Self::Gateway { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for DriverError {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value.to_string())
    }
}

impl From<RequestError> for DriverError {
    fn from(value: RequestError) -> Self {
        Self::Configuration(value.to_string())
    }
}
