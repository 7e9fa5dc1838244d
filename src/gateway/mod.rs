//! Provider gateway abstraction for server and SSH key management.
//!
//! A gateway issues exactly one remote verb per call and never retries; the
//! lifecycle controller decides how failures are handled. The status
//! translation in [`RunState::from_provider_status`] is pure and total.

mod error;

use std::fmt;
use std::future::Future;
use std::net::Ipv4Addr;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use error::GatewayError;

/// Parameters required to create a new server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceRequest {
    /// Server name, normally the machine name.
    pub name: String,
    /// Server class to request (for example `cx11`).
    pub server_type: String,
    /// Image name to boot from (for example `ubuntu-20.04`).
    pub image: String,
    /// Location the server is placed in (for example `nbg1`).
    pub location: String,
}

impl InstanceRequest {
    /// Starts a builder for an [`InstanceRequest`].
    #[must_use]
    pub fn builder() -> InstanceRequestBuilder {
        InstanceRequestBuilder::new()
    }

    /// Validates the request, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] when any field is empty.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.name.is_empty() {
            return Err(RequestError::Validation("name".to_owned()));
        }
        if self.server_type.is_empty() {
            return Err(RequestError::Validation("server_type".to_owned()));
        }
        if self.image.is_empty() {
            return Err(RequestError::Validation("image".to_owned()));
        }
        if self.location.is_empty() {
            return Err(RequestError::Validation("location".to_owned()));
        }
        Ok(())
    }
}

/// Builder for [`InstanceRequest`] that trims inputs and validates on build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceRequestBuilder {
    name: String,
    server_type: String,
    image: String,
    location: String,
}

impl InstanceRequestBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the server class.
    #[must_use]
    pub fn server_type(mut self, value: impl Into<String>) -> Self {
        self.server_type = value.into();
        self
    }

    /// Sets the image name.
    #[must_use]
    pub fn image(mut self, value: impl Into<String>) -> Self {
        self.image = value.into();
        self
    }

    /// Sets the location.
    #[must_use]
    pub fn location(mut self, value: impl Into<String>) -> Self {
        self.location = value.into();
        self
    }

    /// Builds and validates the [`InstanceRequest`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] when any field is empty.
    pub fn build(self) -> Result<InstanceRequest, RequestError> {
        let request = InstanceRequest {
            name: self.name.trim().to_owned(),
            server_type: self.server_type.trim().to_owned(),
            image: self.image.trim().to_owned(),
            location: self.location.trim().to_owned(),
        };
        request.validate()?;
        Ok(request)
    }
}

/// Errors raised while assembling gateway requests.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

/// Provider handle for an asynchronous action.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ActionHandle {
    /// Provider action identifier.
    pub id: i64,
}

/// Result of a server creation request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CreatedInstance {
    /// Provider server identifier.
    pub id: i64,
    /// Creation action to await, when the provider reports one.
    pub action: Option<ActionHandle>,
}

/// Point-in-time view of a server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSnapshot {
    /// Provider server identifier.
    pub id: i64,
    /// Raw provider status string.
    pub status: String,
    /// Public IPv4 address once assigned.
    pub public_ipv4: Option<Ipv4Addr>,
}

impl InstanceSnapshot {
    /// Translates the provider status into a [`RunState`].
    #[must_use]
    pub fn run_state(&self) -> RunState {
        RunState::from_provider_status(&self.status)
    }
}

/// Run-state of a machine as reported to the host.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum RunState {
    /// The server is powered on.
    Running,
    /// The server is powered off.
    Stopped,
    /// The server is in a transitional or unrecognised state.
    Unknown,
    /// The provider could not be queried.
    Error,
}

impl RunState {
    /// Maps a provider status string onto a run-state. Unrecognised statuses
    /// map to [`RunState::Unknown`].
    #[must_use]
    pub fn from_provider_status(status: &str) -> Self {
        match status {
            "running" => Self::Running,
            "off" => Self::Stopped,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Running => "Running",
            Self::Stopped => "Stopped",
            Self::Unknown => "Unknown",
            Self::Error => "Error",
        };
        f.write_str(label)
    }
}

/// Power operations a gateway can fire against a server.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PowerAction {
    /// Power the server on.
    PowerOn,
    /// Cut power to the server.
    PowerOff,
    /// Reboot the server.
    Reboot,
}

impl PowerAction {
    /// Provider action path segment for this operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PowerOn => "poweron",
            Self::PowerOff => "poweroff",
            Self::Reboot => "reboot",
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Future returned by gateway operations.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, GatewayError>> + Send + 'a>>;

/// Remote verbs the machine lifecycle needs from a cloud provider.
pub trait Gateway: Send + Sync {
    /// Registers a public key and returns its provider identifier.
    fn upload_key<'a>(&'a self, name: &'a str, public_key: &'a str) -> GatewayFuture<'a, i64>;

    /// Requests a server with the given SSH key attached.
    fn create_instance<'a>(
        &'a self,
        request: &'a InstanceRequest,
        ssh_key_id: i64,
    ) -> GatewayFuture<'a, CreatedInstance>;

    /// Blocks until the provider reports the action finished.
    fn await_action(&self, action: ActionHandle) -> GatewayFuture<'_, ()>;

    /// Fetches the current view of a server.
    fn get_instance(&self, id: i64) -> GatewayFuture<'_, InstanceSnapshot>;

    /// Deletes a server, returning the deletion action when one is reported.
    fn delete_instance(&self, id: i64) -> GatewayFuture<'_, Option<ActionHandle>>;

    /// Deletes a registered SSH key.
    fn delete_key(&self, id: i64) -> GatewayFuture<'_, ()>;

    /// Fires a power action without waiting for it to complete.
    fn power(&self, id: i64, action: PowerAction) -> GatewayFuture<'_, ActionHandle>;
}
