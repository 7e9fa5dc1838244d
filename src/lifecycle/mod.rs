//! Machine lifecycle controller.
//!
//! Create walks a record from `Unprovisioned` through key upload, server
//! creation and address polling to `Addressable`. Remove tears down whatever
//! exists and always leaves the record `Removed`. Every step is a sequential
//! await on the caller's task; nothing is retried.

mod error;
mod wait;

use std::net::Ipv4Addr;

use tracing::{info, warn};

use crate::gateway::{Gateway, GatewayError, PowerAction, RunState};
use crate::keys;
use crate::machine::{MachineRecord, Phase};
use crate::settings::DriverSettings;

pub use error::{DriverError, Step};

/// Drives one machine record against a provider gateway.
#[derive(Debug)]
pub struct Lifecycle<'a, G: ?Sized> {
    gateway: &'a G,
    settings: &'a DriverSettings,
}

impl<'a, G: Gateway + ?Sized> Lifecycle<'a, G> {
    /// Binds a controller to a gateway and driver settings.
    #[must_use]
    pub const fn new(gateway: &'a G, settings: &'a DriverSettings) -> Self {
        Self { gateway, settings }
    }

    /// Provisions the machine and records its server, key and address.
    ///
    /// The record is updated after each step, so on failure it shows how far
    /// provisioning got. Resources created before the failure are left in
    /// place for a later [`Lifecycle::remove`].
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::AlreadyProvisioned`] unless the record is
    /// `Unprovisioned`, [`DriverError::Key`] when the identity cannot be
    /// written, [`DriverError::Gateway`] for provider failures and
    /// [`DriverError::ProvisioningTimeout`] when no address appears within
    /// the poll bound.
    pub async fn create(&self, record: &mut MachineRecord) -> Result<(), DriverError> {
        if record.phase != Phase::Unprovisioned {
            return Err(DriverError::AlreadyProvisioned {
                machine: record.machine_name.clone(),
                phase: record.phase,
            });
        }
        let request = record.instance_request()?;

        let identity = keys::generate_identity(&record.store_path, &record.machine_name)?;
        record.ssh_key_path = Some(identity.private_key_path);

        let key_name = self.settings.key_name(&record.machine_name);
        let key_id = self
            .gateway
            .upload_key(&key_name, &identity.public_key)
            .await
            .map_err(|err| DriverError::gateway(Step::UploadKey, &record.machine_name, err))?;
        record.ssh_key_id = Some(key_id);
        record.phase = Phase::KeyUploaded;
        info!(machine = %record.machine_name, ssh_key_id = key_id, "ssh key uploaded");

        let created = self
            .gateway
            .create_instance(&request, key_id)
            .await
            .map_err(|err| DriverError::gateway(Step::CreateInstance, &record.machine_name, err))?;
        record.server_id = Some(created.id);
        record.phase = Phase::InstanceRequested;
        info!(machine = %record.machine_name, server_id = created.id, "server requested");

        if let Some(action) = created.action {
            self.gateway
                .await_action(action)
                .await
                .map_err(|err| DriverError::gateway(Step::AwaitCreation, created.id, err))?;
        }

        let address = wait::wait_for_address(self.gateway, self.settings, created.id).await?;
        record.ip_address = Some(address);
        record.phase = Phase::Addressable;
        info!(
            machine = %record.machine_name,
            server_id = created.id,
            ip = %address,
            "server addressable"
        );
        Ok(())
    }

    /// Deletes the server, the registered key and the local private key.
    ///
    /// Each deletion is attempted regardless of earlier failures and resources
    /// that are already gone count as deleted. Identifiers of resources that
    /// could not be deleted stay on the record so a retry can reach them.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Cleanup`] listing every deletion that failed.
    /// The record is `Removed` either way.
    pub async fn remove(&self, record: &mut MachineRecord) -> Result<(), DriverError> {
        let mut failures = Vec::new();

        if let Some(server_id) = record.server_id {
            match self.delete_server(server_id).await {
                Ok(()) => record.server_id = None,
                Err((step, err)) => {
                    warn!(server_id, error = %err, "failed to {step}");
                    failures.push(format!("{step} {server_id}: {err}"));
                }
            }
        }

        if let Some(key_id) = record.ssh_key_id {
            match tolerate_missing(self.gateway.delete_key(key_id).await) {
                Ok(()) => {
                    info!(ssh_key_id = key_id, "ssh key deleted");
                    record.ssh_key_id = None;
                }
                Err(err) => {
                    warn!(ssh_key_id = key_id, error = %err, "failed to delete ssh key");
                    failures.push(format!("{} {key_id}: {err}", Step::DeleteKey));
                }
            }
        }

        if let Some(path) = record.ssh_key_path.take()
            && let Err(err) = keys::discard_identity(&path)
        {
            warn!(path = %path, error = %err, "failed to remove private key");
            failures.push(err.to_string());
            record.ssh_key_path = Some(path);
        }

        record.ip_address = None;
        record.phase = Phase::Removed;

        if failures.is_empty() {
            info!(machine = %record.machine_name, "machine removed");
            Ok(())
        } else {
            Err(DriverError::Cleanup {
                machine: record.machine_name.clone(),
                failures,
            })
        }
    }

    /// Reports the server's run-state. Provider failures are reported as
    /// [`RunState::Error`] rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotProvisioned`] when the record has no server.
    pub async fn state(&self, record: &MachineRecord) -> Result<RunState, DriverError> {
        let server_id = require_server(record)?;
        match self.gateway.get_instance(server_id).await {
            Ok(snapshot) => Ok(snapshot.run_state()),
            Err(err) => {
                warn!(server_id, error = %err, "server state unavailable");
                Ok(RunState::Error)
            }
        }
    }

    /// Issues a power operation. The provider action is fired and not
    /// awaited.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotProvisioned`] when the record has no server
    /// and [`DriverError::Gateway`] when the server cannot be read or the
    /// provider rejects the operation.
    pub async fn power(
        &self,
        record: &MachineRecord,
        action: PowerAction,
    ) -> Result<(), DriverError> {
        let server_id = require_server(record)?;
        let snapshot = self
            .gateway
            .get_instance(server_id)
            .await
            .map_err(|err| DriverError::gateway(Step::FetchInstance, server_id, err))?;
        let handle = self
            .gateway
            .power(snapshot.id, action)
            .await
            .map_err(|err| DriverError::gateway(Step::Power(action), server_id, err))?;
        info!(server_id, action_id = handle.id, %action, "power action issued");
        Ok(())
    }

    async fn delete_server(&self, server_id: i64) -> Result<(), (Step, GatewayError)> {
        let action = tolerate_missing(self.gateway.delete_instance(server_id).await)
            .map_err(|err| (Step::DeleteInstance, err))?;
        if let Some(action) = action {
            tolerate_missing(self.gateway.await_action(action).await)
                .map_err(|err| (Step::AwaitDeletion, err))?;
        }
        info!(server_id, "server deleted");
        Ok(())
    }
}

/// Returns the machine's public address.
///
/// # Errors
///
/// Returns [`DriverError::AddressUnavailable`] before an address is known.
pub fn address(record: &MachineRecord) -> Result<Ipv4Addr, DriverError> {
    record
        .ip_address
        .ok_or_else(|| DriverError::AddressUnavailable {
            machine: record.machine_name.clone(),
        })
}

/// Returns the Docker endpoint URL, for example `tcp://203.0.113.5:2376`.
///
/// # Errors
///
/// Returns [`DriverError::AddressUnavailable`] before an address is known.
pub fn endpoint_url(
    record: &MachineRecord,
    settings: &DriverSettings,
) -> Result<String, DriverError> {
    let ip = address(record)?;
    Ok(format!(
        "{}://{ip}:{}",
        settings.endpoint_scheme, settings.docker_port
    ))
}

fn require_server(record: &MachineRecord) -> Result<i64, DriverError> {
    record.server_id.ok_or_else(|| DriverError::NotProvisioned {
        machine: record.machine_name.clone(),
    })
}

/// Treats a missing resource as already deleted.
fn tolerate_missing<T: Default>(result: Result<T, GatewayError>) -> Result<T, GatewayError> {
    match result {
        Err(err) if err.is_not_found() => {
            warn!(error = %err, "resource already gone");
            Ok(T::default())
        }
        other => other,
    }
}
