//! Host-facing machine driver contract and its Hetzner implementation.

use std::fmt;
use std::future::Future;
use std::net::Ipv4Addr;
use std::pin::Pin;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::{CREATE_FLAGS, CreateFlag, DriverOptions, HetznerConfig};
use crate::gateway::{Gateway, PowerAction, RunState};
use crate::hetzner::HetznerClient;
use crate::lifecycle::{self, DriverError, Lifecycle};
use crate::machine::{MachineRecord, validate_machine_name};
use crate::settings::DriverSettings;

/// Future returned by asynchronous driver operations.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DriverError>> + Send + 'a>>;

/// Operations a cluster-lifecycle host invokes on a machine driver.
pub trait MachineDriver: Send {
    /// Identifier the host uses for this driver.
    fn driver_name(&self) -> &str;

    /// Options the driver accepts when creating a machine.
    fn create_flags(&self) -> &'static [CreateFlag];

    /// Applies host-supplied options.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Configuration`] when a required option is
    /// missing.
    fn set_config_from_flags(&mut self, options: &dyn DriverOptions) -> Result<(), DriverError>;

    /// Validates local state before Create without touching the provider.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Configuration`] when the machine cannot be
    /// created as configured.
    fn pre_create_check(&self) -> Result<(), DriverError>;

    /// Provisions the machine.
    fn create(&mut self) -> DriverFuture<'_, ()>;

    /// Tears the machine down.
    fn remove(&mut self) -> DriverFuture<'_, ()>;

    /// Reports the machine's run-state.
    fn state(&self) -> DriverFuture<'_, RunState>;

    /// Powers the machine on.
    fn start(&self) -> DriverFuture<'_, ()>;

    /// Powers the machine off.
    fn stop(&self) -> DriverFuture<'_, ()>;

    /// Reboots the machine.
    fn restart(&self) -> DriverFuture<'_, ()>;

    /// Forcibly stops the machine.
    fn kill(&self) -> DriverFuture<'_, ()>;

    /// Returns the machine's public address.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::AddressUnavailable`] before Create resolves it.
    fn ip(&self) -> Result<Ipv4Addr, DriverError>;

    /// Returns the host name to SSH to.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::AddressUnavailable`] before Create resolves it.
    fn ssh_hostname(&self) -> Result<String, DriverError>;

    /// Returns the private key path once a key has been generated.
    fn ssh_key_path(&self) -> Option<&Utf8Path>;

    /// Returns the SSH login user.
    fn ssh_username(&self) -> &str;

    /// Returns the Docker endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::AddressUnavailable`] before Create resolves it.
    fn url(&self) -> Result<String, DriverError>;
}

/// Builds a gateway from an API token.
pub type Connector<G> = Arc<dyn Fn(&str) -> G + Send + Sync>;

/// Hetzner Cloud machine driver over a [`MachineRecord`].
pub struct HetznerDriver<G = HetznerClient> {
    record: MachineRecord,
    settings: DriverSettings,
    connector: Connector<G>,
}

impl HetznerDriver<HetznerClient> {
    /// Creates a driver for a new machine stored under `store_path`.
    #[must_use]
    pub fn new(machine_name: impl Into<String>, store_path: impl Into<Utf8PathBuf>) -> Self {
        Self::from_record(MachineRecord::new(machine_name, store_path))
    }

    /// Resumes a driver from a previously saved record.
    #[must_use]
    pub fn from_record(record: MachineRecord) -> Self {
        Self::with_connector(record, |token: &str| HetznerClient::new(token))
    }
}

impl<G: Gateway + 'static> HetznerDriver<G> {
    /// Creates a driver that obtains its gateway from `connector`.
    #[must_use]
    pub fn with_connector(
        record: MachineRecord,
        connector: impl Fn(&str) -> G + Send + Sync + 'static,
    ) -> Self {
        Self {
            record,
            settings: DriverSettings::default(),
            connector: Arc::new(connector),
        }
    }

    /// Replaces the driver settings.
    #[must_use]
    pub fn with_settings(mut self, settings: DriverSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Applies validated configuration to the record.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Configuration`] when a required field is empty.
    pub fn configure(&mut self, config: &HetznerConfig) -> Result<(), DriverError> {
        config.validate()?;
        self.record.apply_config(config);
        Ok(())
    }

    /// Current machine record.
    #[must_use]
    pub const fn record(&self) -> &MachineRecord {
        &self.record
    }

    /// Settings applied to every operation.
    #[must_use]
    pub const fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    fn gateway(&self) -> Result<G, DriverError> {
        if self.record.api_token.trim().is_empty() {
            return Err(DriverError::Configuration(String::from(
                "missing Hetzner API token: set HETZNER_API_TOKEN or pass --hetzner-api-token",
            )));
        }
        Ok((self.connector)(&self.record.api_token))
    }

    fn power(&self, action: PowerAction) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            let gateway = self.gateway()?;
            Lifecycle::new(&gateway, &self.settings)
                .power(&self.record, action)
                .await
        })
    }
}

impl<G> fmt::Debug for HetznerDriver<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HetznerDriver")
            .field("record", &self.record)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<G: Gateway + 'static> MachineDriver for HetznerDriver<G> {
    fn driver_name(&self) -> &str {
        &self.settings.driver_name
    }

    fn create_flags(&self) -> &'static [CreateFlag] {
        &CREATE_FLAGS
    }

    fn set_config_from_flags(&mut self, options: &dyn DriverOptions) -> Result<(), DriverError> {
        self.configure(&HetznerConfig::from_options(options))
    }

    fn pre_create_check(&self) -> Result<(), DriverError> {
        validate_machine_name(&self.record.machine_name).map_err(DriverError::Configuration)?;
        if self.record.store_path.as_str().trim().is_empty() {
            return Err(DriverError::Configuration(String::from(
                "machine store path is empty",
            )));
        }
        self.record.instance_request()?;
        self.gateway().map(drop)
    }

    fn create(&mut self) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            let gateway = self.gateway()?;
            Lifecycle::new(&gateway, &self.settings)
                .create(&mut self.record)
                .await
        })
    }

    fn remove(&mut self) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            let gateway = self.gateway()?;
            Lifecycle::new(&gateway, &self.settings)
                .remove(&mut self.record)
                .await
        })
    }

    fn state(&self) -> DriverFuture<'_, RunState> {
        Box::pin(async move {
            let gateway = self.gateway()?;
            Lifecycle::new(&gateway, &self.settings)
                .state(&self.record)
                .await
        })
    }

    fn start(&self) -> DriverFuture<'_, ()> {
        self.power(PowerAction::PowerOn)
    }

    fn stop(&self) -> DriverFuture<'_, ()> {
        self.power(PowerAction::PowerOff)
    }

    fn restart(&self) -> DriverFuture<'_, ()> {
        self.power(PowerAction::Reboot)
    }

    fn kill(&self) -> DriverFuture<'_, ()> {
        self.stop()
    }

    fn ip(&self) -> Result<Ipv4Addr, DriverError> {
        lifecycle::address(&self.record)
    }

    fn ssh_hostname(&self) -> Result<String, DriverError> {
        self.ip().map(|ip| ip.to_string())
    }

    fn ssh_key_path(&self) -> Option<&Utf8Path> {
        self.record.ssh_key_path.as_deref()
    }

    fn ssh_username(&self) -> &str {
        &self.record.ssh_user
    }

    fn url(&self) -> Result<String, DriverError> {
        lifecycle::endpoint_url(&self.record, &self.settings)
    }
}

#[cfg(test)]
mod tests;
