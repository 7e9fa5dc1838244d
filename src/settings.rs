//! Fixed driver defaults passed explicitly into the lifecycle controller.

use std::time::Duration;

/// Name the host uses to identify this driver.
pub const DRIVER_NAME: &str = "hetzner";
/// Login account on Hetzner Cloud images.
pub const DEFAULT_SSH_USER: &str = "root";
/// TLS port of the Docker daemon on provisioned machines.
pub const DEFAULT_DOCKER_PORT: u16 = 2376;
/// Scheme of the Docker endpoint URL.
pub const DEFAULT_ENDPOINT_SCHEME: &str = "tcp";
/// Prefix of SSH key names registered with the provider.
pub const DEFAULT_KEY_NAME_PREFIX: &str = "rancher-";
/// Delay between address polls during Create.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Maximum number of address polls during Create.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 30;

/// Constants and tunables shared by every operation on a machine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DriverSettings {
    /// Driver identifier reported to the host.
    pub driver_name: String,
    /// SSH login user recorded on new machines.
    pub ssh_user: String,
    /// Port composed into the endpoint URL.
    pub docker_port: u16,
    /// Scheme composed into the endpoint URL.
    pub endpoint_scheme: String,
    /// Prefix used when naming uploaded SSH keys.
    pub key_name_prefix: String,
    /// Delay between address polls.
    pub poll_interval: Duration,
    /// Maximum number of address polls.
    pub poll_attempts: u32,
}

impl DriverSettings {
    /// Overrides the address polling cadence.
    #[must_use]
    pub const fn with_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    /// Name under which a machine's public key is registered.
    #[must_use]
    pub fn key_name(&self, machine_name: &str) -> String {
        format!("{}{machine_name}", self.key_name_prefix)
    }
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            driver_name: DRIVER_NAME.to_owned(),
            ssh_user: DEFAULT_SSH_USER.to_owned(),
            docker_port: DEFAULT_DOCKER_PORT,
            endpoint_scheme: DEFAULT_ENDPOINT_SCHEME.to_owned(),
            key_name_prefix: DEFAULT_KEY_NAME_PREFIX.to_owned(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}
