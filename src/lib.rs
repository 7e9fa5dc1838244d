//! Hetzner Cloud machine driver.
//!
//! The crate provisions Docker hosts on Hetzner Cloud for a cluster-lifecycle
//! host: it generates a per-machine SSH identity, registers it with the
//! provider, requests a server and waits until it is addressable, and later
//! tears everything down again. A [`gateway::Gateway`] abstracts the provider
//! API and [`HetznerClient`] implements it over HTTPS.

pub mod config;
pub mod driver;
pub mod gateway;
pub mod hetzner;
pub mod keys;
pub mod lifecycle;
pub mod machine;
pub mod settings;
pub mod test_support;

pub use config::{ConfigError, CreateFlag, DriverOptions, HetznerConfig};
pub use driver::{DriverFuture, HetznerDriver, MachineDriver};
pub use gateway::{Gateway, GatewayError, InstanceRequest, PowerAction, RunState};
pub use hetzner::HetznerClient;
pub use keys::{KeyError, SshIdentity, generate_identity};
pub use lifecycle::{DriverError, Lifecycle};
pub use machine::{MachineRecord, MachineStore, Phase, StoreError};
pub use settings::DriverSettings;
