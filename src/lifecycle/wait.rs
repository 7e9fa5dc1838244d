//! Bounded polling for a server's public address.

use std::net::Ipv4Addr;

use tokio::time::sleep;
use tracing::debug;

use crate::gateway::Gateway;
use crate::settings::DriverSettings;

use super::{DriverError, Step};

/// Polls the server until it reports a public IPv4 address.
///
/// Sleeps between polls but not after the last one, so the whole wait is
/// bounded by `poll_attempts` fetches and `poll_attempts - 1` intervals.
pub(super) async fn wait_for_address<G: Gateway + ?Sized>(
    gateway: &G,
    settings: &DriverSettings,
    server_id: i64,
) -> Result<Ipv4Addr, DriverError> {
    for attempt in 1..=settings.poll_attempts {
        let snapshot = gateway
            .get_instance(server_id)
            .await
            .map_err(|err| DriverError::gateway(Step::PollAddress, server_id, err))?;
        if let Some(address) = snapshot.public_ipv4 {
            return Ok(address);
        }
        debug!(
            server_id,
            attempt,
            status = %snapshot.status,
            "server has no public address yet"
        );
        if attempt < settings.poll_attempts {
            sleep(settings.poll_interval).await;
        }
    }

    Err(DriverError::ProvisioningTimeout {
        server_id,
        attempts: settings.poll_attempts,
    })
}
