//! Hetzner Cloud implementation of the provider gateway.
//!
//! Requests go straight to the REST API with a bearer token. Every request
//! carries a fixed timeout and action waits are bounded, so no call blocks
//! indefinitely.

mod action;
mod error;
mod types;

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::gateway::{
    ActionHandle, CreatedInstance, Gateway, GatewayError, GatewayFuture, InstanceRequest,
    InstanceSnapshot, PowerAction,
};
use error::{classify_failure, decode_error, transport_error};
use types::{
    ActionResponse, CreateServerRequest, CreateServerResponse, CreateSshKeyRequest, Server,
    ServerResponse, SshKeyResponse,
};

/// Base URL of the Hetzner Cloud API.
pub const HETZNER_API_BASE: &str = "https://api.hetzner.cloud/v1";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const ACTION_POLL_INTERVAL: Duration = Duration::from_secs(1);
const ACTION_TIMEOUT: Duration = Duration::from_secs(300);

static HTTP_CLIENT: LazyLock<Result<reqwest::Client, String>> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|err| {
            warn!(error = %err, "failed to build HTTP client");
            err.to_string()
        })
});

/// Hands out the shared client, or the reason it could not be built. There is
/// no fallback client because it would lack the request timeout.
fn shared_client(
    built: &Result<reqwest::Client, String>,
) -> Result<&reqwest::Client, GatewayError> {
    built.as_ref().map_err(|message| GatewayError::Client {
        message: message.clone(),
    })
}

/// Gateway that talks to the Hetzner Cloud API with a single credential.
#[derive(Clone)]
pub struct HetznerClient {
    token: String,
    base_url: String,
    action_poll_interval: Duration,
    action_timeout: Duration,
}

impl HetznerClient {
    /// Creates a client authenticated with `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: HETZNER_API_BASE.to_owned(),
            action_poll_interval: ACTION_POLL_INTERVAL,
            action_timeout: ACTION_TIMEOUT,
        }
    }

    /// Points the client at a different API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Overrides how often and for how long actions are polled.
    #[must_use]
    pub const fn with_action_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.action_poll_interval = poll_interval;
        self.action_timeout = timeout;
        self
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, GatewayError> {
        Ok(shared_client(&HTTP_CLIENT)?
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.token))
    }

    async fn dispatch(&self, builder: RequestBuilder) -> Result<Vec<u8>, GatewayError> {
        let response = builder.send().await.map_err(|err| transport_error(&err))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| transport_error(&err))?;

        if status.is_success() {
            return Ok(body.to_vec());
        }
        Err(classify_failure(status.as_u16(), &body))
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, GatewayError> {
        let body = self.dispatch(builder).await?;
        serde_json::from_slice(&body).map_err(|err| decode_error(&err))
    }

    fn snapshot(server: Server) -> InstanceSnapshot {
        let public_ipv4 = server
            .public_net
            .ipv4
            .and_then(|ipv4| ipv4.ip)
            .and_then(|ip| Ipv4Addr::from_str(&ip).ok());
        InstanceSnapshot {
            id: server.id,
            status: server.status,
            public_ipv4,
        }
    }
}

impl std::fmt::Debug for HetznerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HetznerClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl Gateway for HetznerClient {
    fn upload_key<'a>(&'a self, name: &'a str, public_key: &'a str) -> GatewayFuture<'a, i64> {
        Box::pin(async move {
            let payload = CreateSshKeyRequest { name, public_key };
            let response: SshKeyResponse = self
                .fetch(self.request(Method::POST, "/ssh_keys")?.json(&payload))
                .await?;
            debug!(ssh_key_id = response.ssh_key.id, name, "registered SSH key");
            Ok(response.ssh_key.id)
        })
    }

    fn create_instance<'a>(
        &'a self,
        request: &'a InstanceRequest,
        ssh_key_id: i64,
    ) -> GatewayFuture<'a, CreatedInstance> {
        Box::pin(async move {
            let payload = CreateServerRequest {
                name: &request.name,
                server_type: &request.server_type,
                image: &request.image,
                location: &request.location,
                ssh_keys: vec![ssh_key_id],
                start_after_create: true,
            };
            let response: CreateServerResponse = self
                .fetch(self.request(Method::POST, "/servers")?.json(&payload))
                .await?;
            Ok(CreatedInstance {
                id: response.server.id,
                action: response.action.map(|action| ActionHandle { id: action.id }),
            })
        })
    }

    fn await_action(&self, action: ActionHandle) -> GatewayFuture<'_, ()> {
        Box::pin(async move { self.wait_for_action(action).await })
    }

    fn get_instance(&self, id: i64) -> GatewayFuture<'_, InstanceSnapshot> {
        Box::pin(async move {
            let response: ServerResponse = self
                .fetch(self.request(Method::GET, &format!("/servers/{id}"))?)
                .await?;
            Ok(Self::snapshot(response.server))
        })
    }

    fn delete_instance(&self, id: i64) -> GatewayFuture<'_, Option<ActionHandle>> {
        Box::pin(async move {
            let body = self
                .dispatch(self.request(Method::DELETE, &format!("/servers/{id}"))?)
                .await?;
            if body.is_empty() {
                return Ok(None);
            }
            let response: ActionResponse =
                serde_json::from_slice(&body).map_err(|err| decode_error(&err))?;
            Ok(response.action.map(|action| ActionHandle { id: action.id }))
        })
    }

    fn delete_key(&self, id: i64) -> GatewayFuture<'_, ()> {
        Box::pin(async move {
            self.dispatch(self.request(Method::DELETE, &format!("/ssh_keys/{id}"))?)
                .await?;
            Ok(())
        })
    }

    fn power(&self, id: i64, action: PowerAction) -> GatewayFuture<'_, ActionHandle> {
        Box::pin(async move {
            let path = format!("/servers/{id}/actions/{}", action.as_str());
            let response: ActionResponse =
                self.fetch(self.request(Method::POST, &path)?).await?;
            response
                .action
                .map(|reported| ActionHandle { id: reported.id })
                .ok_or_else(|| GatewayError::Decode {
                    message: format!("{action} response for server {id} carried no action"),
                })
        })
    }
}

#[cfg(test)]
mod tests;
