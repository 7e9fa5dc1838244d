//! Wire models for the Hetzner Cloud API.

use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub(super) struct CreateSshKeyRequest<'a> {
    pub(super) name: &'a str,
    pub(super) public_key: &'a str,
}

#[derive(Deserialize)]
pub(super) struct SshKeyResponse {
    pub(super) ssh_key: SshKey,
}

#[derive(Deserialize)]
pub(super) struct SshKey {
    pub(super) id: i64,
}

#[derive(Serialize)]
pub(super) struct CreateServerRequest<'a> {
    pub(super) name: &'a str,
    pub(super) server_type: &'a str,
    pub(super) image: &'a str,
    pub(super) location: &'a str,
    pub(super) ssh_keys: Vec<i64>,
    pub(super) start_after_create: bool,
}

#[derive(Deserialize)]
pub(super) struct CreateServerResponse {
    pub(super) server: Server,
    #[serde(default)]
    pub(super) action: Option<Action>,
}

#[derive(Deserialize)]
pub(super) struct ServerResponse {
    pub(super) server: Server,
}

#[derive(Deserialize)]
pub(super) struct Server {
    pub(super) id: i64,
    pub(super) status: String,
    #[serde(default)]
    pub(super) public_net: PublicNet,
}

#[derive(Default, Deserialize)]
pub(super) struct PublicNet {
    #[serde(default)]
    pub(super) ipv4: Option<Ipv4>,
}

#[derive(Deserialize)]
pub(super) struct Ipv4 {
    pub(super) ip: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct ActionResponse {
    #[serde(default)]
    pub(super) action: Option<Action>,
}

#[derive(Clone, Debug, Deserialize)]
pub(super) struct Action {
    pub(super) id: i64,
    pub(super) status: String,
    #[serde(default)]
    pub(super) error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
pub(super) struct ErrorEnvelope {
    pub(super) error: ErrorDetail,
}

#[derive(Clone, Debug, Deserialize)]
pub(super) struct ErrorDetail {
    pub(super) code: String,
    pub(super) message: String,
}
