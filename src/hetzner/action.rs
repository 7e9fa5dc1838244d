//! Polling of asynchronous Hetzner actions.

use std::future::Future;
use std::time::Duration;

use reqwest::Method;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::gateway::{ActionHandle, GatewayError};

use super::HetznerClient;
use super::types::{Action, ActionResponse};

impl HetznerClient {
    async fn fetch_action(&self, id: i64) -> Result<Action, GatewayError> {
        let response: ActionResponse = self
            .fetch(self.request(Method::GET, &format!("/actions/{id}"))?)
            .await?;
        response.action.ok_or_else(|| GatewayError::Decode {
            message: format!("action {id} missing from response"),
        })
    }

    pub(super) async fn wait_for_action(&self, handle: ActionHandle) -> Result<(), GatewayError> {
        poll_action(
            handle,
            self.action_poll_interval,
            self.action_timeout,
            || self.fetch_action(handle.id),
        )
        .await
    }
}

/// Polls `fetch` until the action settles or `timeout` elapses on the runtime
/// clock.
async fn poll_action<F, Fut>(
    handle: ActionHandle,
    poll_interval: Duration,
    timeout: Duration,
    mut fetch: F,
) -> Result<(), GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Action, GatewayError>>,
{
    let deadline = Instant::now() + timeout;

    while Instant::now() <= deadline {
        let action = fetch().await?;
        match action.status.as_str() {
            "success" => return Ok(()),
            "error" => {
                let message = action.error.map_or_else(
                    || String::from("provider reported an error without details"),
                    |detail| format!("{}: {}", detail.code, detail.message),
                );
                return Err(GatewayError::ActionFailed {
                    action_id: handle.id,
                    message,
                });
            }
            status => debug!(action_id = handle.id, status, "action still in progress"),
        }
        sleep(poll_interval).await;
    }

    Err(GatewayError::ActionTimeout {
        action_id: handle.id,
    })
}
