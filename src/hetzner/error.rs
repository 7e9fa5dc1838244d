//! Translation of Hetzner Cloud failure responses into [`GatewayError`].
//!
//! The API reports a machine readable `error.code` alongside the HTTP
//! status. The code wins when it is recognised because Hetzner reuses 403
//! for both permission and quota failures.

use crate::gateway::GatewayError;

use super::types::ErrorEnvelope;

pub(super) fn classify_failure(status: u16, body: &[u8]) -> GatewayError {
    let detail = serde_json::from_slice::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error);
    let message = detail.as_ref().map_or_else(
        || String::from_utf8_lossy(body).trim().to_owned(),
        |found| found.message.clone(),
    );

    detail
        .and_then(|found| from_code(&found.code, &message))
        .unwrap_or_else(|| from_status(status, message))
}

fn from_code(code: &str, text: &str) -> Option<GatewayError> {
    let message = text.to_owned();
    let error = match code {
        "unauthorized" | "forbidden" | "token_readonly" => GatewayError::Auth { message },
        "uniqueness_error" | "conflict" => GatewayError::Conflict { message },
        "resource_limit_exceeded" | "placement_error" | "resource_unavailable" => {
            GatewayError::Quota { message }
        }
        "invalid_input" | "json_error" | "invalid_server_type" => {
            GatewayError::InvalidParameter { message }
        }
        "not_found" => GatewayError::NotFound { message },
        "rate_limit_exceeded" | "server_error" | "service_error" | "unavailable" | "timeout"
        | "maintenance" | "locked" => GatewayError::Transient { message },
        _ => return None,
    };
    Some(error)
}

fn from_status(status: u16, message: String) -> GatewayError {
    match status {
        401 | 403 => GatewayError::Auth { message },
        404 => GatewayError::NotFound { message },
        409 => GatewayError::Conflict { message },
        400 | 422 => GatewayError::InvalidParameter { message },
        423 | 429 | 500..=599 => GatewayError::Transient { message },
        _ => GatewayError::Provider { status, message },
    }
}

pub(super) fn transport_error(err: &reqwest::Error) -> GatewayError {
    GatewayError::Transient {
        message: err.to_string(),
    }
}

pub(super) fn decode_error(err: &serde_json::Error) -> GatewayError {
    GatewayError::Decode {
        message: err.to_string(),
    }
}
