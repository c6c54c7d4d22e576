// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Index and status pages, and `POST /v1/send`.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use courier_core::{ChannelUuid, CourierError, HealthStatus, MsgId, OutgoingMsg, Urn};

use crate::server::GatewayState;

/// Request body for POST /v1/send.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    /// UUID of the channel to send through.
    pub channel: String,
    /// Recipient, either a full URN or an address in the channel's scheme.
    pub urn: String,
    #[serde(default)]
    pub text: String,
    /// `mime/type:url` or bare URLs.
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Response body for POST /v1/send.
#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub id: MsgId,
    pub uuid: String,
    pub urn: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct QueueInfo {
    pub name: String,
    pub size: usize,
}

/// Response body for GET /status.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub queues: Vec<QueueInfo>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// GET /
///
/// Plain-text listing of every webhook route the running handlers answer.
pub async fn get_index(State(state): State<GatewayState>) -> String {
    let mut page = format!("courier {}\n\n", env!("CARGO_PKG_VERSION"));
    for route in state.registry.routes() {
        let name = state
            .registry
            .get(&route.channel_type)
            .map(|h| h.channel_name().to_string())
            .unwrap_or_default();
        page.push_str(&format!(
            "{:<5} /{}/{}/{{uuid}}/{:<12} - {}\n",
            route.method.to_string(),
            state.mount,
            route.channel_type.as_str().to_ascii_lowercase(),
            route.action,
            name
        ));
    }
    page
}

/// GET /status
///
/// Backend health plus the depth of every known queue. Answers 503 when
/// the backend is unhealthy.
pub async fn get_status(State(state): State<GatewayState>) -> Response {
    let (status, detail) = match state.backend.health().await {
        HealthStatus::Healthy => ("ok", None),
        HealthStatus::Degraded(reason) => ("degraded", Some(reason)),
        HealthStatus::Unhealthy(reason) => ("unhealthy", Some(reason)),
    };

    let queue = state.backend.queue();
    let mut queues = Vec::new();
    match queue.known_queues().await {
        Ok(names) => {
            for name in names {
                match queue.size(&name).await {
                    Ok(size) => queues.push(QueueInfo { name, size }),
                    Err(e) => tracing::warn!(queue = %name, error = %e, "queue size unavailable"),
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "queue listing unavailable"),
    }

    let code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let body = StatusResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started.elapsed().as_secs(),
        detail,
        queues,
    };
    (code, Json(body)).into_response()
}

/// POST /v1/send
///
/// Creates an outgoing message and queues it for the channel's worker.
pub async fn post_send(State(state): State<GatewayState>, Json(body): Json<SendRequest>) -> Response {
    let Ok(channel_uuid) = ChannelUuid::parse(&body.channel) else {
        return error(StatusCode::BAD_REQUEST, "channel must be a UUID");
    };
    let channel = match state.backend.get_channel_by_uuid(&channel_uuid).await {
        Ok(channel) => channel,
        Err(CourierError::ChannelNotFound { .. }) => {
            return error(StatusCode::NOT_FOUND, "channel not found");
        }
        Err(e) => {
            tracing::error!(channel_uuid = %channel_uuid, error = %e, "channel lookup failed");
            return error(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
        }
    };

    let urn = match recipient(&body.urn, channel.primary_scheme(), channel.country()) {
        Ok(urn) => urn,
        Err(e) => return error(StatusCode::BAD_REQUEST, e.to_string()),
    };
    if body.text.trim().is_empty() && body.attachments.is_empty() {
        return error(StatusCode::BAD_REQUEST, "message needs text or attachments");
    }

    let msg = body
        .attachments
        .into_iter()
        .fold(OutgoingMsg::new(&channel, urn, body.text), |msg, a| {
            msg.with_attachment(a)
        });
    match state.backend.enqueue_outgoing(&msg).await {
        Ok(id) => {
            tracing::info!(msg_id = %id, channel_uuid = %channel.uuid, "outgoing message queued");
            Json(SendResponse {
                id,
                uuid: msg.uuid.to_string(),
                urn: msg.urn.to_string(),
                status: courier_core::MsgStatus::Queued.to_string(),
            })
            .into_response()
        }
        Err(e) => {
            tracing::error!(channel_uuid = %channel.uuid, error = %e, "failed to queue message");
            error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// Parses a recipient given as a full URN or as a bare address.
fn recipient(raw: &str, scheme: &str, country: Option<&str>) -> Result<Urn, CourierError> {
    let urn = if raw.contains(':') {
        Urn::parse(raw.trim())?.normalize(country)
    } else {
        Urn::normalize_raw(raw, scheme, country)?
    };
    urn.validate()?;
    Ok(urn)
}
