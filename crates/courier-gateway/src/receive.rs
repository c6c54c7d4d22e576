// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel webhooks: `/<mount>/<type>/<uuid>/<action>`.
//!
//! The request is matched against the routes handlers declared at startup,
//! the channel is loaded, and the handler turns the request into events.
//! Every handled request leaves a channel log, including the ones that
//! fail validation.

use std::collections::HashMap;
use std::time::Instant;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

use courier_core::{
    ChannelLog, ChannelLogType, ChannelType, ChannelUuid, CourierError, Event, HttpMethod,
    HttpTrace, ReceiveContext, ReceiveError, WebhookRequest,
};

use crate::server::GatewayState;

/// Body of every webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub message: String,
    pub data: Vec<Value>,
}

impl WebhookResponse {
    fn new(message: impl Into<String>, data: Vec<Value>) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }

    fn error(message: &str) -> Self {
        Self::new("Error", vec![json!({"type": "error", "error": message})])
    }

    fn info(message: &str) -> Self {
        Self::new("Ignored", vec![json!({"type": "info", "info": message})])
    }
}

fn reply(status: StatusCode, body: WebhookResponse) -> Response {
    (status, Json(body)).into_response()
}

/// Any method on a channel route.
pub async fn handle_webhook(
    State(state): State<GatewayState>,
    Path((raw_type, raw_uuid, action)): Path<(String, String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let channel_type = ChannelType::new(&raw_type);

    let Some(handler) = state.registry.get(&channel_type) else {
        return reply(StatusCode::NOT_FOUND, WebhookResponse::error("unknown channel type"));
    };
    let route_method = method.as_str().parse::<HttpMethod>().ok();
    let routed = route_method
        .is_some_and(|m| state.registry.has_route(&channel_type, m, &action));
    let (Some(route_method), true) = (route_method, routed) else {
        return reply(StatusCode::NOT_FOUND, WebhookResponse::error("no such route"));
    };
    let Ok(uuid) = ChannelUuid::parse(&raw_uuid) else {
        return reply(StatusCode::NOT_FOUND, WebhookResponse::error("channel not found"));
    };

    let channel = match state.backend.get_channel(&channel_type, &uuid).await {
        Ok(channel) => channel,
        Err(CourierError::ChannelNotFound { .. }) => {
            tracing::debug!(channel_type = %channel_type, channel_uuid = %uuid, "webhook for unknown channel");
            return reply(StatusCode::NOT_FOUND, WebhookResponse::error("channel not found"));
        }
        Err(e) => {
            tracing::error!(channel_uuid = %uuid, error = %e, "channel lookup failed");
            return reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                WebhookResponse::error("internal error"),
            );
        }
    };

    let request = WebhookRequest {
        method: route_method,
        url: uri.to_string(),
        headers: header_map(&headers),
        query: uri.query().map(url_decode_pairs).unwrap_or_default(),
        body: body.to_vec(),
    };

    let mut clog = ChannelLog::new(
        ChannelLogType::Unknown,
        Some(&channel),
        &handler.redact_values(&channel),
    );
    let ctx = ReceiveContext {
        action: &action,
        channel: &channel,
        request: &request,
        backend: state.backend.as_ref(),
    };
    let result = handler.receive(ctx, &mut clog).await;

    let (status, response) = match result {
        Ok(events) => {
            if clog.log_type == ChannelLogType::Unknown {
                match events.first() {
                    Some(Event::Msg(_)) => clog.set_type(ChannelLogType::MsgReceive),
                    Some(Event::Status(_)) => clog.set_type(ChannelLogType::MsgStatus),
                    None => {}
                }
            }
            tracing::info!(
                channel_uuid = %channel.uuid,
                channel_type = %channel_type,
                action = %action,
                events = events.len(),
                "webhook handled"
            );
            (StatusCode::OK, accepted(&events))
        }
        Err(ReceiveError::Ignored(reason)) => {
            tracing::debug!(channel_uuid = %channel.uuid, reason = %reason, "webhook ignored");
            (StatusCode::OK, WebhookResponse::info(&reason))
        }
        Err(ReceiveError::Invalid(reason)) => {
            tracing::info!(channel_uuid = %channel.uuid, reason = %reason, "webhook rejected");
            clog.error("invalid_request", None, &reason);
            (StatusCode::BAD_REQUEST, WebhookResponse::error(&reason))
        }
        Err(ReceiveError::Unauthorized(reason)) => {
            tracing::info!(channel_uuid = %channel.uuid, reason = %reason, "webhook unauthorized");
            clog.error("unauthorized", None, &reason);
            (StatusCode::UNAUTHORIZED, WebhookResponse::error(&reason))
        }
        Err(ReceiveError::Backend(e)) => {
            tracing::error!(channel_uuid = %channel.uuid, error = %e, "webhook could not be stored");
            clog.error("internal", None, &e.to_string());
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                WebhookResponse::error("internal error"),
            )
        }
    };

    let response_body = serde_json::to_vec(&response).unwrap_or_default();
    clog.record_http(HttpTrace {
        method: method.to_string(),
        url: request.url.clone(),
        status_code: Some(status.as_u16()),
        request: request.body.clone(),
        response: response_body,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    });
    clog.end();
    if let Err(e) = state.backend.write_channel_log(&clog).await {
        tracing::error!(channel_uuid = %channel.uuid, error = %e, "failed to write channel log");
    }

    reply(status, response)
}

fn accepted(events: &[Event]) -> WebhookResponse {
    let message = match events {
        [] => "Ignored",
        [Event::Msg(_)] => "Message Accepted",
        [Event::Status(_)] => "Status Update Accepted",
        _ => "Events Handled",
    };
    WebhookResponse::new(message, events.iter().map(event_json).collect())
}

fn event_json(event: &Event) -> Value {
    match event {
        Event::Msg(msg) => json!({
            "type": "msg",
            "channel_uuid": msg.channel_uuid,
            "msg_uuid": msg.uuid,
            "text": msg.text,
            "urn": msg.urn,
            "external_id": msg.external_id,
            "attachments": msg.attachments,
            "received_on": msg.received_on,
        }),
        Event::Status(update) => json!({
            "type": "status",
            "channel_uuid": update.channel_uuid,
            "msg_id": update.msg_id,
            "external_id": update.external_id,
            "status": update.status,
        }),
    }
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

fn url_decode_pairs(query: &str) -> Vec<(String, String)> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(query).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{Channel, IncomingMsg, MsgId, MsgStatus, StatusUpdate, Urn};

    fn channel() -> Channel {
        Channel::new(ChannelUuid::new_v4(), ChannelType::new("EX"), "2020")
    }

    #[test]
    fn accepted_message_names_the_event() {
        let channel = channel();
        let urn = Urn::parse("tel:+250788383383").unwrap();
        let msg = IncomingMsg::new(&channel, urn, "hi");
        let status = StatusUpdate::for_msg(&channel, MsgId(4), MsgStatus::Delivered);

        assert_eq!(accepted(&[Event::Msg(msg.clone())]).message, "Message Accepted");
        assert_eq!(accepted(&[Event::Status(status.clone())]).message, "Status Update Accepted");
        let both = accepted(&[Event::Msg(msg), Event::Status(status)]);
        assert_eq!(both.message, "Events Handled");
        assert_eq!(both.data[1]["status"], "D");
        assert_eq!(both.data[0]["urn"], "tel:+250788383383");
    }

    #[test]
    fn query_pairs_are_decoded() {
        assert_eq!(
            url_decode_pairs("from=%2B250788383383&text=hi+there"),
            vec![
                ("from".to_string(), "+250788383383".to_string()),
                ("text".to_string(), "hi there".to_string()),
            ]
        );
    }
}
