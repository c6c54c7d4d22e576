// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel handler trait for provider integrations (Telegram, external APIs, etc.).

use std::collections::HashMap;

use async_trait::async_trait;

use crate::channel::Channel;
use crate::clog::ChannelLog;
use crate::error::{CourierError, ReceiveError, SendError};
use crate::msg::{Event, OutgoingMsg};
use crate::registry::RouteRegistrar;
use crate::status::MsgStatus;
use crate::traits::backend::Backend;
use crate::types::{ChannelType, HttpMethod};
use crate::urn::Urn;

/// An incoming webhook request, detached from the HTTP server.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl WebhookRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_form(&self) -> bool {
        self.header("content-type")
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
    }

    /// Query parameters followed by URL-encoded body fields.
    pub fn form(&self) -> Vec<(String, String)> {
        let mut fields = self.query.clone();
        if self.is_form() {
            fields.extend(
                url::form_urlencoded::parse(&self.body).map(|(k, v)| (k.into_owned(), v.into_owned())),
            );
        }
        fields
    }

    /// First value of `name` in [`WebhookRequest::form`].
    pub fn form_value(&self, name: &str) -> Option<String> {
        self.form()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn body_text(&self) -> Result<&str, ReceiveError> {
        std::str::from_utf8(&self.body).map_err(|_| ReceiveError::invalid("request body is not valid UTF-8"))
    }

    /// Deserializes a JSON body.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ReceiveError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ReceiveError::invalid(format!("unable to parse request JSON: {e}")))
    }
}

/// Everything a handler needs to process one webhook.
pub struct ReceiveContext<'a> {
    /// Last path segment, e.g. `receive` or `delivered`.
    pub action: &'a str,
    pub channel: &'a Channel,
    pub request: &'a WebhookRequest,
    pub backend: &'a dyn Backend,
}

/// Outcome of a successful send, filled in by the handler.
#[derive(Debug, Clone, PartialEq)]
pub struct SendResult {
    external_ids: Vec<String>,
    status: MsgStatus,
    new_urn: Option<Urn>,
}

impl Default for SendResult {
    fn default() -> Self {
        Self {
            external_ids: Vec::new(),
            status: MsgStatus::Wired,
            new_urn: None,
        }
    }
}

impl SendResult {
    pub fn add_external_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !id.is_empty() {
            self.external_ids.push(id);
        }
    }

    /// Marks the message as already sent to the contact, not just accepted.
    pub fn mark_sent(&mut self) {
        self.status = MsgStatus::Sent;
    }

    /// Records that the provider reported a new address for the contact.
    pub fn set_new_urn(&mut self, urn: Urn) {
        self.new_urn = Some(urn);
    }

    pub fn external_ids(&self) -> &[String] {
        &self.external_ids
    }

    pub fn status(&self) -> MsgStatus {
        self.status
    }

    pub fn new_urn(&self) -> Option<&Urn> {
        self.new_urn.as_ref()
    }
}

/// Integration with one messaging provider.
///
/// A handler is registered once per channel type, declares its webhook
/// routes at startup, and is then shared by all requests and send workers.
#[async_trait]
pub trait ChannelHandler: Send + Sync + 'static {
    /// Channel type code this handler serves, e.g. `TG`.
    fn channel_type(&self) -> ChannelType;

    /// Human-readable provider name.
    fn channel_name(&self) -> &str;

    /// Declares the webhook routes this handler answers.
    fn initialize(&self, routes: &mut RouteRegistrar<'_>) -> Result<(), CourierError>;

    /// Turns a webhook into events, writing them through `ctx.backend`.
    async fn receive(
        &self,
        ctx: ReceiveContext<'_>,
        clog: &mut ChannelLog,
    ) -> Result<Vec<Event>, ReceiveError>;

    /// Hands one message to the provider.
    async fn send(
        &self,
        channel: &Channel,
        msg: &OutgoingMsg,
        result: &mut SendResult,
        clog: &mut ChannelLog,
    ) -> Result<(), SendError>;

    /// Values to strip from this channel's logs.
    fn redact_values(&self, channel: &Channel) -> Vec<String> {
        channel.config.secret_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(content_type: &str, body: &str) -> WebhookRequest {
        WebhookRequest {
            method: HttpMethod::Post,
            url: "http://localhost/c/ex/x/receive?from=%2B250788383383".into(),
            headers: HashMap::from([("content-type".to_string(), content_type.to_string())]),
            query: vec![("from".into(), "+250788383383".into())],
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn form_merges_query_and_body() {
        let req = request("application/x-www-form-urlencoded", "text=hello+world&id=12");
        assert_eq!(req.form_value("from").as_deref(), Some("+250788383383"));
        assert_eq!(req.form_value("text").as_deref(), Some("hello world"));
        assert_eq!(req.form_value("missing"), None);
    }

    #[test]
    fn json_bodies_are_not_read_as_form() {
        let req = request("application/json", "{\"text\":\"hi\"}");
        assert_eq!(req.form_value("text"), None);
        let value: serde_json::Value = req.json().unwrap();
        assert_eq!(value["text"], "hi");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = request("application/json", "");
        assert_eq!(req.header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn send_result_defaults_to_wired() {
        let mut result = SendResult::default();
        assert_eq!(result.status(), MsgStatus::Wired);
        result.add_external_id("");
        result.add_external_id("ext-1");
        result.mark_sent();
        assert_eq!(result.external_ids(), ["ext-1".to_string()]);
        assert_eq!(result.status(), MsgStatus::Sent);
    }
}
