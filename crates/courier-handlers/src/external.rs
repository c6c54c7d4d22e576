// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! External (`EX`) channels: any HTTP service speaking a simple form protocol.
//!
//! Incoming messages arrive as `from`/`sender`, `text`, optional `date` and
//! `id` fields, in the query string or a URL-encoded body. Delivery receipts
//! hit `sent`, `delivered` or `failed` with the courier message `id`.
//!
//! Sends fill the channel's `send_url` and `send_body` templates. Template
//! variables are `{{id}}`, `{{text}}`, `{{to}}`, `{{to_no_plus}}`,
//! `{{from}}`, `{{from_no_plus}}` and `{{channel}}`.

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

use courier_core::channel::{CONFIG_SEND_METHOD, CONFIG_SEND_URL};
use courier_core::{
    Channel, ChannelHandler, ChannelLog, ChannelType, CourierError, Event, HttpMethod, MsgId,
    MsgStatus, OutgoingMsg, ReceiveContext, ReceiveError, RouteRegistrar, SendError, SendResult,
};

use crate::http::{CONTENT_TYPE_FORM, CONTENT_TYPE_JSON, HttpClient};
use crate::webhook;

pub const CONFIG_SEND_BODY: &str = "send_body";
pub const CONFIG_CONTENT_TYPE: &str = "content_type";
pub const CONFIG_MT_RESPONSE_CHECK: &str = "mt_response_check";
pub const CONFIG_SEND_AUTHORIZATION: &str = "send_authorization";

const DEFAULT_SEND_BODY: &str = "id={{id}}&text={{text}}&to={{to}}&to_no_plus={{to_no_plus}}&from={{from}}&from_no_plus={{from_no_plus}}&channel={{channel}}";

const STATUS_ACTIONS: [&str; 3] = ["sent", "delivered", "failed"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyEncoding {
    Form,
    Json,
}

impl BodyEncoding {
    fn from_config(value: Option<&str>) -> Result<Self, SendError> {
        match value.map(str::to_ascii_lowercase).as_deref() {
            None | Some("urlencoded") | Some("form") => Ok(BodyEncoding::Form),
            Some("json") => Ok(BodyEncoding::Json),
            Some(other) => Err(SendError::ChannelConfig(format!(
                "{CONFIG_CONTENT_TYPE}: unsupported content type `{other}`"
            ))),
        }
    }

    fn content_type(self) -> &'static str {
        match self {
            BodyEncoding::Form => CONTENT_TYPE_FORM,
            BodyEncoding::Json => CONTENT_TYPE_JSON,
        }
    }

    fn encode(self, value: &str) -> String {
        match self {
            BodyEncoding::Form => url_encode(value),
            // Quoted and escaped, so templates read `{"text": {{text}}}`.
            BodyEncoding::Json => serde_json::Value::from(value).to_string(),
        }
    }
}

fn url_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Replaces every `{{name}}` in `template` with its encoded value. Unknown
/// names are kept as written. Substituted values are never rescanned.
fn render(template: &str, vars: &[(&str, String)], encode: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let var = after.find("}}").and_then(|end| {
            let name = &after[..end];
            vars.iter()
                .find(|(n, _)| *n == name)
                .map(|(_, value)| (end, value))
        });
        match var {
            Some((end, value)) => {
                out.push_str(&encode(value));
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

pub struct ExternalHandler {
    http: HttpClient,
}

impl ExternalHandler {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    async fn receive_msg(
        &self,
        ctx: &ReceiveContext<'_>,
        clog: &mut ChannelLog,
    ) -> Result<Vec<Event>, ReceiveError> {
        let req = ctx.request;
        let from = req
            .form_value("from")
            .or_else(|| req.form_value("sender"))
            .ok_or_else(|| ReceiveError::invalid("must have one of 'sender' or 'from' set"))?;
        let text = req.form_value("text").unwrap_or_default();

        let urn = webhook::sender_urn(ctx.channel, &from)?;
        let mut msg = ctx.backend.new_incoming_msg(ctx.channel, urn, &text);
        if let Some(id) = req.form_value("id") {
            msg = msg.with_external_id(id);
        }
        if let Some(date) = req.form_value("date").or_else(|| req.form_value("time")) {
            msg = msg.with_received_on(webhook::parse_timestamp(&date)?);
        }
        Ok(vec![webhook::write_msg(ctx, clog, msg).await?])
    }

    async fn receive_status(
        &self,
        ctx: &ReceiveContext<'_>,
        clog: &mut ChannelLog,
    ) -> Result<Vec<Event>, ReceiveError> {
        let status = MsgStatus::from_receipt(ctx.action)
            .ok_or_else(|| ReceiveError::invalid(format!("unknown status action `{}`", ctx.action)))?;
        let id = ctx
            .request
            .form_value("id")
            .ok_or_else(|| ReceiveError::invalid("field 'id' required"))?;
        let id: MsgId = id
            .trim()
            .parse()
            .map_err(|_| ReceiveError::invalid(format!("invalid message id: {id}")))?;

        let update = ctx.backend.new_status_update(ctx.channel, id, status);
        Ok(vec![webhook::write_status(ctx, clog, update).await?])
    }
}

#[async_trait]
impl ChannelHandler for ExternalHandler {
    fn channel_type(&self) -> ChannelType {
        ChannelType::new("EX")
    }

    fn channel_name(&self) -> &str {
        "External API"
    }

    fn initialize(&self, routes: &mut RouteRegistrar<'_>) -> Result<(), CourierError> {
        for method in [HttpMethod::Get, HttpMethod::Post] {
            routes.add(method, "receive")?;
            for action in STATUS_ACTIONS {
                routes.add(method, action)?;
            }
        }
        Ok(())
    }

    async fn receive(
        &self,
        ctx: ReceiveContext<'_>,
        clog: &mut ChannelLog,
    ) -> Result<Vec<Event>, ReceiveError> {
        if ctx.action == "receive" {
            self.receive_msg(&ctx, clog).await
        } else {
            self.receive_status(&ctx, clog).await
        }
    }

    async fn send(
        &self,
        channel: &Channel,
        msg: &OutgoingMsg,
        _result: &mut SendResult,
        clog: &mut ChannelLog,
    ) -> Result<(), SendError> {
        let config = &channel.config;
        let send_url: String = config.require(CONFIG_SEND_URL)?;
        let method = match config.get::<String>(CONFIG_SEND_METHOD)? {
            None => HttpMethod::Post,
            Some(m) => m.parse().map_err(|_| {
                SendError::ChannelConfig(format!("{CONFIG_SEND_METHOD}: unsupported method `{m}`"))
            })?,
        };
        let encoding =
            BodyEncoding::from_config(config.get::<String>(CONFIG_CONTENT_TYPE)?.as_deref())?;
        let template: String = config.get_or(CONFIG_SEND_BODY, DEFAULT_SEND_BODY.to_string())?;
        let authorization: Option<String> = config.get(CONFIG_SEND_AUTHORIZATION)?;
        let response_check: Option<String> = config.get(CONFIG_MT_RESPONSE_CHECK)?;

        let mut text = msg.text.clone();
        for attachment in &msg.attachments {
            let (_, url) = courier_core::msg::split_attachment(attachment);
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(url);
        }
        let to = msg.urn.path().to_string();
        let vars = [
            ("id", msg.id.to_string()),
            ("text", text),
            ("to_no_plus", to.trim_start_matches('+').to_string()),
            ("to", to),
            ("from_no_plus", channel.address.trim_start_matches('+').to_string()),
            ("from", channel.address.clone()),
            ("channel", channel.uuid.to_string()),
        ];

        let url = render(&send_url, &vars, url_encode);
        let mut builder = match method {
            HttpMethod::Get => self.http.request(Method::GET, &url),
            HttpMethod::Post | HttpMethod::Put => {
                let body = render(&template, &vars, |v| encoding.encode(v));
                let method = if method == HttpMethod::Put { Method::PUT } else { Method::POST };
                self.http
                    .request(method, &url)
                    .header(CONTENT_TYPE, encoding.content_type())
                    .body(body)
            }
        };
        if let Some(auth) = &authorization {
            builder = builder.header(AUTHORIZATION, auth.as_str());
        }

        let response = self.http.execute(builder, clog).await?;
        response.error_for_status()?;

        if let Some(check) = &response_check
            && !response.text().contains(check.as_str())
        {
            return Err(SendError::ResponseContent(format!(
                "received invalid response content, expected `{check}`"
            )));
        }
        Ok(())
    }

    fn redact_values(&self, channel: &Channel) -> Vec<String> {
        let mut values = channel.config.secret_values();
        if let Some(auth) = channel.config.string(CONFIG_SEND_AUTHORIZATION) {
            values.push(auth.to_string());
        }
        values
    }
}
