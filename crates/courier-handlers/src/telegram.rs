// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram (`TG`) channels via the Bot API.
//!
//! Telegram posts each update to the channel's `receive` webhook as JSON.
//! Photos, videos, voice notes and documents are resolved to downloadable
//! URLs through `getFile`; locations become `geo:` attachments.
//!
//! Sends go through `sendMessage`, or `sendPhoto`/`sendVideo`/`sendAudio`/
//! `sendDocument` for attachments, with the text as caption of the first.
//! Each part is a separate API call. Once one part is delivered the message
//! is never retried, so a failure part way through drops the remaining parts
//! instead of duplicating the delivered ones.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, warn};

use courier_core::channel::{CONFIG_AUTH_TOKEN, CONFIG_BASE_URL};
use courier_core::msg::split_attachment;
use courier_core::{
    Channel, ChannelHandler, ChannelLog, ChannelType, CourierError, Event, HttpMethod,
    OutgoingMsg, ReceiveContext, ReceiveError, RouteRegistrar, SendError, SendResult,
};

use crate::http::HttpClient;
use crate::webhook;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct Update {
    #[serde(default)]
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    from: TgUser,
    date: i64,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    photo: Vec<TgFile>,
    #[serde(default)]
    video: Option<TgFile>,
    #[serde(default)]
    voice: Option<TgFile>,
    #[serde(default)]
    document: Option<TgFile>,
    #[serde(default)]
    location: Option<TgLocation>,
    #[serde(default)]
    contact: Option<TgContact>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

impl TgUser {
    fn full_name(&self) -> Option<String> {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        (!name.is_empty()).then_some(name)
    }
}

#[derive(Debug, Deserialize)]
struct TgFile {
    file_id: String,
    #[serde(default)]
    file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TgLocation {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct TgContact {
    phone_number: String,
    #[serde(default)]
    first_name: Option<String>,
}

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

pub struct TelegramHandler {
    http: HttpClient,
    api_url: String,
}

impl TelegramHandler {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Points the handler at another Bot API host.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url<'a>(&'a self, channel: &'a Channel) -> &'a str {
        channel
            .config
            .string(CONFIG_BASE_URL)
            .map(|u| u.trim_end_matches('/'))
            .unwrap_or(&self.api_url)
    }

    /// Resolves a file id to a download URL.
    async fn file_url(
        &self,
        channel: &Channel,
        token: &str,
        file_id: &str,
        clog: &mut ChannelLog,
    ) -> Result<String, SendError> {
        let base = self.api_url(channel);
        let builder = self.http.form(
            Method::POST,
            &format!("{base}/bot{token}/getFile"),
            &[("file_id", file_id)],
        )?;
        let response = self.http.execute(builder, clog).await?;
        response.error_for_status()?;
        let info: ApiResponse<FileInfo> = response.json()?;
        match info.result.and_then(|r| r.file_path) {
            Some(path) if info.ok => Ok(format!("{base}/file/bot{token}/{path}")),
            _ => Err(SendError::ResponseUnexpected("no file_path in getFile response".into())),
        }
    }

    async fn post(
        &self,
        channel: &Channel,
        token: &str,
        method: &str,
        form: &[(&str, &str)],
        clog: &mut ChannelLog,
    ) -> Result<String, SendError> {
        let url = format!("{}/bot{token}/{method}", self.api_url(channel));
        let builder = self.http.form(Method::POST, &url, form)?;
        let response = self.http.execute(builder, clog).await?;

        let Ok(body) = response.json::<ApiResponse<SentMessage>>() else {
            response.error_for_status()?;
            return Err(SendError::ResponseUnparseable(format!(
                "{method} returned a non-JSON body"
            )));
        };
        if body.ok {
            return body
                .result
                .map(|r| r.message_id.to_string())
                .ok_or_else(|| SendError::ResponseUnexpected("result.message_id".into()));
        }

        let code = body.error_code.unwrap_or(response.status);
        let description = body.description.unwrap_or_default();
        match code {
            429 => Err(SendError::Throttled),
            500..=599 => Err(SendError::ConnectionFailed(format!(
                "telegram responded with {code}: {description}"
            ))),
            403 if description.contains("bot was blocked by the user") => {
                Err(SendError::ContactStopped)
            }
            _ => Err(SendError::FailedWithReason {
                code: code.to_string(),
                description,
            }),
        }
    }
}

fn media_method(mime: Option<&str>) -> (&'static str, &'static str) {
    match mime.and_then(|m| m.split('/').next()) {
        Some("image") => ("sendPhoto", "photo"),
        Some("video") => ("sendVideo", "video"),
        Some("audio") => ("sendAudio", "audio"),
        _ => ("sendDocument", "document"),
    }
}

#[async_trait]
impl ChannelHandler for TelegramHandler {
    fn channel_type(&self) -> ChannelType {
        ChannelType::new("TG")
    }

    fn channel_name(&self) -> &str {
        "Telegram"
    }

    fn initialize(&self, routes: &mut RouteRegistrar<'_>) -> Result<(), CourierError> {
        routes.add(HttpMethod::Post, "receive")
    }

    async fn receive(
        &self,
        ctx: ReceiveContext<'_>,
        clog: &mut ChannelLog,
    ) -> Result<Vec<Event>, ReceiveError> {
        let update: Update = ctx.request.json()?;
        let Some(message) = update.message else {
            return Err(ReceiveError::ignored("Ignoring request, no message"));
        };

        let mut text = message
            .text
            .clone()
            .or_else(|| message.caption.clone())
            .unwrap_or_default();
        if text.trim() == "/start" {
            debug!(channel_uuid = %ctx.channel.uuid, "telegram conversation started");
            return Err(ReceiveError::ignored("Ignoring /start command"));
        }

        let mut attachments = Vec::new();
        let file_id = message
            .photo
            .iter()
            .max_by_key(|p| p.file_size.unwrap_or_default())
            .or(message.video.as_ref())
            .or(message.voice.as_ref())
            .or(message.document.as_ref())
            .map(|f| f.file_id.clone());
        if let Some(file_id) = file_id {
            let token: String = ctx
                .channel
                .config
                .get(CONFIG_AUTH_TOKEN)
                .map_err(|e| ReceiveError::invalid(e.to_string()))?
                .ok_or_else(|| ReceiveError::invalid("channel has no auth token to resolve media"))?;
            let url = self
                .file_url(ctx.channel, &token, &file_id, clog)
                .await
                .map_err(|e| ReceiveError::invalid(format!("unable to resolve file: {e}")))?;
            attachments.push(url);
        }
        if let Some(location) = &message.location {
            attachments.push(format!("geo:{:.6},{:.6}", location.latitude, location.longitude));
        }
        if let Some(contact) = &message.contact {
            text = match &contact.first_name {
                Some(name) => format!("{name} ({})", contact.phone_number),
                None => contact.phone_number.clone(),
            };
        }
        if text.is_empty() && attachments.is_empty() {
            return Err(ReceiveError::ignored("Ignoring request, no message"));
        }

        let urn = webhook::sender_urn_with_scheme(ctx.channel, "telegram", &message.from.id.to_string())?
            .with_display(message.from.username.as_deref());
        let received_on = DateTime::<Utc>::from_timestamp(message.date, 0).unwrap_or_else(Utc::now);
        let mut msg = ctx
            .backend
            .new_incoming_msg(ctx.channel, urn, &text)
            .with_external_id(message.message_id.to_string())
            .with_received_on(received_on);
        if let Some(name) = message.from.full_name() {
            msg = msg.with_contact_name(name);
        }
        for attachment in attachments {
            msg = msg.with_attachment(attachment);
        }
        Ok(vec![webhook::write_msg(&ctx, clog, msg).await?])
    }

    async fn send(
        &self,
        channel: &Channel,
        msg: &OutgoingMsg,
        result: &mut SendResult,
        clog: &mut ChannelLog,
    ) -> Result<(), SendError> {
        let token: String = channel.config.require(CONFIG_AUTH_TOKEN)?;
        let chat_id = msg.urn.path();

        let mut parts = Vec::new();
        let mut caption = Some(msg.text.as_str()).filter(|t| !t.is_empty());
        for attachment in &msg.attachments {
            let (mime, url) = split_attachment(attachment);
            let (method, field) = media_method(mime);
            let mut form = vec![("chat_id", chat_id), (field, url)];
            if let Some(text) = caption.take() {
                form.push(("caption", text));
            }
            parts.push((method, form));
        }
        if let Some(text) = caption {
            parts.push(("sendMessage", vec![("chat_id", chat_id), ("text", text)]));
        }

        for (method, form) in &parts {
            match self.post(channel, &token, method, form, clog).await {
                Ok(id) => result.add_external_id(id),
                // A retry would post the delivered parts again, so a message
                // that is partly out counts as sent and the gap is logged.
                Err(e) if !result.external_ids().is_empty() => {
                    warn!(
                        channel_uuid = %channel.uuid,
                        msg_id = %msg.id,
                        method = *method,
                        error = %e,
                        "telegram message partly sent, remaining parts dropped"
                    );
                    clog.send_error(&e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        result.mark_sent();
        Ok(())
    }
}
