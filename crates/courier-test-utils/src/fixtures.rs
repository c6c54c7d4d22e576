// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ready-made channels, URNs and webhook requests.

use std::collections::HashMap;

use courier_core::{Channel, ChannelType, ChannelUuid, HttpMethod, Urn, WebhookRequest};

/// A Rwandan channel of type `code` with a fresh UUID.
pub fn channel(code: &str) -> Channel {
    Channel::new(ChannelUuid::new_v4(), ChannelType::new(code), "2020").with_country("RW")
}

pub fn tel_urn() -> Urn {
    Urn::parse("tel:+250788383383").expect("valid fixture URN")
}

/// A webhook request with a body of the given content type.
pub fn request(method: HttpMethod, url: &str, content_type: &str, body: &str) -> WebhookRequest {
    let query = url
        .split_once('?')
        .map(|(_, q)| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default();
    WebhookRequest {
        method,
        url: url.to_string(),
        headers: HashMap::from([("content-type".to_string(), content_type.to_string())]),
        query,
        body: body.as_bytes().to_vec(),
    }
}

pub fn form_request(url: &str, body: &str) -> WebhookRequest {
    request(HttpMethod::Post, url, "application/x-www-form-urlencoded", body)
}

pub fn json_request(url: &str, body: &str) -> WebhookRequest {
    request(HttpMethod::Post, url, "application/json", body)
}
