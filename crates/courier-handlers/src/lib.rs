// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in channel handlers for the Courier messaging gateway.
//!
//! Every handler shares one pooled [`HttpClient`], so connection limits and
//! timeouts apply across all providers together.

pub mod external;
pub mod http;
pub mod telegram;
pub mod webhook;

use std::sync::Arc;

use courier_config::model::{HandlersConfig, HttpConfig};
use courier_core::{ChannelHandler, CourierError, HandlerRegistry};

pub use external::ExternalHandler;
pub use http::{HttpClient, HttpResponse};
pub use telegram::TelegramHandler;

/// One instance of every handler shipped with Courier.
pub fn builtin_handlers(http: &HttpClient) -> Vec<Arc<dyn ChannelHandler>> {
    vec![
        Arc::new(ExternalHandler::new(http.clone())),
        Arc::new(TelegramHandler::new(http.clone())),
    ]
}

/// Builds the frozen registry of enabled handlers.
pub fn build_registry(
    handlers: &HandlersConfig,
    http: &HttpConfig,
) -> Result<HandlerRegistry, CourierError> {
    let client = HttpClient::new(http)?;
    let mut builder = HandlerRegistry::builder();
    for handler in builtin_handlers(&client) {
        builder.register(handler)?;
    }
    builder
        .include(&handlers.include)
        .exclude(&handlers.exclude)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{ChannelType, HttpMethod};

    #[test]
    fn registry_has_builtin_routes() {
        let registry = build_registry(&HandlersConfig::default(), &HttpConfig::default()).unwrap();
        assert_eq!(
            registry.channel_types(),
            vec![ChannelType::new("EX"), ChannelType::new("TG")]
        );
        let ex = ChannelType::new("EX");
        assert!(registry.has_route(&ex, HttpMethod::Post, "receive"));
        assert!(registry.has_route(&ex, HttpMethod::Get, "delivered"));
        assert!(registry.has_route(&ChannelType::new("TG"), HttpMethod::Post, "receive"));
        assert!(!registry.has_route(&ChannelType::new("TG"), HttpMethod::Get, "receive"));
    }

    #[test]
    fn exclude_disables_a_handler() {
        let handlers = HandlersConfig {
            include: Vec::new(),
            exclude: vec!["tg".into()],
        };
        let registry = build_registry(&handlers, &HttpConfig::default()).unwrap();
        assert_eq!(registry.channel_types(), vec![ChannelType::new("EX")]);
    }
}
