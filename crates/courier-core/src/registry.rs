// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry of channel handlers and the webhook routes they declare.
//!
//! Handlers are collected by a [`HandlerRegistryBuilder`] at startup. Building
//! runs each handler's `initialize`, detects duplicate channel types and
//! conflicting routes, and freezes the result into a [`HandlerRegistry`]
//! that is shared read-only from then on.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::CourierError;
use crate::traits::handler::ChannelHandler;
use crate::types::{ChannelType, HttpMethod};

/// A webhook route: `<method> /<mount>/<type>/<uuid>/<action>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerRoute {
    pub channel_type: ChannelType,
    pub method: HttpMethod,
    pub action: String,
}

/// Route table handed to a handler's `initialize`.
pub struct RouteRegistrar<'a> {
    channel_type: ChannelType,
    routes: &'a mut HashSet<HandlerRoute>,
}

impl<'a> RouteRegistrar<'a> {
    fn new(channel_type: ChannelType, routes: &'a mut HashSet<HandlerRoute>) -> Self {
        Self {
            channel_type,
            routes,
        }
    }

    /// Declares a route. The same method and action twice is a conflict.
    pub fn add(&mut self, method: HttpMethod, action: &str) -> Result<(), CourierError> {
        let route = HandlerRoute {
            channel_type: self.channel_type.clone(),
            method,
            action: action.trim_matches('/').to_string(),
        };
        if route.action.is_empty() || route.action.contains('/') {
            return Err(CourierError::Config(format!(
                "invalid route action `{action}` for channel type {}",
                self.channel_type
            )));
        }
        if !self.routes.insert(route.clone()) {
            return Err(CourierError::RouteConflict {
                channel_type: route.channel_type.to_string(),
                method: method.to_string(),
                action: route.action,
            });
        }
        Ok(())
    }
}

/// Collects handlers before the registry is frozen.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: Vec<Arc<dyn ChannelHandler>>,
    include: Vec<ChannelType>,
    exclude: Vec<ChannelType>,
}

impl HandlerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ChannelHandler>) -> Result<(), CourierError> {
        let channel_type = handler.channel_type();
        if self.handlers.iter().any(|h| h.channel_type() == channel_type) {
            return Err(CourierError::DuplicateHandler(channel_type.to_string()));
        }
        self.handlers.push(handler);
        Ok(())
    }

    /// Only enable these channel types. Empty means all.
    pub fn include(mut self, types: &[String]) -> Self {
        self.include = types.iter().map(ChannelType::new).collect();
        self
    }

    /// Never enable these channel types, even when included.
    pub fn exclude(mut self, types: &[String]) -> Self {
        self.exclude = types.iter().map(ChannelType::new).collect();
        self
    }

    fn enabled(&self, channel_type: &ChannelType) -> bool {
        (self.include.is_empty() || self.include.contains(channel_type))
            && !self.exclude.contains(channel_type)
    }

    pub fn build(self) -> Result<HandlerRegistry, CourierError> {
        let mut handlers = HashMap::new();
        let mut routes = HashSet::new();

        for handler in &self.handlers {
            let channel_type = handler.channel_type();
            if !self.enabled(&channel_type) {
                debug!(channel_type = %channel_type, "handler disabled by configuration");
                continue;
            }
            let mut registrar = RouteRegistrar::new(channel_type.clone(), &mut routes);
            handler.initialize(&mut registrar)?;
            info!(
                channel_type = %channel_type,
                name = handler.channel_name(),
                "channel handler registered"
            );
            handlers.insert(channel_type, Arc::clone(handler));
        }

        Ok(HandlerRegistry { handlers, routes })
    }
}

/// Frozen handler lookup, shared by the gateway and the sender.
pub struct HandlerRegistry {
    handlers: HashMap<ChannelType, Arc<dyn ChannelHandler>>,
    routes: HashSet<HandlerRoute>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::new()
    }

    pub fn get(&self, channel_type: &ChannelType) -> Option<Arc<dyn ChannelHandler>> {
        self.handlers.get(channel_type).cloned()
    }

    pub fn has_route(&self, channel_type: &ChannelType, method: HttpMethod, action: &str) -> bool {
        self.routes.contains(&HandlerRoute {
            channel_type: channel_type.clone(),
            method,
            action: action.to_string(),
        })
    }

    /// All routes, sorted for display.
    pub fn routes(&self) -> Vec<HandlerRoute> {
        let mut routes: Vec<HandlerRoute> = self.routes.iter().cloned().collect();
        routes.sort_by(|a, b| {
            (a.channel_type.as_str(), a.action.as_str(), a.method.to_string())
                .cmp(&(b.channel_type.as_str(), b.action.as_str(), b.method.to_string()))
        });
        routes
    }

    pub fn channel_types(&self) -> Vec<ChannelType> {
        let mut types: Vec<ChannelType> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("channel_types", &self.channel_types())
            .field("routes", &self.routes.len())
            .finish()
    }
}
