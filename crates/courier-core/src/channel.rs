// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configured channels and their typed config lookup.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CourierError;
use crate::types::{ChannelType, ChannelUuid};

pub const CONFIG_AUTH_TOKEN: &str = "auth_token";
pub const CONFIG_API_KEY: &str = "api_key";
pub const CONFIG_USERNAME: &str = "username";
pub const CONFIG_PASSWORD: &str = "password";
pub const CONFIG_SECRET: &str = "secret";
pub const CONFIG_SEND_URL: &str = "send_url";
pub const CONFIG_SEND_METHOD: &str = "send_method";
pub const CONFIG_BASE_URL: &str = "base_url";

/// Keys whose values are credentials and must never reach a channel log.
const SECRET_KEYS: &[&str] = &[CONFIG_AUTH_TOKEN, CONFIG_API_KEY, CONFIG_PASSWORD, CONFIG_SECRET];

/// A configured endpoint of one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub uuid: ChannelUuid,
    pub channel_type: ChannelType,
    #[serde(default)]
    pub name: String,
    /// Provider-side address: a phone number, bot username, short code...
    #[serde(default)]
    pub address: String,
    /// ISO 3166-1 alpha-2 code used to normalize local phone numbers.
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default = "default_schemes")]
    pub schemes: Vec<String>,
    #[serde(default)]
    pub config: ChannelConfig,
}

fn default_schemes() -> Vec<String> {
    vec!["tel".to_string()]
}

impl Channel {
    pub fn new(uuid: ChannelUuid, channel_type: ChannelType, address: impl Into<String>) -> Self {
        Self {
            uuid,
            channel_type,
            name: String::new(),
            address: address.into(),
            country: None,
            schemes: default_schemes(),
            config: ChannelConfig::default(),
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into().to_ascii_uppercase());
        self
    }

    pub fn with_schemes(mut self, schemes: &[&str]) -> Self {
        self.schemes = schemes.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_config(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.config.0.insert(key.to_string(), value.into());
        self
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref().filter(|c| !c.is_empty())
    }

    /// The scheme assumed for bare addresses arriving on this channel.
    pub fn primary_scheme(&self) -> &str {
        self.schemes.first().map(String::as_str).unwrap_or("tel")
    }
}

/// Free-form per-channel configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelConfig(HashMap<String, Value>);

impl ChannelConfig {
    /// Reads `key` as `T`. Missing, null and blank keys are `Ok(None)`, type
    /// mismatches are errors.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CourierError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| CourierError::channel_config(key, format!("wrong type: {e}"))),
        }
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, CourierError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Reads a key the handler cannot work without.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, CourierError> {
        self.get(key)?
            .ok_or_else(|| CourierError::channel_config(key, "missing required key"))
    }

    /// String value of `key`, or `None` when missing, blank or not a string.
    pub fn string(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Values of credential keys, for log redaction.
    pub fn secret_values(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|(k, _)| SECRET_KEYS.contains(&k.as_str()))
            .filter_map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, Value>> for ChannelConfig {
    fn from(map: HashMap<String, Value>) -> Self {
        ChannelConfig(map)
    }
}
