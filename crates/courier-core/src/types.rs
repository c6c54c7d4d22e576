// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common identifier types shared across the Courier workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::CourierError;

/// Unique identifier of a configured channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelUuid(pub Uuid);

impl ChannelUuid {
    pub fn new_v4() -> Self {
        ChannelUuid(Uuid::new_v4())
    }

    /// Parses a UUID from a path segment or config value.
    pub fn parse(s: &str) -> Result<Self, CourierError> {
        Uuid::parse_str(s.trim())
            .map(ChannelUuid)
            .map_err(|e| CourierError::Internal(format!("invalid channel uuid `{s}`: {e}")))
    }
}

impl fmt::Display for ChannelUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short uppercase code identifying a channel provider, e.g. `TG` or `EX`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ChannelType(String);

impl ChannelType {
    pub fn new(code: impl AsRef<str>) -> Self {
        ChannelType(code.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ChannelType {
    fn from(s: String) -> Self {
        ChannelType::new(s)
    }
}

impl From<&str> for ChannelType {
    fn from(s: &str) -> Self {
        ChannelType::new(s)
    }
}

impl From<ChannelType> for String {
    fn from(t: ChannelType) -> Self {
        t.0
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Database identifier of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MsgId(pub i64);

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MsgId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(MsgId)
    }
}

/// HTTP methods a channel handler can declare routes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

/// Health status reported by backend health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Backend is fully operational.
    Healthy,
    /// Backend is operational but experiencing issues.
    Degraded(String),
    /// Backend is not operational.
    Unhealthy(String),
}
