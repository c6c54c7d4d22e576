// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers shared by handlers when turning a webhook into stored events.

use chrono::{DateTime, NaiveDateTime, Utc};
use courier_core::{
    Channel, ChannelLog, ChannelLogType, Event, IncomingMsg, ReceiveContext, ReceiveError,
    StatusUpdate, Urn, WriteOutcome,
};
use tracing::{debug, info};

/// Normalizes a sender address for `channel`, using its primary scheme and country.
pub fn sender_urn(channel: &Channel, raw: &str) -> Result<Urn, ReceiveError> {
    sender_urn_with_scheme(channel, channel.primary_scheme(), raw)
}

pub fn sender_urn_with_scheme(
    channel: &Channel,
    scheme: &str,
    raw: &str,
) -> Result<Urn, ReceiveError> {
    if raw.trim().is_empty() {
        return Err(ReceiveError::invalid("sender address is empty"));
    }
    Urn::normalize_raw(raw, scheme, channel.country())
        .map_err(|e| ReceiveError::invalid(e.to_string()))
}

/// Parses a provider timestamp: RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS` taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ReceiveError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .map(|naive| naive.and_utc())
        .map_err(|_| ReceiveError::invalid(format!("invalid date format: {raw}")))
}

/// Stores an incoming message and returns it as an event.
///
/// A duplicate (same channel and external id) is not an error: the provider
/// retried its webhook and gets the same answer again.
pub async fn write_msg(
    ctx: &ReceiveContext<'_>,
    clog: &mut ChannelLog,
    msg: IncomingMsg,
) -> Result<Event, ReceiveError> {
    clog.set_type(ChannelLogType::MsgReceive);
    let outcome = ctx.backend.write_msg(&msg).await?;
    clog.set_msg_id(outcome.msg_id());
    match outcome {
        WriteOutcome::Written(id) => {
            info!(channel_uuid = %msg.channel_uuid, msg_id = %id, urn = %msg.urn.identity(), "message received");
        }
        WriteOutcome::Duplicate(id) => {
            debug!(channel_uuid = %msg.channel_uuid, msg_id = %id, "duplicate message received");
        }
    }
    Ok(Event::Msg(msg))
}

/// Applies a status receipt and returns it as an event.
///
/// A receipt for a message we do not know is ignored rather than rejected,
/// so the provider stops retrying it.
pub async fn write_status(
    ctx: &ReceiveContext<'_>,
    clog: &mut ChannelLog,
    update: StatusUpdate,
) -> Result<Event, ReceiveError> {
    clog.set_type(ChannelLogType::MsgStatus);
    let update = update.with_log(clog.uuid);
    let Some(transition) = ctx.backend.write_status_update(&update).await? else {
        return Err(ReceiveError::ignored("message not found, ignored"));
    };
    if let Some(id) = update.msg_id {
        clog.set_msg_id(id);
    }
    debug!(
        channel_uuid = %update.channel_uuid,
        previous = %transition.previous.status,
        current = %transition.current.status,
        applied = transition.applied,
        "status receipt"
    );
    Ok(Event::Status(update))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use courier_core::{ChannelType, ChannelUuid};

    #[test]
    fn timestamps() {
        let expected = Utc.with_ymd_and_hms(2017, 6, 23, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2017-06-23T12:30:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2017-06-23T14:30:00+02:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2017-06-23 12:30:00").unwrap(), expected);
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(ReceiveError::Invalid(_))
        ));
    }

    #[test]
    fn sender_urns_use_channel_country() {
        let channel = Channel::new(ChannelUuid::new_v4(), ChannelType::new("EX"), "2020")
            .with_country("RW");
        let urn = sender_urn(&channel, "0788383383").unwrap();
        assert_eq!(urn.to_string(), "tel:+250788383383");
        assert!(sender_urn(&channel, "  ").is_err());

        let urn = sender_urn_with_scheme(&channel, "ext", "Abc").unwrap();
        assert_eq!(urn.to_string(), "ext:Abc");
    }
}
