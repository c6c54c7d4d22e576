// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery status of outgoing messages and the rules for moving between them.
//!
//! Statuses are ranked. A requested status is applied only when its rank is
//! not lower than the current one, and `Delivered`/`Failed` are final. This
//! makes status writes idempotent and lets receipts arrive in any order.
//! `Errored` is special: each application counts an attempt, and once the
//! retry budget is spent the message is failed instead.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum MsgStatus {
    #[serde(rename = "P")]
    #[strum(serialize = "P")]
    Pending,
    #[serde(rename = "Q")]
    #[strum(serialize = "Q")]
    Queued,
    #[serde(rename = "W")]
    #[strum(serialize = "W")]
    Wired,
    #[serde(rename = "S")]
    #[strum(serialize = "S")]
    Sent,
    #[serde(rename = "D")]
    #[strum(serialize = "D")]
    Delivered,
    #[serde(rename = "E")]
    #[strum(serialize = "E")]
    Errored,
    #[serde(rename = "F")]
    #[strum(serialize = "F")]
    Failed,
}

impl MsgStatus {
    /// Single-letter code used in storage and on the wire.
    pub fn code(self) -> &'static str {
        match self {
            MsgStatus::Pending => "P",
            MsgStatus::Queued => "Q",
            MsgStatus::Wired => "W",
            MsgStatus::Sent => "S",
            MsgStatus::Delivered => "D",
            MsgStatus::Errored => "E",
            MsgStatus::Failed => "F",
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            MsgStatus::Pending => 0,
            MsgStatus::Queued => 1,
            MsgStatus::Errored | MsgStatus::Wired => 2,
            MsgStatus::Sent => 3,
            MsgStatus::Delivered | MsgStatus::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MsgStatus::Delivered | MsgStatus::Failed)
    }

    /// Whether the provider has accepted the message at some point.
    pub fn was_sent(self) -> bool {
        matches!(self, MsgStatus::Wired | MsgStatus::Sent | MsgStatus::Delivered)
    }

    /// Maps a provider receipt keyword to a status. Unknown keywords map to `None`.
    pub fn from_receipt(keyword: &str) -> Option<MsgStatus> {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "sent" => Some(MsgStatus::Sent),
            "delivered" | "read" => Some(MsgStatus::Delivered),
            "failed" | "undelivered" | "rejected" => Some(MsgStatus::Failed),
            "wired" | "accepted" | "queued" => Some(MsgStatus::Wired),
            _ => None,
        }
    }
}

/// Retry budget and backoff for errored sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Errored attempts allowed before a message is failed.
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff: Duration::from_secs(300),
            max_backoff: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following the `error_count`-th error.
    pub fn backoff(&self, error_count: u32) -> Duration {
        let factor = 1u32.checked_shl(error_count.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Persisted status fields of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgState {
    pub status: MsgStatus,
    pub error_count: u32,
}

impl MsgState {
    pub fn new(status: MsgStatus) -> Self {
        Self {
            status,
            error_count: 0,
        }
    }
}

/// Result of asking for a status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub previous: MsgState,
    pub current: MsgState,
    /// False when the request was dropped by the ordering rules.
    pub applied: bool,
    /// Set when the message should be re-queued after this delay.
    pub retry_in: Option<Duration>,
}

/// Computes the state that results from requesting `requested` on `current`.
pub fn transition(current: MsgState, requested: MsgStatus, policy: &RetryPolicy) -> Transition {
    let ignored = Transition {
        previous: current,
        current,
        applied: false,
        retry_in: None,
    };

    if current.status.is_terminal() || requested.rank() < current.status.rank() {
        return ignored;
    }

    if requested == MsgStatus::Errored {
        let error_count = current.error_count.saturating_add(1);
        let (status, retry_in) = if error_count > policy.max_retries {
            (MsgStatus::Failed, None)
        } else {
            (MsgStatus::Errored, Some(policy.backoff(error_count)))
        };
        return Transition {
            previous: current,
            current: MsgState {
                status,
                error_count,
            },
            applied: true,
            retry_in,
        };
    }

    Transition {
        previous: current,
        current: MsgState {
            status: requested,
            error_count: current.error_count,
        },
        applied: true,
        retry_in: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(status: MsgStatus) -> MsgState {
        MsgState::new(status)
    }

    #[test]
    fn codes_round_trip_through_strum_and_serde() {
        assert_eq!(MsgStatus::Delivered.to_string(), "D");
        assert_eq!("W".parse::<MsgStatus>().unwrap(), MsgStatus::Wired);
        assert_eq!(serde_json::to_string(&MsgStatus::Errored).unwrap(), "\"E\"");
    }

    #[test]
    fn delivered_before_sent_keeps_delivered() {
        let policy = RetryPolicy::default();
        let t = transition(state(MsgStatus::Wired), MsgStatus::Delivered, &policy);
        assert!(t.applied);
        let t = transition(t.current, MsgStatus::Sent, &policy);
        assert!(!t.applied);
        assert_eq!(t.current.status, MsgStatus::Delivered);
    }

    #[test]
    fn terminal_states_never_change() {
        let policy = RetryPolicy::default();
        for terminal in [MsgStatus::Delivered, MsgStatus::Failed] {
            for requested in [MsgStatus::Wired, MsgStatus::Errored, MsgStatus::Delivered, MsgStatus::Failed] {
                let t = transition(state(terminal), requested, &policy);
                assert!(!t.applied);
                assert_eq!(t.current.status, terminal);
            }
        }
    }

    #[test]
    fn repeating_a_status_is_idempotent() {
        let policy = RetryPolicy::default();
        let t = transition(state(MsgStatus::Sent), MsgStatus::Sent, &policy);
        assert!(t.applied);
        assert_eq!(t.current, state(MsgStatus::Sent));
    }

    #[test]
    fn errors_retry_then_fail() {
        let policy = RetryPolicy::default();
        let first = transition(state(MsgStatus::Queued), MsgStatus::Errored, &policy);
        assert_eq!(first.current.status, MsgStatus::Errored);
        assert_eq!(first.current.error_count, 1);
        assert_eq!(first.retry_in, Some(Duration::from_secs(300)));

        let second = transition(first.current, MsgStatus::Errored, &policy);
        assert_eq!(second.current.error_count, 2);
        assert_eq!(second.retry_in, Some(Duration::from_secs(600)));

        let third = transition(second.current, MsgStatus::Errored, &policy);
        assert_eq!(third.current.status, MsgStatus::Failed);
        assert_eq!(third.retry_in, None);
    }

    #[test]
    fn errored_can_still_be_wired() {
        let policy = RetryPolicy::default();
        let errored = transition(state(MsgStatus::Queued), MsgStatus::Errored, &policy).current;
        let t = transition(errored, MsgStatus::Wired, &policy);
        assert!(t.applied);
        assert_eq!(t.current.status, MsgStatus::Wired);
        assert_eq!(t.current.error_count, 1);
    }

    #[test]
    fn errored_after_sent_is_dropped() {
        let t = transition(state(MsgStatus::Sent), MsgStatus::Errored, &RetryPolicy::default());
        assert!(!t.applied);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_backoff: Duration::from_secs(300),
            max_backoff: Duration::from_secs(3600),
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(300));
        assert_eq!(policy.backoff(4), Duration::from_secs(2400));
        assert_eq!(policy.backoff(5), Duration::from_secs(3600));
        assert_eq!(policy.backoff(64), Duration::from_secs(3600));
    }

    #[test]
    fn receipt_keywords() {
        assert_eq!(MsgStatus::from_receipt("DELIVERED"), Some(MsgStatus::Delivered));
        assert_eq!(MsgStatus::from_receipt("undelivered"), Some(MsgStatus::Failed));
        assert_eq!(MsgStatus::from_receipt("accepted"), Some(MsgStatus::Wired));
        assert_eq!(MsgStatus::from_receipt("bogus"), None);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;
        use proptest::prelude::prop;

        fn any_status() -> impl Strategy<Value = MsgStatus> {
            prop::sample::select(vec![
                MsgStatus::Pending,
                MsgStatus::Queued,
                MsgStatus::Wired,
                MsgStatus::Sent,
                MsgStatus::Delivered,
                MsgStatus::Errored,
                MsgStatus::Failed,
            ])
        }

        proptest! {
            #[test]
            fn rank_never_decreases(requests in prop::collection::vec(any_status(), 1..20)) {
                let policy = RetryPolicy::default();
                let mut current = MsgState::new(MsgStatus::Queued);
                for requested in requests {
                    let t = transition(current, requested, &policy);
                    prop_assert!(t.current.status.rank() >= current.status.rank());
                    if current.status.is_terminal() {
                        prop_assert_eq!(t.current, current);
                    }
                    current = t.current;
                }
            }
        }
    }
}
