//! Authority status of a record and its state machine.
//!
//! ```text
//!            ┌──────────► Accepted (terminal)
//!            │
//!  Pending ──┼──────────► Rejected (terminal)
//!     ▲      │
//!     │      └──────────► Error
//!     └────── retry ──────┘
//! ```
//!
//! Status lives outside the hashed content, so changing it never affects
//! the chain.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a record with respect to the external authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusState {
    /// Not yet accepted or rejected.
    Pending,
    /// Accepted by the authority.
    Accepted,
    /// Rejected by the authority.
    Rejected,
    /// Submission failed; eligible for retry.
    Error,
}

impl StatusState {
    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted | Self::Rejected | Self::Error)
                | (Self::Error, Self::Pending)
        )
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected)
    }

    /// Whether a record in this state may be submitted.
    #[must_use]
    pub const fn is_submittable(self) -> bool {
        matches!(self, Self::Pending | Self::Error)
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authority status with the authority's code and message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityStatus {
    /// Current state.
    pub state: StatusState,
    /// Authority confirmation or error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the state last changed, if the writer stamped it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AuthorityStatus {
    /// Initial status of every new record.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            state: StatusState::Pending,
            code: None,
            message: None,
            updated_at: None,
        }
    }

    /// Accepted, optionally with a confirmation code.
    #[must_use]
    pub fn accepted(code: Option<String>, message: Option<String>) -> Self {
        Self::with_state(StatusState::Accepted, code, message)
    }

    /// Rejected with the authority's code and reason.
    #[must_use]
    pub fn rejected(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::with_state(
            StatusState::Rejected,
            Some(code.into()),
            Some(reason.into()),
        )
    }

    /// Submission error.
    #[must_use]
    pub fn error(code: Option<String>, message: impl Into<String>) -> Self {
        Self::with_state(StatusState::Error, code, Some(message.into()))
    }

    /// Back to pending for another submission attempt.
    #[must_use]
    pub fn retry() -> Self {
        Self::with_state(StatusState::Pending, None, None)
    }

    /// Stamp the time of the change.
    #[must_use]
    pub fn at(mut self, when: DateTime<Utc>) -> Self {
        self.updated_at = Some(when);
        self
    }

    fn with_state(state: StatusState, code: Option<String>, message: Option<String>) -> Self {
        Self {
            state,
            code,
            message,
            updated_at: None,
        }
    }
}

impl Default for AuthorityStatus {
    fn default() -> Self {
        Self::pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [StatusState; 4] = [
        StatusState::Pending,
        StatusState::Accepted,
        StatusState::Rejected,
        StatusState::Error,
    ];

    #[test]
    fn test_transition_table() {
        let legal = [
            (StatusState::Pending, StatusState::Accepted),
            (StatusState::Pending, StatusState::Rejected),
            (StatusState::Pending, StatusState::Error),
            (StatusState::Error, StatusState::Pending),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(StatusState::Accepted.is_terminal());
        assert!(StatusState::Rejected.is_terminal());
        assert!(!StatusState::Pending.is_terminal());
        assert!(!StatusState::Error.is_terminal());
    }

    #[test]
    fn test_submittable_states() {
        assert!(StatusState::Pending.is_submittable());
        assert!(StatusState::Error.is_submittable());
        assert!(!StatusState::Accepted.is_submittable());
    }

    #[test]
    fn test_timestamp_only_when_stamped() {
        assert_eq!(AuthorityStatus::retry().updated_at, None);

        let when = DateTime::parse_from_rfc3339("2026-03-02T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let status = AuthorityStatus::accepted(Some("CSV-1".into()), None).at(when);
        assert_eq!(status.updated_at, Some(when));
        assert_eq!(status.state, StatusState::Accepted);
    }

    #[test]
    fn test_serialization_omits_empty_fields() {
        let json = serde_json::to_string(&AuthorityStatus::pending()).unwrap();
        assert_eq!(json, r#"{"state":"pending"}"#);

        let rejected = AuthorityStatus::rejected("1100", "invalid tax id");
        let parsed: AuthorityStatus =
            serde_json::from_str(&serde_json::to_string(&rejected).unwrap()).unwrap();
        assert_eq!(parsed, rejected);
    }
}
