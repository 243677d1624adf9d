//! Request status and the transition graph that governs it.
//!
//! ```text
//! Idle ──► Processing ──► Completed
//!  │           │    └───► Error
//!  └──► Canceled ◄┘
//! ```
//!
//! `Completed`, `Error` and `Canceled` are terminal.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Registered, waiting for an explicit process call
    #[default]
    Idle,
    /// Delegated to the engine, result pending
    Processing,
    /// Engine reported success
    #[serde(rename = "complete", alias = "completed")]
    Completed,
    /// Engine reported failure
    Error,
    /// Canceled by a caller before reaching another terminal state
    #[serde(rename = "cancelled", alias = "canceled")]
    Canceled,
}

impl RequestStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [RequestStatus; 5] = [
        RequestStatus::Idle,
        RequestStatus::Processing,
        RequestStatus::Completed,
        RequestStatus::Error,
        RequestStatus::Canceled,
    ];

    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Idle => "idle",
            RequestStatus::Processing => "processing",
            RequestStatus::Completed => "complete",
            RequestStatus::Error => "error",
            RequestStatus::Canceled => "cancelled",
        }
    }

    /// Check if this is a terminal state (no more transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Error | RequestStatus::Canceled
        )
    }

    /// Check whether `next` is reachable from `self` in one step.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;

        matches!(
            (self, next),
            (Idle, Processing)
                | (Idle, Canceled)
                | (Processing, Completed)
                | (Processing, Error)
                | (Processing, Canceled)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown request status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for RequestStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idle" => Ok(RequestStatus::Idle),
            "processing" => Ok(RequestStatus::Processing),
            "complete" | "completed" => Ok(RequestStatus::Completed),
            "error" => Ok(RequestStatus::Error),
            "cancelled" | "canceled" => Ok(RequestStatus::Canceled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Filter used by list and collection subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatusFilter {
    /// Every request regardless of status
    #[default]
    All,
    /// Only requests currently in the given status
    Only(RequestStatus),
}

impl StatusFilter {
    /// Resolve a caller-supplied status string.
    ///
    /// Absent or unrecognised values select every request.
    pub fn from_query(status: Option<&str>) -> Self {
        status
            .and_then(|s| s.parse::<RequestStatus>().ok())
            .map(StatusFilter::Only)
            .unwrap_or(StatusFilter::All)
    }

    /// Check whether a request in `status` belongs to this filter.
    pub fn matches(&self, status: RequestStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => *wanted == status,
        }
    }
}

impl From<RequestStatus> for StatusFilter {
    fn from(status: RequestStatus) -> Self {
        StatusFilter::Only(status)
    }
}

impl From<Option<RequestStatus>> for StatusFilter {
    fn from(status: Option<RequestStatus>) -> Self {
        status.map(StatusFilter::Only).unwrap_or_default()
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFilter::All => write!(f, "all"),
            StatusFilter::Only(status) => write!(f, "{}", status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_graph() {
        use RequestStatus::*;

        assert!(Idle.can_transition_to(Processing));
        assert!(Idle.can_transition_to(Canceled));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Error));
        assert!(Processing.can_transition_to(Canceled));

        // No shortcut from idle straight to an engine outcome
        assert!(!Idle.can_transition_to(Completed));
        assert!(!Idle.can_transition_to(Error));
        assert!(!Processing.can_transition_to(Processing));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in RequestStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for next in RequestStatus::ALL {
                assert!(!terminal.can_transition_to(next), "{} -> {}", terminal, next);
            }
        }
    }

    #[test]
    fn test_status_parsing_accepts_aliases() {
        assert_eq!("complete".parse::<RequestStatus>(), Ok(RequestStatus::Completed));
        assert_eq!("Completed".parse::<RequestStatus>(), Ok(RequestStatus::Completed));
        assert_eq!("canceled".parse::<RequestStatus>(), Ok(RequestStatus::Canceled));
        assert_eq!("PROCESSING".parse::<RequestStatus>(), Ok(RequestStatus::Processing));
        assert!("done".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&RequestStatus::Canceled).unwrap();
        assert_eq!(json, "\"cancelled\"");

        let parsed: RequestStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(parsed, RequestStatus::Completed);
    }

    #[test]
    fn test_filter_from_query() {
        assert_eq!(StatusFilter::from_query(None), StatusFilter::All);
        assert_eq!(StatusFilter::from_query(Some("bogus")), StatusFilter::All);
        assert_eq!(
            StatusFilter::from_query(Some("processing")),
            StatusFilter::Only(RequestStatus::Processing)
        );

        let filter = StatusFilter::Only(RequestStatus::Idle);
        assert!(filter.matches(RequestStatus::Idle));
        assert!(!filter.matches(RequestStatus::Processing));
        assert!(StatusFilter::All.matches(RequestStatus::Error));
    }
}
