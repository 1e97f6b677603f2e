use super::EventIdentifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Stage an event has reached within its processing lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// A worker has picked the event up but no outcome has been recorded yet
    Pending,
    /// Processing finished successfully
    Processed,
    /// Processing failed permanently, either through a non-retryable fault
    /// or through exhaustion of the delivery attempt budget
    Failed,
}

impl ProcessingStatus {
    /// Whether the status represents a final outcome that must never be overwritten
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Failed)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
        };

        write!(f, "{}", label)
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown processing status '{}'", other)),
        }
    }
}

/// Record of what happened (or is happening) to a single event
///
/// One record exists per event identifier. The record moves from
/// [`Pending`](ProcessingStatus::Pending) to exactly one terminal status and
/// stays there, regardless of how often the event gets redelivered afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingResult {
    /// Identifier of the event this record belongs to
    pub event_id: EventIdentifier,

    /// Current lifecycle stage
    pub status: ProcessingStatus,

    /// Output produced by the processor, present on success only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_payload: Option<Value>,

    /// Human readable description of the fault, present on failure only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Time at which this record was last written
    pub processed_at: DateTime<Utc>,

    /// Delivery attempt that produced this record
    pub attempt_count: u32,
}

impl ProcessingResult {
    /// Marks an event as picked up by a worker
    pub fn pending(event_id: EventIdentifier, attempt_count: u32) -> Self {
        Self {
            event_id,
            status: ProcessingStatus::Pending,
            result_payload: None,
            error: None,
            processed_at: Utc::now(),
            attempt_count,
        }
    }

    /// Records a successful outcome
    pub fn processed(event_id: EventIdentifier, result_payload: Value, attempt_count: u32) -> Self {
        Self {
            event_id,
            status: ProcessingStatus::Processed,
            result_payload: Some(result_payload),
            error: None,
            processed_at: Utc::now(),
            attempt_count,
        }
    }

    /// Records a permanent failure
    pub fn failed(event_id: EventIdentifier, error: String, attempt_count: u32) -> Self {
        Self {
            event_id,
            status: ProcessingStatus::Failed,
            result_payload: None,
            error: Some(error),
            processed_at: Utc::now(),
            attempt_count,
        }
    }
}

#[cfg(test)]
mod does {
    use super::*;

    #[test]
    fn treat_only_final_statuses_as_terminal() {
        assert!(!ProcessingStatus::Pending.is_terminal());
        assert!(ProcessingStatus::Processed.is_terminal());
        assert!(ProcessingStatus::Failed.is_terminal());
    }

    #[test]
    fn round_trip_status_labels() {
        for status in [
            ProcessingStatus::Pending,
            ProcessingStatus::Processed,
            ProcessingStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<ProcessingStatus>(), Ok(status));
        }
    }
}
