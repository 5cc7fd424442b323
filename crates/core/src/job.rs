//! Provider job lifecycle and generation record status.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Lifecycle state of one upstream task.
///
/// ```text
/// Submitted -> Polling -> Succeeded | Failed | TimedOut | Canceled
/// Submitted -> Succeeded | Failed | Canceled      (direct-sync)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitted,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
    Canceled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::TimedOut | Self::Canceled
        )
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Submitted, Polling) => true,
            (Submitted, Succeeded | Failed | Canceled) => true,
            (Polling, Polling) => true,
            (Polling, Succeeded | Failed | TimedOut | Canceled) => true,
            _ => false,
        }
    }
}

/// In-flight handle for one upstream task.
#[derive(Debug, Clone)]
pub struct ProviderJob {
    pub task_id: String,
    pub state: JobState,
    /// Number of status checks performed so far.
    pub polls: u32,
}

impl ProviderJob {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            state: JobState::Submitted,
            polls: 0,
        }
    }

    /// Move to `next`, rejecting illegal transitions.
    ///
    /// Terminal states are final.
    pub fn transition(&mut self, next: JobState) -> Result<(), CoreError> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::Internal(format!(
                "Illegal job transition {:?} -> {next:?} for task {}",
                self.state, self.task_id
            )));
        }
        if next == JobState::Polling {
            self.polls += 1;
        }
        self.state = next;
        Ok(())
    }
}

/// Persisted status of a generation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Processing,
    Completed,
    Failed,
    TimedOut,
    Canceled,
}

impl GenerationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "timed_out" => Some(Self::TimedOut),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != Self::Processing
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
