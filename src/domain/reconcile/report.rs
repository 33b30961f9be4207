use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::domain::ids::HostName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// An earlier command in the same host stream failed.
    PriorFailure,

    /// The apply run was cancelled before this command was sent.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::PriorFailure => write!(f, "earlier command in this stream failed"),
            SkipReason::Cancelled => write!(f, "apply run was cancelled"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum CommandOutcome {
    Succeeded { attempts: u32 },
    Failed { error: String },
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command_id: Uuid,
    pub host: HostName,
    pub command_line: String,
    pub outcome: CommandOutcome,
}

/// Result of one apply run, listing every command of the delta and what
/// happened to it.
///
/// A partially applied delta is an expected outcome: acknowledged
/// commands are never rolled back, the remainder is skipped and shows up
/// here so the caller can decide how to proceed.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    pub commands: Vec<CommandReport>,
}

impl ApplyReport {
    pub fn succeeded(&self) -> usize {
        self.commands
            .iter()
            .filter(|report| matches!(report.outcome, CommandOutcome::Succeeded { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.commands
            .iter()
            .filter(|report| matches!(report.outcome, CommandOutcome::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.commands
            .iter()
            .filter(|report| matches!(report.outcome, CommandOutcome::Skipped { .. }))
            .count()
    }

    /// True when every command of the delta was acknowledged.
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.failed() == 0 && self.skipped() == 0
    }
}
