//! Task bookkeeping types

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task identifier, also used as the event correlation id
pub type TaskId = Uuid;

/// Lifecycle of a download task
///
/// Transitions only move forward: `Pending → Active → {Completed, Failed,
/// Cancelled}`. A pending task may also fail or be cancelled before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `next` is a legal successor of `self`
    #[must_use]
    pub fn can_advance_to(self, next: TaskStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Active | Self::Failed | Self::Cancelled),
            Self::Active => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Active,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    fn rank(status: TaskStatus) -> u8 {
        match status {
            TaskStatus::Pending => 0,
            TaskStatus::Active => 1,
            _ => 2,
        }
    }

    #[test]
    fn terminal_states_are_final() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_advance_to(to), "{from} -> {to}");
            }
        }
    }

    proptest! {
        #[test]
        fn transitions_never_go_backwards(a in 0usize..5, b in 0usize..5) {
            let (from, to) = (ALL[a], ALL[b]);
            if from.can_advance_to(to) {
                prop_assert!(rank(to) > rank(from));
            }
        }
    }
}
