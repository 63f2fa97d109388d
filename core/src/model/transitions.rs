//! Task status transition rules.

use thiserror::Error;

use super::result::TaskStatus;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("cannot transition from terminal status {state}")]
    FromTerminalState { state: TaskStatus },
}

/// Validates task status changes made by the orchestrator.
pub struct StatusTransition;

impl StatusTransition {
    pub fn validate(from: TaskStatus, to: TaskStatus) -> Result<(), TransitionError> {
        if from.is_terminal() {
            return Err(TransitionError::FromTerminalState { state: from });
        }

        let is_valid = match (from, to) {
            (TaskStatus::Pending, TaskStatus::Running) => true,

            // never-started tasks are cancelled when the workflow is
            (TaskStatus::Pending, TaskStatus::Cancelled) => true,

            (TaskStatus::Running, TaskStatus::Success)
            | (TaskStatus::Running, TaskStatus::Failed)
            | (TaskStatus::Running, TaskStatus::WaitingHuman)
            | (TaskStatus::Running, TaskStatus::Cancelled) => true,

            // retry loop; observers never see the intermediate FAILED
            (TaskStatus::Failed, TaskStatus::Running) => true,

            // a decision arriving later resolves the checkpoint
            (TaskStatus::WaitingHuman, TaskStatus::Success)
            | (TaskStatus::WaitingHuman, TaskStatus::Failed)
            | (TaskStatus::WaitingHuman, TaskStatus::Cancelled) => true,

            _ => false,
        };

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }

    pub fn is_terminal(status: TaskStatus) -> bool {
        status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(StatusTransition::validate(TaskStatus::Pending, TaskStatus::Running).is_ok());
        assert!(StatusTransition::validate(TaskStatus::Running, TaskStatus::WaitingHuman).is_ok());
        assert!(StatusTransition::validate(TaskStatus::WaitingHuman, TaskStatus::Success).is_ok());
        assert!(StatusTransition::validate(TaskStatus::Pending, TaskStatus::Cancelled).is_ok());
    }

    #[test]
    fn test_invalid_transitions() {
        assert_eq!(
            StatusTransition::validate(TaskStatus::Pending, TaskStatus::Success),
            Err(TransitionError::InvalidTransition {
                from: TaskStatus::Pending,
                to: TaskStatus::Success
            })
        );
        assert_eq!(
            StatusTransition::validate(TaskStatus::Success, TaskStatus::Running),
            Err(TransitionError::FromTerminalState {
                state: TaskStatus::Success
            })
        );
    }
}
