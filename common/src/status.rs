//! Lifecycle vocabulary shared by the coordinator and the relayer.
//!
//! Every status change in the store goes through a [`StatusEvent`]. An event
//! names the set of statuses it may start from and the single status it leads
//! to; the store applies it as a conditional update so that two actors racing
//! on the same unit cannot both succeed.

use std::fmt;

/// Lifecycle state of a batch. Chunks reuse the proving subset
/// (`Unassigned`, `Assigned`, `Proved`, `Failed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[repr(i32)]
pub enum RollupStatus {
    Unassigned = 1,
    Assigned = 2,
    Proved = 3,
    Committing = 4,
    Committed = 5,
    Finalizing = 6,
    Finalized = 7,
    Failed = 8,
}

impl RollupStatus {
    pub const ALL: [RollupStatus; 8] = [
        RollupStatus::Unassigned,
        RollupStatus::Assigned,
        RollupStatus::Proved,
        RollupStatus::Committing,
        RollupStatus::Committed,
        RollupStatus::Finalizing,
        RollupStatus::Finalized,
        RollupStatus::Failed,
    ];
}

impl fmt::Display for RollupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RollupStatus::Unassigned => "unassigned",
            RollupStatus::Assigned => "assigned",
            RollupStatus::Proved => "proved",
            RollupStatus::Committing => "committing",
            RollupStatus::Committed => "committed",
            RollupStatus::Finalizing => "finalizing",
            RollupStatus::Finalized => "finalized",
            RollupStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A request to move a unit through the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// Task collector hands the unit to a prover.
    Assign,
    /// A prover delivered a valid proof.
    ProofAccepted,
    /// The current attempt failed or timed out; the unit is queued again.
    Release,
    /// The attempt guard gave up on the unit.
    AttemptsExhausted,
    /// The relayer broadcast the commit transaction.
    CommitSent,
    CommitConfirmed,
    CommitReverted,
    FinalizeSent,
    FinalizeConfirmed,
}

impl StatusEvent {
    /// Statuses this event may be applied to.
    pub fn sources(self) -> &'static [RollupStatus] {
        match self {
            StatusEvent::Assign => &[RollupStatus::Unassigned],
            StatusEvent::ProofAccepted | StatusEvent::Release => &[RollupStatus::Assigned],
            StatusEvent::AttemptsExhausted => &[RollupStatus::Unassigned, RollupStatus::Assigned],
            StatusEvent::CommitSent => &[RollupStatus::Proved],
            StatusEvent::CommitConfirmed | StatusEvent::CommitReverted => {
                &[RollupStatus::Committing]
            }
            StatusEvent::FinalizeSent => &[RollupStatus::Committed],
            StatusEvent::FinalizeConfirmed => &[RollupStatus::Finalizing],
        }
    }

    pub fn target(self) -> RollupStatus {
        match self {
            StatusEvent::Assign => RollupStatus::Assigned,
            StatusEvent::ProofAccepted => RollupStatus::Proved,
            StatusEvent::Release => RollupStatus::Unassigned,
            StatusEvent::AttemptsExhausted | StatusEvent::CommitReverted => RollupStatus::Failed,
            StatusEvent::CommitSent => RollupStatus::Committing,
            StatusEvent::CommitConfirmed => RollupStatus::Committed,
            StatusEvent::FinalizeSent => RollupStatus::Finalizing,
            StatusEvent::FinalizeConfirmed => RollupStatus::Finalized,
        }
    }
}

/// Kind of unit a prover works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[repr(i32)]
pub enum ProofType {
    Chunk = 1,
    Batch = 2,
}

impl ProofType {
    /// Table holding units of this type.
    pub fn table(self) -> &'static str {
        match self {
            ProofType::Chunk => "chunk",
            ProofType::Batch => "batch",
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            ProofType::Chunk => 1,
            ProofType::Batch => 2,
        }
    }
}

impl TryFrom<u8> for ProofType {
    type Error = StatusError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ProofType::Chunk),
            2 => Ok(ProofType::Batch),
            other => Err(StatusError::UnknownProofType(other)),
        }
    }
}

impl fmt::Display for ProofType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// State of a single assignment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(i32)]
pub enum ProverTaskStatus {
    Assigned = 1,
    Proved = 2,
    Failed = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(i32)]
pub enum FailureType {
    Undefined = 0,
    Timeout = 1,
    ProverReported = 2,
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("unknown proof type {0}")]
    UnknownProofType(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENTS: [StatusEvent; 9] = [
        StatusEvent::Assign,
        StatusEvent::ProofAccepted,
        StatusEvent::Release,
        StatusEvent::AttemptsExhausted,
        StatusEvent::CommitSent,
        StatusEvent::CommitConfirmed,
        StatusEvent::CommitReverted,
        StatusEvent::FinalizeSent,
        StatusEvent::FinalizeConfirmed,
    ];

    /// What the guarded update in the store does for a unit in `from`.
    fn apply(from: RollupStatus, event: StatusEvent) -> Option<RollupStatus> {
        event.sources().contains(&from).then_some(event.target())
    }

    #[test]
    fn happy_path_moves_forward() {
        let mut status = RollupStatus::Unassigned;
        for event in [
            StatusEvent::Assign,
            StatusEvent::ProofAccepted,
            StatusEvent::CommitSent,
            StatusEvent::CommitConfirmed,
            StatusEvent::FinalizeSent,
            StatusEvent::FinalizeConfirmed,
        ] {
            let next = apply(status, event).unwrap();
            assert!(next as i32 > status as i32);
            status = next;
        }
        assert_eq!(status, RollupStatus::Finalized);
        assert!(EVENTS.iter().all(|event| apply(status, *event).is_none()));
    }

    #[test]
    fn events_are_rejected_from_wrong_state() {
        assert_eq!(apply(RollupStatus::Proved, StatusEvent::Assign), None);
        assert_eq!(apply(RollupStatus::Committed, StatusEvent::CommitSent), None);
        assert_eq!(apply(RollupStatus::Failed, StatusEvent::Release), None);
        assert_eq!(apply(RollupStatus::Unassigned, StatusEvent::CommitConfirmed), None);
    }

    #[test]
    fn release_is_the_only_backward_edge() {
        for from in RollupStatus::ALL {
            for event in EVENTS {
                if let Some(to) = apply(from, event) {
                    if event == StatusEvent::Release {
                        assert_eq!((from, to), (RollupStatus::Assigned, RollupStatus::Unassigned));
                    } else {
                        assert!(to as i32 > from as i32, "{from} -> {to} via {event:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn attempts_exhausted_fails_queued_and_assigned_units() {
        assert_eq!(
            apply(RollupStatus::Unassigned, StatusEvent::AttemptsExhausted),
            Some(RollupStatus::Failed)
        );
        assert_eq!(
            apply(RollupStatus::Assigned, StatusEvent::AttemptsExhausted),
            Some(RollupStatus::Failed)
        );
        assert_eq!(apply(RollupStatus::Proved, StatusEvent::AttemptsExhausted), None);
    }

    #[test]
    fn proof_type_codes() {
        assert_eq!(ProofType::try_from(2).unwrap(), ProofType::Batch);
        assert_eq!(ProofType::try_from(ProofType::Chunk.as_u8()).unwrap(), ProofType::Chunk);
        assert!(ProofType::try_from(3).is_err());
    }
}
