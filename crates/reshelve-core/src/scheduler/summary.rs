use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::plan::PlacementTask;

/// Result of placing one sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status", content = "error")]
pub enum SidecarStatus {
    Transferred,
    AlreadyPresent,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SidecarOutcome {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub status: SidecarStatus,
}

impl SidecarOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, SidecarStatus::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    /// The primary asset could not be placed; its sidecars were not attempted.
    Primary(String),
    /// The primary was placed but these sidecars were not.
    Sidecars(Vec<SidecarOutcome>),
    /// Rejected by plan validation.
    InvalidPlan(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Primary(msg) => write!(f, "{}", msg),
            FailureReason::InvalidPlan(msg) => write!(f, "invalid plan: {}", msg),
            FailureReason::Sidecars(outcomes) => {
                write!(f, "primary placed, {} sidecar(s) failed", outcomes.len())?;
                for outcome in outcomes {
                    if let SidecarStatus::Failed(msg) = &outcome.status {
                        write!(f, "; {}: {}", outcome.source.display(), msg)?;
                    }
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskFailure {
    pub task: PlacementTask,
    pub reason: FailureReason,
}

/// Totals for one scheduler run. `attempted == succeeded + skipped + failed.len()`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: Vec<TaskFailure>,
    /// Part of `succeeded`: the destination already held identical content.
    pub already_present: usize,
    pub sidecars_placed: usize,
    pub dry_run: bool,
    #[serde(skip)]
    pub duration: Duration,
}

impl Summary {
    /// A run is successful iff no task failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted {}, succeeded {} ({} already present), skipped {}, failed {}",
            self.attempted,
            self.succeeded,
            self.already_present,
            self.skipped,
            self.failed.len()
        )
    }
}
