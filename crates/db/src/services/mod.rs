//! Application services: each loads a snapshot through a repository trait,
//! runs the pure core decision and commits it with a conditional write.
//! Audit and notification side effects are dispatched only after commit.

pub mod approval;
pub mod hierarchy;
pub mod nps;

pub use approval::{ApprovalService, BatchApprovalReport, BatchFailure};
pub use hierarchy::{HierarchyService, MoveRequest};
pub use nps::{
    AlertView, NewResponse, NpsService, ProcessReport, RecordedResponse, ScheduleOutcome,
    TriggerDetail,
};
