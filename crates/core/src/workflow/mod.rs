pub mod engine;
pub mod levels;

pub use engine::{
    ApprovalTransition, ApprovalWorkflow, ApproverAssignments, RequesterOutcome, WorkflowError,
    WorkflowEvent, WorkflowRules, WorkflowViolation, DEFAULT_MIN_COMMENT_CHARS,
};
pub use levels::{ApprovalLevel, ApprovalLevels, LevelConfigError};
