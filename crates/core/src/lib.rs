pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod hierarchy;
pub mod notify;
pub mod nps;
pub mod workflow;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use domain::approval::{
    ApprovalFlow, ApprovalFlowId, ApprovalRecord, FlowStatus, JobDescriptionId, RecordStatus,
    WorkflowAction, WorkflowHistoryEntry,
};
pub use domain::employee::{Employee, EmployeeFilter, EmployeeId, HierarchyMove};
pub use domain::nps::{
    AlertId, AlertStatus, DetractorAlert, ProcessId, ResponseId, ScheduledTrigger, Survey,
    SurveyId, SurveyResponse, SurveyStatus, TriggerId, TriggerStatus,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use hierarchy::{
    build_forest, build_full_forest, leaders_only, propose_move, HierarchyNode, HierarchyStats,
    ManagerIndex, MovePlan, MoveRules, MoveValidation, MoveViolation,
};
pub use notify::{InMemoryNotificationSink, Notification, NotificationSink};
pub use nps::NpsSettings;
pub use workflow::{ApprovalLevels, ApprovalWorkflow, ApproverAssignments, WorkflowEvent};
