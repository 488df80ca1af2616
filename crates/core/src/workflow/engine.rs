use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::approval::{
    ApprovalFlow, ApprovalFlowId, ApprovalRecord, FlowStatus, JobDescriptionId, RecordStatus,
    WorkflowAction, WorkflowHistoryEntry, WorkflowHistoryId,
};
use crate::domain::employee::EmployeeId;
use crate::notify::Notification;
use crate::workflow::levels::ApprovalLevels;

pub const DEFAULT_MIN_COMMENT_CHARS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRules {
    pub min_comment_chars: usize,
}

impl Default for WorkflowRules {
    fn default() -> Self {
        Self { min_comment_chars: DEFAULT_MIN_COMMENT_CHARS }
    }
}

/// Approver per level key, supplied on submit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverAssignments(BTreeMap<String, EmployeeId>);

impl ApproverAssignments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(mut self, level_key: impl Into<String>, approver: impl Into<String>) -> Self {
        self.0.insert(level_key.into(), EmployeeId::new(approver));
        self
    }

    pub fn get(&self, level_key: &str) -> Option<&EmployeeId> {
        self.0.get(level_key)
    }
}

impl FromIterator<(String, EmployeeId)> for ApproverAssignments {
    fn from_iter<T: IntoIterator<Item = (String, EmployeeId)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum WorkflowViolation {
    NotSubmittable { status: FlowStatus },
    MissingApprover { level_key: String },
    NotPending { status: FlowStatus },
    LevelMismatch { requested: u8, current: u8 },
    UnknownLevel { level: u8 },
    AlreadyDecided { level: u8, status: RecordStatus },
    NotAssignedApprover { level: u8, actor: EmployeeId },
    CommentTooShort { min_chars: usize, actual: usize },
}

impl fmt::Display for WorkflowViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSubmittable { status } => write!(f, "flow in `{status}` cannot be submitted"),
            Self::MissingApprover { level_key } => {
                write!(f, "no approver assigned for level `{level_key}`")
            }
            Self::NotPending { status } => write!(f, "flow in `{status}` is not awaiting approval"),
            Self::LevelMismatch { requested, current } => {
                write!(f, "level {requested} requested but the flow is at level {current}")
            }
            Self::UnknownLevel { level } => write!(f, "flow has no approval level {level}"),
            Self::AlreadyDecided { level, status } => {
                write!(f, "level {level} is already {}", status.as_str())
            }
            Self::NotAssignedApprover { level, actor } => {
                write!(f, "`{actor}` is not the assigned approver for level {level}")
            }
            Self::CommentTooShort { min_chars, actual } => {
                write!(f, "comments need at least {min_chars} characters, got {actual}")
            }
        }
    }
}

fn join_violations(violations: &[WorkflowViolation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("workflow transition refused: {}", join_violations(.violations))]
    Invalid { violations: Vec<WorkflowViolation> },
}

impl WorkflowError {
    pub fn violations(&self) -> &[WorkflowViolation] {
        match self {
            Self::Invalid { violations } => violations,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequesterOutcome {
    Approved,
    Rejected,
    Returned,
}

/// Side effects a transition asks for once it is durably stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowEvent {
    ApprovalRequested {
        flow_id: ApprovalFlowId,
        job_description_id: JobDescriptionId,
        level: u8,
        level_key: String,
        approver_id: EmployeeId,
    },
    RequesterNotified {
        flow_id: ApprovalFlowId,
        job_description_id: JobDescriptionId,
        requested_by: EmployeeId,
        outcome: RequesterOutcome,
        level: u8,
        comments: Option<String>,
    },
}

impl WorkflowEvent {
    pub fn notification(&self) -> Notification {
        match self {
            Self::ApprovalRequested { job_description_id, level, level_key, approver_id, .. } => {
                Notification::to(
                    approver_id.clone(),
                    format!("Job description {job_description_id} awaits your approval"),
                    format!("Level {level} ({level_key}) is waiting for your decision."),
                )
            }
            Self::RequesterNotified {
                job_description_id, requested_by, outcome, level, comments, ..
            } => {
                let (title, verb) = match outcome {
                    RequesterOutcome::Approved => ("approved", "completed every approval level"),
                    RequesterOutcome::Rejected => ("rejected", "was rejected"),
                    RequesterOutcome::Returned => ("returned", "was returned for changes"),
                };
                let mut content = format!("Job description {job_description_id} {verb}");
                if !matches!(outcome, RequesterOutcome::Approved) {
                    content.push_str(&format!(" at level {level}"));
                }
                content.push('.');
                if let Some(comments) = comments {
                    content.push_str(&format!("\nComments: {comments}"));
                }
                Notification::to(
                    requested_by.clone(),
                    format!("Job description {job_description_id} {title}"),
                    content,
                )
            }
        }
    }
}

/// Result of a pure transition. `flow.state_version` is already bumped;
/// `expected_version` is the version the stored row must still carry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalTransition {
    pub flow: ApprovalFlow,
    pub expected_version: u32,
    pub history: WorkflowHistoryEntry,
    pub events: Vec<WorkflowEvent>,
}

#[derive(Clone, Debug, Default)]
pub struct ApprovalWorkflow {
    levels: ApprovalLevels,
    rules: WorkflowRules,
}

impl ApprovalWorkflow {
    pub fn new(levels: ApprovalLevels, rules: WorkflowRules) -> Self {
        Self { levels, rules }
    }

    pub fn levels(&self) -> &ApprovalLevels {
        &self.levels
    }

    pub fn rules(&self) -> &WorkflowRules {
        &self.rules
    }

    pub fn create_draft(
        &self,
        job_description_id: JobDescriptionId,
        requested_by: EmployeeId,
        now: DateTime<Utc>,
    ) -> ApprovalTransition {
        let flow = ApprovalFlow {
            id: ApprovalFlowId(format!("AF-{}", Uuid::new_v4())),
            job_description_id,
            requested_by: requested_by.clone(),
            revision: 0,
            current_level: 0,
            status: FlowStatus::Draft,
            approvals: Vec::new(),
            state_version: 0,
            created_at: now,
            updated_at: now,
        };
        let history = history_entry(
            &flow,
            WorkflowAction::Created,
            0,
            &requested_by,
            None,
            FlowStatus::Draft,
            now,
        );
        ApprovalTransition { flow, expected_version: 0, history, events: Vec::new() }
    }

    /// Opens a new revision with one pending record per configured level.
    pub fn submit(
        &self,
        flow: &ApprovalFlow,
        actor: &EmployeeId,
        assignments: &ApproverAssignments,
        now: DateTime<Utc>,
    ) -> Result<ApprovalTransition, WorkflowError> {
        let mut violations = Vec::new();
        if !flow.status.is_submittable() {
            violations.push(WorkflowViolation::NotSubmittable { status: flow.status });
        }

        let mut approvals = Vec::with_capacity(self.levels.len());
        for level in self.levels.iter() {
            match assignments.get(&level.key) {
                Some(approver_id) => approvals.push(ApprovalRecord {
                    level: level.index,
                    level_key: level.key.clone(),
                    approver_id: approver_id.clone(),
                    status: RecordStatus::Pending,
                    comments: None,
                    decided_at: None,
                }),
                None => violations
                    .push(WorkflowViolation::MissingApprover { level_key: level.key.clone() }),
            }
        }
        if !violations.is_empty() {
            return Err(WorkflowError::Invalid { violations });
        }

        let mut next = flow.clone();
        next.revision += 1;
        next.current_level = 1;
        next.status = FlowStatus::PendingLevel(1);
        next.approvals = approvals;

        let events = next
            .record(1)
            .map(|record| WorkflowEvent::ApprovalRequested {
                flow_id: next.id.clone(),
                job_description_id: next.job_description_id.clone(),
                level: record.level,
                level_key: record.level_key.clone(),
                approver_id: record.approver_id.clone(),
            })
            .into_iter()
            .collect();

        Ok(finish(flow, next, WorkflowAction::Submitted, 0, actor, None, now, events))
    }

    pub fn approve(
        &self,
        flow: &ApprovalFlow,
        level: u8,
        actor: &EmployeeId,
        comments: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalTransition, WorkflowError> {
        let violations = gate(flow, level, actor);
        if !violations.is_empty() {
            return Err(WorkflowError::Invalid { violations });
        }

        let comments = comments.map(|text| text.trim().to_owned()).filter(|text| !text.is_empty());
        let mut next = flow.clone();
        decide(&mut next, level, RecordStatus::Approved, comments.clone(), now);

        let is_last = usize::from(level) >= next.approvals.len();
        let events = if is_last {
            next.status = FlowStatus::Approved;
            vec![WorkflowEvent::RequesterNotified {
                flow_id: next.id.clone(),
                job_description_id: next.job_description_id.clone(),
                requested_by: next.requested_by.clone(),
                outcome: RequesterOutcome::Approved,
                level,
                comments: comments.clone(),
            }]
        } else {
            let upcoming = level + 1;
            next.current_level = upcoming;
            next.status = FlowStatus::PendingLevel(upcoming);
            next.record(upcoming)
                .map(|record| WorkflowEvent::ApprovalRequested {
                    flow_id: next.id.clone(),
                    job_description_id: next.job_description_id.clone(),
                    level: record.level,
                    level_key: record.level_key.clone(),
                    approver_id: record.approver_id.clone(),
                })
                .into_iter()
                .collect()
        };

        Ok(finish(flow, next, WorkflowAction::Approved, level, actor, comments, now, events))
    }

    pub fn reject(
        &self,
        flow: &ApprovalFlow,
        level: u8,
        actor: &EmployeeId,
        comments: &str,
        now: DateTime<Utc>,
    ) -> Result<ApprovalTransition, WorkflowError> {
        self.close_with_comments(flow, level, actor, comments, now, Closing::Reject)
    }

    /// Sends the flow back to the requester; a later `submit` opens a new revision.
    pub fn return_flow(
        &self,
        flow: &ApprovalFlow,
        level: u8,
        actor: &EmployeeId,
        comments: &str,
        now: DateTime<Utc>,
    ) -> Result<ApprovalTransition, WorkflowError> {
        self.close_with_comments(flow, level, actor, comments, now, Closing::Return)
    }

    fn close_with_comments(
        &self,
        flow: &ApprovalFlow,
        level: u8,
        actor: &EmployeeId,
        comments: &str,
        now: DateTime<Utc>,
        closing: Closing,
    ) -> Result<ApprovalTransition, WorkflowError> {
        let mut violations = gate(flow, level, actor);
        let comments = comments.trim();
        let actual = comments.chars().count();
        if actual < self.rules.min_comment_chars {
            violations.push(WorkflowViolation::CommentTooShort {
                min_chars: self.rules.min_comment_chars,
                actual,
            });
        }
        if !violations.is_empty() {
            return Err(WorkflowError::Invalid { violations });
        }

        let (record_status, flow_status, action, outcome) = closing.effects();

        let mut next = flow.clone();
        decide(&mut next, level, record_status, Some(comments.to_owned()), now);
        next.status = flow_status;
        if flow_status == FlowStatus::Returned {
            next.current_level = 1;
        }

        let events = vec![WorkflowEvent::RequesterNotified {
            flow_id: next.id.clone(),
            job_description_id: next.job_description_id.clone(),
            requested_by: next.requested_by.clone(),
            outcome,
            level,
            comments: Some(comments.to_owned()),
        }];

        Ok(finish(flow, next, action, level, actor, Some(comments.to_owned()), now, events))
    }
}

/// Decisions that end a revision early and require comments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Closing {
    Reject,
    Return,
}

impl Closing {
    fn effects(self) -> (RecordStatus, FlowStatus, WorkflowAction, RequesterOutcome) {
        match self {
            Self::Reject => (
                RecordStatus::Rejected,
                FlowStatus::Rejected,
                WorkflowAction::Rejected,
                RequesterOutcome::Rejected,
            ),
            Self::Return => (
                RecordStatus::Returned,
                FlowStatus::Returned,
                WorkflowAction::Returned,
                RequesterOutcome::Returned,
            ),
        }
    }
}

/// Checks shared by approve, reject and return. Nothing is short-circuited so
/// callers see every violated rule at once.
fn gate(flow: &ApprovalFlow, level: u8, actor: &EmployeeId) -> Vec<WorkflowViolation> {
    let mut violations = Vec::new();

    if !matches!(flow.status, FlowStatus::PendingLevel(_)) {
        violations.push(WorkflowViolation::NotPending { status: flow.status });
    }
    if level != flow.current_level {
        violations.push(WorkflowViolation::LevelMismatch {
            requested: level,
            current: flow.current_level,
        });
    }

    match flow.record(level) {
        None => violations.push(WorkflowViolation::UnknownLevel { level }),
        Some(record) => {
            if record.status != RecordStatus::Pending {
                violations.push(WorkflowViolation::AlreadyDecided { level, status: record.status });
            }
            if &record.approver_id != actor {
                violations
                    .push(WorkflowViolation::NotAssignedApprover { level, actor: actor.clone() });
            }
        }
    }

    violations
}

fn decide(
    flow: &mut ApprovalFlow,
    level: u8,
    status: RecordStatus,
    comments: Option<String>,
    now: DateTime<Utc>,
) {
    if let Some(record) = flow.record_mut(level) {
        record.status = status;
        record.comments = comments;
        record.decided_at = Some(now);
    }
}

#[allow(clippy::too_many_arguments)]
fn finish(
    previous: &ApprovalFlow,
    mut next: ApprovalFlow,
    action: WorkflowAction,
    level: u8,
    actor: &EmployeeId,
    comments: Option<String>,
    now: DateTime<Utc>,
    events: Vec<WorkflowEvent>,
) -> ApprovalTransition {
    next.state_version = previous.state_version + 1;
    next.updated_at = now;
    let history = history_entry(&next, action, level, actor, comments, previous.status, now);
    ApprovalTransition { flow: next, expected_version: previous.state_version, history, events }
}

fn history_entry(
    flow: &ApprovalFlow,
    action: WorkflowAction,
    level: u8,
    actor: &EmployeeId,
    comments: Option<String>,
    previous_status: FlowStatus,
    now: DateTime<Utc>,
) -> WorkflowHistoryEntry {
    WorkflowHistoryEntry {
        id: WorkflowHistoryId(Uuid::new_v4().to_string()),
        flow_id: flow.id.clone(),
        job_description_id: flow.job_description_id.clone(),
        revision: flow.revision,
        action,
        level,
        actor_id: actor.clone(),
        comments,
        previous_status,
        new_status: flow.status,
        occurred_at: now,
    }
}
