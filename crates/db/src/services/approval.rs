use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use orgflow_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use orgflow_core::domain::approval::{ApprovalFlow, JobDescriptionId, WorkflowHistoryEntry};
use orgflow_core::domain::employee::EmployeeId;
use orgflow_core::errors::ApplicationError;
use orgflow_core::notify::NotificationSink;
use orgflow_core::workflow::{
    ApprovalTransition, ApprovalWorkflow, ApproverAssignments, WorkflowError,
};

use crate::repositories::{ApprovalFlowRepository, RevisionedRecord};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub job_description_id: JobDescriptionId,
    pub message: String,
}

/// Per-item outcome of a batch approval; one failure never blocks the rest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchApprovalReport {
    pub approved: Vec<JobDescriptionId>,
    pub failed: Vec<BatchFailure>,
}

/// Applies workflow transitions with `state_version` as precondition and
/// dispatches notifications and audit events only after the write commits.
pub struct ApprovalService<R> {
    repository: R,
    workflow: ApprovalWorkflow,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn NotificationSink>,
}

impl<R: ApprovalFlowRepository> ApprovalService<R> {
    pub fn new(
        repository: R,
        workflow: ApprovalWorkflow,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self { repository, workflow, audit, notifier }
    }

    pub fn workflow(&self) -> &ApprovalWorkflow {
        &self.workflow
    }

    pub async fn create_draft(
        &self,
        job_description_id: JobDescriptionId,
        requested_by: EmployeeId,
        context: &AuditContext,
    ) -> Result<ApprovalFlow, ApplicationError> {
        let transition = self.workflow.create_draft(job_description_id, requested_by, Utc::now());
        if !self.repository.insert_draft(&transition).await? {
            return Err(ApplicationError::Conflict(format!(
                "job description `{}` already has an approval flow",
                transition.flow.job_description_id
            )));
        }
        self.dispatch(&transition, context, "workflow.flow.created");
        Ok(transition.flow)
    }

    pub async fn submit(
        &self,
        job_description_id: &JobDescriptionId,
        actor: &EmployeeId,
        assignments: &ApproverAssignments,
        context: &AuditContext,
    ) -> Result<ApprovalFlow, ApplicationError> {
        self.commit(job_description_id, context, "workflow.flow.submitted", |workflow, flow, now| {
            workflow.submit(flow, actor, assignments, now)
        })
        .await
    }

    pub async fn approve(
        &self,
        job_description_id: &JobDescriptionId,
        level: u8,
        actor: &EmployeeId,
        comments: Option<String>,
        context: &AuditContext,
    ) -> Result<ApprovalFlow, ApplicationError> {
        self.commit(job_description_id, context, "workflow.level.approved", |workflow, flow, now| {
            workflow.approve(flow, level, actor, comments, now)
        })
        .await
    }

    pub async fn reject(
        &self,
        job_description_id: &JobDescriptionId,
        level: u8,
        actor: &EmployeeId,
        comments: &str,
        context: &AuditContext,
    ) -> Result<ApprovalFlow, ApplicationError> {
        self.commit(job_description_id, context, "workflow.level.rejected", |workflow, flow, now| {
            workflow.reject(flow, level, actor, comments, now)
        })
        .await
    }

    pub async fn return_flow(
        &self,
        job_description_id: &JobDescriptionId,
        level: u8,
        actor: &EmployeeId,
        comments: &str,
        context: &AuditContext,
    ) -> Result<ApprovalFlow, ApplicationError> {
        self.commit(job_description_id, context, "workflow.level.returned", |workflow, flow, now| {
            workflow.return_flow(flow, level, actor, comments, now)
        })
        .await
    }

    /// Approves each job description independently at `level`.
    pub async fn approve_batch(
        &self,
        level: u8,
        actor: &EmployeeId,
        job_description_ids: &[JobDescriptionId],
        comments: Option<String>,
        context: &AuditContext,
    ) -> BatchApprovalReport {
        let mut report = BatchApprovalReport::default();
        for job_description_id in job_description_ids {
            match self.approve(job_description_id, level, actor, comments.clone(), context).await {
                Ok(_) => report.approved.push(job_description_id.clone()),
                Err(error) => report.failed.push(BatchFailure {
                    job_description_id: job_description_id.clone(),
                    message: error.to_string(),
                }),
            }
        }
        info!(
            event_name = "workflow.batch.completed",
            correlation_id = %context.correlation_id,
            level,
            approved = report.approved.len(),
            failed = report.failed.len(),
            "batch approval finished"
        );
        report
    }

    pub async fn flow(
        &self,
        job_description_id: &JobDescriptionId,
    ) -> Result<ApprovalFlow, ApplicationError> {
        self.repository.find_by_job_description(job_description_id).await?.ok_or_else(|| {
            ApplicationError::NotFound(format!(
                "no approval flow for job description `{job_description_id}`"
            ))
        })
    }

    pub async fn history(
        &self,
        job_description_id: &JobDescriptionId,
    ) -> Result<Vec<WorkflowHistoryEntry>, ApplicationError> {
        let flow = self.flow(job_description_id).await?;
        Ok(self.repository.history(&flow.id).await?)
    }

    /// Records of every revision, including superseded ones.
    pub async fn records(
        &self,
        job_description_id: &JobDescriptionId,
    ) -> Result<Vec<RevisionedRecord>, ApplicationError> {
        let flow = self.flow(job_description_id).await?;
        Ok(self.repository.records(&flow.id).await?)
    }

    pub async fn pending_for_approver(
        &self,
        level: u8,
        approver_id: &EmployeeId,
    ) -> Result<Vec<ApprovalFlow>, ApplicationError> {
        Ok(self.repository.pending_for_approver(level, approver_id).await?)
    }

    async fn commit<F>(
        &self,
        job_description_id: &JobDescriptionId,
        context: &AuditContext,
        event_type: &str,
        decide: F,
    ) -> Result<ApprovalFlow, ApplicationError>
    where
        F: FnOnce(&ApprovalWorkflow, &ApprovalFlow, DateTime<Utc>) -> Result<ApprovalTransition, WorkflowError>
            + Send,
    {
        let flow = self.flow(job_description_id).await?;

        let transition = match decide(&self.workflow, &flow, Utc::now()) {
            Ok(transition) => transition,
            Err(error) => {
                warn!(
                    event_name = "workflow.transition.rejected",
                    correlation_id = %context.correlation_id,
                    job_description_id = %job_description_id,
                    attempted = event_type,
                    error = %error,
                    "workflow transition refused"
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(job_description_id.to_string()),
                        context,
                        event_type,
                        AuditCategory::Workflow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("reason", error.to_string()),
                );
                return Err(error.into());
            }
        };

        if !self.repository.save_transition(&transition).await? {
            warn!(
                event_name = "workflow.transition.conflict",
                correlation_id = %context.correlation_id,
                job_description_id = %job_description_id,
                expected_version = transition.expected_version,
                "flow changed before the transition was stored"
            );
            return Err(ApplicationError::Conflict("approval already decided".to_string()));
        }

        self.dispatch(&transition, context, event_type);
        Ok(transition.flow)
    }

    fn dispatch(&self, transition: &ApprovalTransition, context: &AuditContext, event_type: &str) {
        let flow = &transition.flow;
        info!(
            event_name = event_type,
            correlation_id = %context.correlation_id,
            job_description_id = %flow.job_description_id,
            status = %flow.status,
            revision = flow.revision,
            "workflow transition stored"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(flow.job_description_id.to_string()),
                context,
                event_type,
                AuditCategory::Workflow,
                AuditOutcome::Success,
            )
            .with_metadata("flow_id", flow.id.0.as_str())
            .with_metadata("status", flow.status.as_string())
            .with_metadata("revision", flow.revision.to_string()),
        );
        for event in &transition.events {
            self.notifier.notify(event.notification());
        }
    }
}
