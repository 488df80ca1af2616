use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use orgflow_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use orgflow_core::domain::employee::{Employee, EmployeeFilter, EmployeeId, HierarchyMove, HierarchyMoveId};
use orgflow_core::errors::{ApplicationError, DomainError};
use orgflow_core::hierarchy::{
    build_forest, build_full_forest, leaders_only, propose_move, HierarchyNode, HierarchyStats,
    ManagerIndex, MovePlan, MoveRules, MoveViolation,
};

use crate::repositories::EmployeeRepository;

/// Re-parenting request as received from an operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub employee_id: EmployeeId,
    pub new_manager_id: EmployeeId,
    pub reason: Option<String>,
}

/// Read and write access to the reporting structure. Every read rebuilds the
/// index from one directory snapshot; nothing derived is cached.
pub struct HierarchyService<R> {
    repository: R,
    rules: MoveRules,
    audit: Arc<dyn AuditSink>,
}

impl<R: EmployeeRepository> HierarchyService<R> {
    pub fn new(repository: R, rules: MoveRules, audit: Arc<dyn AuditSink>) -> Self {
        Self { repository, rules, audit }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub async fn employees(&self, filter: &EmployeeFilter) -> Result<Vec<Employee>, ApplicationError> {
        Ok(self.repository.list(filter).await?)
    }

    pub async fn forest(
        &self,
        filter: &EmployeeFilter,
        expanded: &HashSet<EmployeeId>,
    ) -> Result<Vec<HierarchyNode>, ApplicationError> {
        let employees = self.repository.list(filter).await?;
        Ok(build_forest(&employees, expanded))
    }

    pub async fn full_forest(
        &self,
        filter: &EmployeeFilter,
    ) -> Result<Vec<HierarchyNode>, ApplicationError> {
        let employees = self.repository.list(filter).await?;
        Ok(build_full_forest(&employees))
    }

    /// Org-chart overview: roots plus everyone who manages somebody.
    pub async fn leaders(&self, filter: &EmployeeFilter) -> Result<Vec<HierarchyNode>, ApplicationError> {
        Ok(leaders_only(self.full_forest(filter).await?))
    }

    pub async fn stats(&self, filter: &EmployeeFilter) -> Result<HierarchyStats, ApplicationError> {
        let employees = self.repository.list(filter).await?;
        Ok(HierarchyStats::from_index(&ManagerIndex::new(&employees)))
    }

    /// Managers above `id`, nearest first.
    pub async fn chain_of_command(&self, id: &EmployeeId) -> Result<Vec<Employee>, ApplicationError> {
        self.walk(id, |index, id| index.ancestors(id)).await
    }

    pub async fn direct_reports(&self, id: &EmployeeId) -> Result<Vec<Employee>, ApplicationError> {
        self.walk(id, |index, id| index.children_of(id)).await
    }

    /// Everyone below `id`, breadth-first.
    pub async fn all_subordinates(&self, id: &EmployeeId) -> Result<Vec<Employee>, ApplicationError> {
        self.walk(id, |index, id| index.descendants(id)).await
    }

    async fn walk<F>(&self, id: &EmployeeId, select: F) -> Result<Vec<Employee>, ApplicationError>
    where
        F: for<'a> FnOnce(&ManagerIndex<'a>, &EmployeeId) -> Vec<&'a Employee> + Send,
    {
        let employees = self.repository.list(&EmployeeFilter::default()).await?;
        let index = ManagerIndex::new(&employees);
        if !index.contains(id) {
            return Err(ApplicationError::NotFound(format!("employee `{id}` not found")));
        }
        Ok(select(&index, id).into_iter().cloned().collect())
    }

    /// Dry run of a move against the current directory. Inactive employees
    /// stay in the snapshot: acyclicity holds over every stored manager link.
    pub async fn validate_move(
        &self,
        employee_id: &EmployeeId,
        new_manager_id: &EmployeeId,
    ) -> Result<MovePlan, ApplicationError> {
        let employees = self
            .repository
            .list(&EmployeeFilter { include_inactive: true, ..EmployeeFilter::default() })
            .await?;
        let index = ManagerIndex::new(&employees);
        Ok(propose_move(&index, &self.rules, employee_id, new_manager_id)?)
    }

    /// Validates against a fresh snapshot and applies the move with the
    /// observed manager as precondition. Callers rebuild the forest afterwards.
    pub async fn apply_move(
        &self,
        request: &MoveRequest,
        context: &AuditContext,
    ) -> Result<HierarchyMove, ApplicationError> {
        let plan = self.validate_move(&request.employee_id, &request.new_manager_id).await?;

        if plan.validation.has(|violation| {
            matches!(
                violation,
                MoveViolation::ManagerNotFound { .. } | MoveViolation::InactiveManager { .. }
            )
        }) {
            return Err(ApplicationError::NotFound(format!(
                "manager `{}` not found",
                request.new_manager_id
            )));
        }

        if !plan.is_valid() {
            warn!(
                event_name = "hierarchy.move.rejected",
                correlation_id = %context.correlation_id,
                employee_id = %request.employee_id,
                new_manager_id = %request.new_manager_id,
                reasons = ?plan.validation.reasons(),
                "hierarchy move rejected"
            );
            self.audit.emit(
                AuditEvent::new(
                    Some(request.employee_id.to_string()),
                    context,
                    "hierarchy.move.rejected",
                    AuditCategory::Hierarchy,
                    AuditOutcome::Rejected,
                )
                .with_metadata("new_manager_id", request.new_manager_id.as_str())
                .with_metadata("reasons", plan.validation.reasons().join("; ")),
            );
            return Err(DomainError::InvalidMove { violations: plan.validation.violations }.into());
        }

        let movement = HierarchyMove {
            id: HierarchyMoveId(format!("MV-{}", Uuid::new_v4())),
            employee_id: plan.employee_id.clone(),
            previous_manager_id: plan.expected_manager_id.clone(),
            new_manager_id: plan.new_manager_id.clone(),
            moved_by: context.actor.clone(),
            reason: request.reason.clone(),
            moved_at: Utc::now(),
        };

        if !self.repository.apply_move(&movement).await? {
            warn!(
                event_name = "hierarchy.move.conflict",
                correlation_id = %context.correlation_id,
                employee_id = %movement.employee_id,
                "manager changed between validation and update"
            );
            return Err(ApplicationError::Conflict("hierarchy changed, retry".to_string()));
        }

        info!(
            event_name = "hierarchy.move.applied",
            correlation_id = %context.correlation_id,
            employee_id = %movement.employee_id,
            new_manager_id = %movement.new_manager_id,
            "hierarchy move applied"
        );
        let mut event = AuditEvent::new(
            Some(movement.employee_id.to_string()),
            context,
            "hierarchy.move.applied",
            AuditCategory::Hierarchy,
            AuditOutcome::Success,
        )
        .with_metadata("move_id", movement.id.0.as_str())
        .with_metadata("new_manager_id", movement.new_manager_id.as_str());
        if let Some(previous) = &movement.previous_manager_id {
            event = event.with_metadata("previous_manager_id", previous.as_str());
        }
        self.audit.emit(event);

        Ok(movement)
    }

    pub async fn move_history(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<HierarchyMove>, ApplicationError> {
        Ok(self.repository.list_moves(employee_id).await?)
    }
}
