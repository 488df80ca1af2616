use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use orgflow_core::domain::approval::{
    ApprovalFlow, ApprovalFlowId, FlowStatus, JobDescriptionId, RecordStatus, WorkflowHistoryEntry,
};
use orgflow_core::domain::employee::{Employee, EmployeeFilter, EmployeeId, HierarchyMove};
use orgflow_core::domain::nps::{
    AlertId, AlertStatus, DetractorAlert, ScheduledTrigger, Survey, SurveyId, SurveyResponse,
    TriggerId, TriggerStatus,
};
use orgflow_core::workflow::ApprovalTransition;

use super::{
    ApprovalFlowRepository, DetractorAlertRepository, EmployeeRepository, RepositoryError,
    RevisionedRecord, SurveyRepository, TriggerRepository, TriggerTuple,
};

#[derive(Default)]
struct DirectoryState {
    employees: HashMap<String, Employee>,
    moves: Vec<HierarchyMove>,
}

#[derive(Default)]
pub struct InMemoryEmployeeRepository {
    state: RwLock<DirectoryState>,
}

impl InMemoryEmployeeRepository {
    pub async fn with_employees(employees: impl IntoIterator<Item = Employee>) -> Self {
        let repo = Self::default();
        {
            let mut state = repo.state.write().await;
            for employee in employees {
                state.employees.insert(employee.id.0.clone(), employee);
            }
        }
        repo
    }
}

#[async_trait::async_trait]
impl EmployeeRepository for InMemoryEmployeeRepository {
    async fn list(&self, filter: &EmployeeFilter) -> Result<Vec<Employee>, RepositoryError> {
        let state = self.state.read().await;
        let mut employees: Vec<Employee> =
            state.employees.values().filter(|employee| filter.matches(employee)).cloned().collect();
        employees.sort_by(|left, right| left.name.cmp(&right.name).then(left.id.cmp(&right.id)));
        Ok(employees)
    }

    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.employees.get(&id.0).cloned())
    }

    async fn save(&self, employee: Employee) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.employees.insert(employee.id.0.clone(), employee);
        Ok(())
    }

    async fn apply_move(&self, movement: &HierarchyMove) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let Some(employee) = state.employees.get_mut(&movement.employee_id.0) else {
            return Ok(false);
        };
        if employee.manager_id != movement.previous_manager_id {
            return Ok(false);
        }
        employee.manager_id = Some(movement.new_manager_id.clone());
        state.moves.push(movement.clone());
        Ok(true)
    }

    async fn list_moves(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<HierarchyMove>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.moves.iter().filter(|movement| &movement.employee_id == employee_id).cloned().collect())
    }
}

#[derive(Default)]
struct WorkflowState {
    flows: HashMap<String, ApprovalFlow>,
    records: HashMap<String, Vec<RevisionedRecord>>,
    history: Vec<WorkflowHistoryEntry>,
}

#[derive(Default)]
pub struct InMemoryApprovalFlowRepository {
    state: RwLock<WorkflowState>,
}

#[async_trait::async_trait]
impl ApprovalFlowRepository for InMemoryApprovalFlowRepository {
    async fn find_by_id(
        &self,
        id: &ApprovalFlowId,
    ) -> Result<Option<ApprovalFlow>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.flows.get(&id.0).cloned())
    }

    async fn find_by_job_description(
        &self,
        job_description_id: &JobDescriptionId,
    ) -> Result<Option<ApprovalFlow>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .flows
            .values()
            .find(|flow| &flow.job_description_id == job_description_id)
            .cloned())
    }

    async fn insert_draft(&self, transition: &ApprovalTransition) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let flow = &transition.flow;
        let taken = state.flows.values().any(|existing| {
            existing.id == flow.id || existing.job_description_id == flow.job_description_id
        });
        if taken {
            return Ok(false);
        }
        state.flows.insert(flow.id.0.clone(), flow.clone());
        state.history.push(transition.history.clone());
        Ok(true)
    }

    async fn save_transition(
        &self,
        transition: &ApprovalTransition,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let flow = &transition.flow;
        let current_version = state.flows.get(&flow.id.0).map(|stored| stored.state_version);
        if current_version != Some(transition.expected_version) {
            return Ok(false);
        }

        state.flows.insert(flow.id.0.clone(), flow.clone());
        let records = state.records.entry(flow.id.0.clone()).or_default();
        records.retain(|stored| stored.revision != flow.revision);
        records.extend(
            flow.approvals
                .iter()
                .cloned()
                .map(|record| RevisionedRecord { revision: flow.revision, record }),
        );
        records.sort_by_key(|stored| (stored.revision, stored.record.level));
        state.history.push(transition.history.clone());
        Ok(true)
    }

    async fn history(
        &self,
        flow_id: &ApprovalFlowId,
    ) -> Result<Vec<WorkflowHistoryEntry>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.history.iter().filter(|entry| &entry.flow_id == flow_id).cloned().collect())
    }

    async fn records(
        &self,
        flow_id: &ApprovalFlowId,
    ) -> Result<Vec<RevisionedRecord>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.records.get(&flow_id.0).cloned().unwrap_or_default())
    }

    async fn pending_for_approver(
        &self,
        level: u8,
        approver_id: &EmployeeId,
    ) -> Result<Vec<ApprovalFlow>, RepositoryError> {
        let state = self.state.read().await;
        let mut flows: Vec<ApprovalFlow> = state
            .flows
            .values()
            .filter(|flow| {
                flow.status == FlowStatus::PendingLevel(level)
                    && flow.current_level == level
                    && flow.record(level).is_some_and(|record| {
                        &record.approver_id == approver_id && record.status == RecordStatus::Pending
                    })
            })
            .cloned()
            .collect();
        flows.sort_by(|left, right| {
            left.updated_at.cmp(&right.updated_at).then(left.id.0.cmp(&right.id.0))
        });
        Ok(flows)
    }
}

#[derive(Default)]
struct NpsState {
    surveys: HashMap<String, Survey>,
    triggers: HashMap<String, ScheduledTrigger>,
    responses: Vec<SurveyResponse>,
    alerts: HashMap<String, DetractorAlert>,
}

#[derive(Default)]
pub struct InMemoryNpsRepository {
    state: RwLock<NpsState>,
}

#[async_trait::async_trait]
impl SurveyRepository for InMemoryNpsRepository {
    async fn find_survey(&self, id: &SurveyId) -> Result<Option<Survey>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.surveys.get(&id.0).cloned())
    }

    async fn active_survey_for_event(
        &self,
        trigger_event: &str,
    ) -> Result<Option<Survey>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .surveys
            .values()
            .filter(|survey| survey.is_active() && survey.trigger_event == trigger_event)
            .min_by(|left, right| left.id.0.cmp(&right.id.0))
            .cloned())
    }

    async fn save_survey(&self, survey: Survey) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.surveys.insert(survey.id.0.clone(), survey);
        Ok(())
    }

    async fn find_response(
        &self,
        tuple: &TriggerTuple<'_>,
    ) -> Result<Option<SurveyResponse>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .responses
            .iter()
            .filter(|response| tuple.matches_response(response))
            .max_by(|left, right| {
                left.created_at.cmp(&right.created_at).then(left.id.0.cmp(&right.id.0))
            })
            .cloned())
    }

    async fn save_response(&self, response: SurveyResponse) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.responses.push(response);
        Ok(())
    }
}

#[async_trait::async_trait]
impl TriggerRepository for InMemoryNpsRepository {
    async fn find_trigger(
        &self,
        id: &TriggerId,
    ) -> Result<Option<ScheduledTrigger>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.triggers.get(&id.0).cloned())
    }

    async fn find_pending_trigger(
        &self,
        tuple: &TriggerTuple<'_>,
    ) -> Result<Option<ScheduledTrigger>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .triggers
            .values()
            .find(|trigger| trigger.status == TriggerStatus::Pending && tuple.matches_trigger(trigger))
            .cloned())
    }

    async fn insert_pending_trigger(
        &self,
        trigger: &ScheduledTrigger,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let tuple = TriggerTuple {
            survey_id: &trigger.survey_id,
            employee_id: &trigger.employee_id,
            process_id: &trigger.process_id,
        };
        let duplicate = state.triggers.contains_key(&trigger.id.0)
            || state.triggers.values().any(|existing| {
                existing.status == TriggerStatus::Pending && tuple.matches_trigger(existing)
            });
        if duplicate {
            return Ok(false);
        }
        state.triggers.insert(trigger.id.0.clone(), trigger.clone());
        Ok(true)
    }

    async fn due_triggers(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledTrigger>, RepositoryError> {
        let state = self.state.read().await;
        let mut due: Vec<ScheduledTrigger> =
            state.triggers.values().filter(|trigger| trigger.is_due(now)).cloned().collect();
        due.sort_by(|left, right| {
            left.scheduled_for.cmp(&right.scheduled_for).then(left.id.0.cmp(&right.id.0))
        });
        Ok(due)
    }

    async fn open_triggers(
        &self,
        tuple: &TriggerTuple<'_>,
    ) -> Result<Vec<ScheduledTrigger>, RepositoryError> {
        let state = self.state.read().await;
        let mut open: Vec<ScheduledTrigger> = state
            .triggers
            .values()
            .filter(|trigger| {
                matches!(trigger.status, TriggerStatus::Pending | TriggerStatus::Sent)
                    && tuple.matches_trigger(trigger)
            })
            .cloned()
            .collect();
        open.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then(left.id.0.cmp(&right.id.0))
        });
        Ok(open)
    }

    async fn transition_trigger(
        &self,
        trigger: &ScheduledTrigger,
        expected: TriggerStatus,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        match state.triggers.get_mut(&trigger.id.0) {
            Some(stored) if stored.status == expected => {
                *stored = trigger.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait::async_trait]
impl DetractorAlertRepository for InMemoryNpsRepository {
    async fn insert_alert(&self, alert: &DetractorAlert) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.alerts.insert(alert.id.0.clone(), alert.clone());
        Ok(())
    }

    async fn find_alert(&self, id: &AlertId) -> Result<Option<DetractorAlert>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.alerts.get(&id.0).cloned())
    }

    async fn list_alerts(
        &self,
        status: Option<AlertStatus>,
    ) -> Result<Vec<DetractorAlert>, RepositoryError> {
        let state = self.state.read().await;
        let mut alerts: Vec<DetractorAlert> = state
            .alerts
            .values()
            .filter(|alert| status.map_or(true, |status| alert.status == status))
            .cloned()
            .collect();
        alerts.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then(right.id.0.cmp(&left.id.0))
        });
        Ok(alerts)
    }

    async fn update_alert(
        &self,
        alert: &DetractorAlert,
        expected: AlertStatus,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        match state.alerts.get_mut(&alert.id.0) {
            Some(stored) if stored.status == expected => {
                *stored = alert.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use orgflow_core::domain::approval::JobDescriptionId;
    use orgflow_core::domain::employee::{Employee, EmployeeFilter, EmployeeId, HierarchyMove, HierarchyMoveId};
    use orgflow_core::workflow::{ApprovalWorkflow, ApproverAssignments};

    use crate::repositories::{
        ApprovalFlowRepository, EmployeeRepository, InMemoryApprovalFlowRepository,
        InMemoryEmployeeRepository,
    };

    #[tokio::test]
    async fn in_memory_directory_orders_by_name_and_guards_moves() {
        let repo = InMemoryEmployeeRepository::with_employees([
            Employee::new("2", "Zoe").reporting_to("1"),
            Employee::new("1", "Ana"),
        ])
        .await;

        let names: Vec<_> = repo
            .list(&EmployeeFilter::default())
            .await
            .expect("list")
            .into_iter()
            .map(|employee| employee.name)
            .collect();
        assert_eq!(names, vec!["Ana", "Zoe"]);

        let stale = HierarchyMove {
            id: HierarchyMoveId("MV-1".to_string()),
            employee_id: EmployeeId::new("1"),
            previous_manager_id: Some(EmployeeId::new("9")),
            new_manager_id: EmployeeId::new("2"),
            moved_by: "hr".to_string(),
            reason: None,
            moved_at: Utc::now(),
        };
        assert!(!repo.apply_move(&stale).await.expect("stale move"));
        assert!(repo.list_moves(&EmployeeId::new("1")).await.expect("moves").is_empty());
    }

    #[tokio::test]
    async fn in_memory_flows_enforce_state_version() {
        let repo = InMemoryApprovalFlowRepository::default();
        let workflow = ApprovalWorkflow::default();
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).single().expect("timestamp");
        let requester = EmployeeId::new("E-1");
        let assignments = ApproverAssignments::new()
            .assign("cs_specialist", "E-10")
            .assign("direct_leader", "E-11")
            .assign("hr_manager", "E-12")
            .assign("gai_director", "E-13");

        let draft = workflow.create_draft(JobDescriptionId("JD-1".to_string()), requester.clone(), now);
        assert!(repo.insert_draft(&draft).await.expect("insert"));
        let submitted = workflow.submit(&draft.flow, &requester, &assignments, now).expect("submit");
        assert!(repo.save_transition(&submitted).await.expect("save"));
        assert!(!repo.save_transition(&submitted).await.expect("replayed transition loses"));

        assert_eq!(repo.records(&draft.flow.id).await.expect("records").len(), 4);
        assert_eq!(
            repo.pending_for_approver(1, &EmployeeId::new("E-10")).await.expect("pending").len(),
            1
        );
    }
}
