use std::sync::Arc;

use chrono::{Duration, Utc};

use orgflow_core::audit::{AuditContext, InMemoryAuditSink};
use orgflow_core::domain::approval::{FlowStatus, JobDescriptionId};
use orgflow_core::domain::employee::{EmployeeFilter, EmployeeId};
use orgflow_core::domain::nps::{AlertStatus, ProcessId, SurveyId, TriggerStatus};
use orgflow_core::errors::{ApplicationError, DomainError};
use orgflow_core::hierarchy::MoveRules;
use orgflow_core::notify::InMemoryNotificationSink;
use orgflow_core::nps::{NpsSettings, TriggerRequest};
use orgflow_core::workflow::{ApprovalLevels, ApprovalWorkflow, ApproverAssignments, WorkflowRules};
use orgflow_db::repositories::TriggerRepository;
use orgflow_db::services::{MoveRequest, NewResponse, ScheduleOutcome};
use orgflow_db::{
    connect_with_settings, migrations, ApprovalService, DbPool, DemoSeedDataset,
    HierarchyService, NpsService, SqlApprovalFlowRepository, SqlEmployeeRepository,
    SqlNpsRepository,
};

async fn seeded_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");
    DemoSeedDataset::load(&pool).await.expect("seed");
    pool
}

fn id(value: &str) -> EmployeeId {
    EmployeeId::new(value)
}

#[tokio::test]
async fn seeded_hierarchy_moves_and_rejects_cycles() {
    let pool = seeded_pool().await;
    let audit = InMemoryAuditSink::default();
    let service = HierarchyService::new(
        SqlEmployeeRepository::new(pool.clone()),
        MoveRules::default(),
        Arc::new(audit.clone()),
    );
    let context = AuditContext::new("it-hierarchy", "hr-admin");

    let stats = service.stats(&EmployeeFilter::default()).await.expect("stats");
    assert_eq!(stats.roots, 1);

    let cycle = service
        .apply_move(
            &MoveRequest { employee_id: id("emp-eng"), new_manager_id: id("emp-dev1"), reason: None },
            &context,
        )
        .await;
    assert!(matches!(cycle, Err(ApplicationError::Domain(DomainError::InvalidMove { .. }))));

    let inactive_manager = service
        .apply_move(
            &MoveRequest { employee_id: id("emp-dev2"), new_manager_id: id("emp-gone"), reason: None },
            &context,
        )
        .await;
    assert!(matches!(inactive_manager, Err(ApplicationError::NotFound(_))));

    service
        .apply_move(
            &MoveRequest {
                employee_id: id("emp-dev2"),
                new_manager_id: id("emp-hrbp"),
                reason: Some("rotation".to_string()),
            },
            &context,
        )
        .await
        .expect("move");

    let chain: Vec<_> = service
        .chain_of_command(&id("emp-dev2"))
        .await
        .expect("chain")
        .into_iter()
        .map(|employee| employee.id.0)
        .collect();
    assert_eq!(chain, vec!["emp-hrbp", "emp-hrd", "emp-ceo"]);
    assert_eq!(service.move_history(&id("emp-dev2")).await.expect("history").len(), 1);
}

#[tokio::test]
async fn approval_chain_persists_across_service_instances() {
    let pool = seeded_pool().await;
    let build = || {
        ApprovalService::new(
            SqlApprovalFlowRepository::new(pool.clone()),
            ApprovalWorkflow::new(ApprovalLevels::default(), WorkflowRules::default()),
            Arc::new(InMemoryAuditSink::default()),
            Arc::new(InMemoryNotificationSink::default()),
        )
    };
    let context = AuditContext::new("it-approval", "emp-lead");
    let jd = JobDescriptionId("JD-ENG-7".to_string());
    let assignments = ApproverAssignments::new()
        .assign("cs_specialist", "emp-hrbp")
        .assign("direct_leader", "emp-eng")
        .assign("hr_manager", "emp-hrd")
        .assign("gai_director", "emp-ceo");

    let first = build();
    first.create_draft(jd.clone(), id("emp-lead"), &context).await.expect("draft");
    first.submit(&jd, &id("emp-lead"), &assignments, &context).await.expect("submit");

    let second = build();
    let waiting = second.pending_for_approver(1, &id("emp-hrbp")).await.expect("pending");
    assert_eq!(waiting.len(), 1);
    second.approve(&jd, 1, &id("emp-hrbp"), None, &context).await.expect("approve");

    let stale = first.approve(&jd, 1, &id("emp-hrbp"), None, &context).await;
    assert!(stale.is_err());

    let flow = second.flow(&jd).await.expect("flow");
    assert_eq!(flow.status, FlowStatus::PendingLevel(2));
    assert_eq!(flow.current_level, 2);
}

#[tokio::test]
async fn nps_poller_dispatches_seeded_survey_and_follows_up_detractors() {
    let pool = seeded_pool().await;
    let notifier = InMemoryNotificationSink::default();
    let service = NpsService::new(
        SqlNpsRepository::new(pool.clone()),
        SqlEmployeeRepository::new(pool.clone()),
        NpsSettings::default(),
        Arc::new(InMemoryAuditSink::default()),
        Arc::new(notifier.clone()),
    );
    let context = AuditContext::new("it-nps", "hr-admin");
    let now = Utc::now();

    let outcome = service
        .schedule_at(
            &TriggerRequest {
                process_id: ProcessId("PDI-2026-01".to_string()),
                employee_id: id("emp-dev1"),
                delay_minutes: None,
            },
            &context,
            now,
        )
        .await;
    let ScheduleOutcome::Scheduled { trigger } = outcome else {
        panic!("expected a scheduled trigger, got {outcome:?}");
    };
    assert_eq!(trigger.survey_id, SurveyId("survey-pdi-pulse".to_string()));
    assert_eq!(trigger.scheduled_for, now + Duration::minutes(60));

    assert_eq!(service.process_pending_at(now).await.processed, 0);
    let report = service.process_pending_at(now + Duration::minutes(61)).await;
    assert_eq!((report.processed, report.sent, report.errors), (1, 1, 0));
    assert_eq!(report.details[0].message, "survey sent to Diego Rocha");

    let recorded = service
        .record_response(
            NewResponse {
                survey_id: SurveyId("survey-pdi-pulse".to_string()),
                employee_id: id("emp-dev1"),
                process_id: ProcessId("PDI-2026-01".to_string()),
                score: 6,
                comment: None,
            },
            &context,
        )
        .await
        .expect("response");
    let stored = service.repository().find_trigger(&trigger.id).await.expect("find").expect("row");
    assert_eq!(stored.status, TriggerStatus::Responded);

    let alert = recorded.alert.expect("score 6 is a detractor");
    let pending = service.pending_alerts().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].employee_name.as_deref(), Some("Diego Rocha"));

    service
        .update_alert_status(&alert.id, AlertStatus::Dismissed, None, &context)
        .await
        .expect("dismiss");
    assert!(service.pending_alerts().await.is_empty());
}
