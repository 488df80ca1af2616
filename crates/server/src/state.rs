use std::sync::Arc;

use orgflow_core::audit::AuditSink;
use orgflow_core::config::{AppConfig, ConfigError};
use orgflow_core::notify::NotificationSink;
use orgflow_core::workflow::ApprovalWorkflow;
use orgflow_db::{
    ApprovalService, DbPool, HierarchyService, NpsService, SqlApprovalFlowRepository,
    SqlAuditSink, SqlEmployeeRepository, SqlNpsRepository,
};

use crate::notifier::TracingNotificationSink;

pub type Hierarchy = HierarchyService<SqlEmployeeRepository>;
pub type Approvals = ApprovalService<SqlApprovalFlowRepository>;
pub type Nps = NpsService<SqlNpsRepository, SqlEmployeeRepository>;

/// Services shared by the HTTP handlers and the trigger poller.
pub struct AppServices {
    pub hierarchy: Hierarchy,
    pub approvals: Approvals,
    pub nps: Nps,
}

impl AppServices {
    pub fn new(config: &AppConfig, pool: DbPool) -> Result<Self, ConfigError> {
        Self::with_sinks(
            config,
            pool.clone(),
            Arc::new(SqlAuditSink::new(pool)),
            Arc::new(TracingNotificationSink),
        )
    }

    pub fn with_sinks(
        config: &AppConfig,
        pool: DbPool,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self, ConfigError> {
        let workflow = ApprovalWorkflow::new(config.approval_levels()?, config.workflow_rules());
        let employees = SqlEmployeeRepository::new(pool.clone());

        Ok(Self {
            hierarchy: HierarchyService::new(employees.clone(), config.move_rules(), audit.clone()),
            approvals: ApprovalService::new(
                SqlApprovalFlowRepository::new(pool.clone()),
                workflow,
                audit.clone(),
                notifier.clone(),
            ),
            nps: NpsService::new(
                SqlNpsRepository::new(pool),
                employees,
                config.nps_settings(),
                audit,
                notifier,
            ),
        })
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub services: Arc<AppServices>,
}
