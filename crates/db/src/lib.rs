pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod services;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{DemoSeedDataset, SeedResult, VerificationResult};
pub use repositories::{
    InMemoryApprovalFlowRepository, InMemoryEmployeeRepository, InMemoryNpsRepository,
    RepositoryError, SqlApprovalFlowRepository, SqlAuditSink, SqlEmployeeRepository,
    SqlNpsRepository,
};
pub use services::{ApprovalService, HierarchyService, NpsService};
