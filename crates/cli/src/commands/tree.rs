use std::sync::Arc;

use orgflow_core::audit::InMemoryAuditSink;
use orgflow_core::domain::employee::EmployeeFilter;
use orgflow_core::hierarchy::HierarchyNode;
use orgflow_db::{HierarchyService, SqlEmployeeRepository};
use serde_json::json;

use crate::commands::{with_migrated_pool, CommandResult};

#[derive(Clone, Debug, Default)]
pub struct TreeOptions {
    pub department_id: Option<String>,
    pub include_inactive: bool,
    pub leaders_only: bool,
}

pub fn run(options: TreeOptions) -> CommandResult {
    let filter = EmployeeFilter {
        department_id: options.department_id.clone(),
        include_inactive: options.include_inactive,
    };

    let result = with_migrated_pool("tree", |config, pool| async move {
        let service = HierarchyService::new(
            SqlEmployeeRepository::new(pool),
            config.move_rules(),
            Arc::new(InMemoryAuditSink::default()),
        );
        let load = async {
            let forest = if options.leaders_only {
                service.leaders(&filter).await?
            } else {
                service.full_forest(&filter).await?
            };
            let stats = service.stats(&filter).await?;
            Ok::<_, orgflow_core::errors::ApplicationError>((forest, stats))
        };
        load.await.map_err(|error| ("hierarchy_query", error.to_string(), 6u8))
    });

    match result {
        Ok((forest, stats)) => {
            let lines = render(&forest);
            CommandResult::success_with_data(
                "tree",
                format!("{} roots, {} employees", stats.roots, stats.total_employees),
                Some(json!({ "lines": lines, "stats": stats })),
            )
        }
        Err(failure) => failure,
    }
}

/// Indented outline, two spaces per level.
pub fn render(forest: &[HierarchyNode]) -> Vec<String> {
    let mut lines = Vec::new();
    for root in forest {
        render_node(root, &mut lines);
    }
    lines
}

fn render_node(node: &HierarchyNode, lines: &mut Vec<String>) {
    let indent = "  ".repeat(usize::try_from(node.level).unwrap_or(0));
    let reports = if node.direct_reports > 0 {
        format!(" [{} reports]", node.direct_reports)
    } else {
        String::new()
    };
    lines.push(format!("{indent}- {} ({}){reports}", node.employee.name, node.employee.id));
    for child in &node.children {
        render_node(child, lines);
    }
}
