use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeId;
use crate::hierarchy::ManagerIndex;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyStats {
    pub total_employees: usize,
    pub roots: usize,
    pub managers: usize,
    /// Average number of direct reports per manager, one decimal.
    pub avg_span_of_control: f64,
    pub max_depth: u32,
    pub broken_cycles: Vec<EmployeeId>,
}

impl HierarchyStats {
    pub fn from_index(index: &ManagerIndex<'_>) -> Self {
        let total_employees = index.len();
        let roots = index.parents.iter().filter(|parent| parent.is_none()).count();
        let managers = index.children.iter().filter(|children| !children.is_empty()).count();
        let direct_links = total_employees - roots;

        let avg_span_of_control = if managers == 0 {
            0.0
        } else {
            ((direct_links as f64 / managers as f64) * 10.0).round() / 10.0
        };

        Self {
            total_employees,
            roots,
            managers,
            avg_span_of_control,
            max_depth: index.levels.iter().copied().max().unwrap_or(0),
            broken_cycles: index.broken_cycles().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::employee::Employee;
    use crate::hierarchy::ManagerIndex;

    use super::HierarchyStats;

    #[test]
    fn stats_summarize_span_and_depth() {
        let employees = vec![
            Employee::new("1", "Director"),
            Employee::new("2", "Manager").reporting_to("1"),
            Employee::new("3", "Analyst").reporting_to("2"),
            Employee::new("4", "Analyst").reporting_to("2"),
            Employee::new("5", "Analyst").reporting_to("2"),
            Employee::new("6", "Freelancer"),
        ];
        let index = ManagerIndex::new(&employees);

        let stats = HierarchyStats::from_index(&index);

        assert_eq!(stats.total_employees, 6);
        assert_eq!(stats.roots, 2);
        assert_eq!(stats.managers, 2);
        assert_eq!(stats.avg_span_of_control, 2.0);
        assert_eq!(stats.max_depth, 2);
        assert!(stats.broken_cycles.is_empty());
    }

    #[test]
    fn empty_directory_has_zeroed_stats() {
        let stats = HierarchyStats::from_index(&ManagerIndex::new(&[]));

        assert_eq!(stats, HierarchyStats::default());
    }
}
