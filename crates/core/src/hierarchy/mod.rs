//! Manager/subordinate forest over a flat employee list.
//!
//! [`ManagerIndex`] resolves every employee's *effective* parent once: the
//! manager when it is present in the input and is not the employee itself.
//! Cycles in the input are cut at the member that appears first in input
//! order, so every walk over effective parents terminates. Both the builder
//! (levels, children) and the mutator (cycle and depth checks) read the
//! relation through this index.

pub mod builder;
pub mod mutator;
pub mod stats;

use std::collections::{HashMap, VecDeque};

use crate::domain::employee::{Employee, EmployeeId};

pub use builder::{build_forest, build_full_forest, leaders_only, HierarchyNode};
pub use mutator::{propose_move, MoveError, MovePlan, MoveRules, MoveValidation, MoveViolation};
pub use stats::HierarchyStats;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unvisited,
    OnPath,
    Done,
}

#[derive(Clone, Debug)]
pub struct ManagerIndex<'a> {
    employees: Vec<&'a Employee>,
    positions: HashMap<&'a EmployeeId, usize>,
    parents: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    levels: Vec<u32>,
    broken_cycles: Vec<EmployeeId>,
}

impl<'a> ManagerIndex<'a> {
    pub fn new(input: &'a [Employee]) -> Self {
        let mut employees = Vec::with_capacity(input.len());
        let mut positions = HashMap::with_capacity(input.len());
        for employee in input {
            if positions.contains_key(&employee.id) {
                continue;
            }
            positions.insert(&employee.id, employees.len());
            employees.push(employee);
        }

        let mut parents: Vec<Option<usize>> = employees
            .iter()
            .enumerate()
            .map(|(position, employee)| {
                employee
                    .manager_id
                    .as_ref()
                    .and_then(|manager_id| positions.get(manager_id).copied())
                    .filter(|parent| *parent != position)
            })
            .collect();

        let broken_cycles = break_cycles(&employees, &mut parents);

        let mut children = vec![Vec::new(); employees.len()];
        for (position, parent) in parents.iter().enumerate() {
            if let Some(parent) = parent {
                children[*parent].push(position);
            }
        }

        let levels = compute_levels(&parents);

        Self { employees, positions, parents, children, levels, broken_cycles }
    }

    pub fn len(&self) -> usize {
        self.employees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.employees.is_empty()
    }

    pub fn contains(&self, id: &EmployeeId) -> bool {
        self.positions.contains_key(id)
    }

    pub fn get(&self, id: &EmployeeId) -> Option<&'a Employee> {
        self.position(id).map(|position| self.employees[position])
    }

    /// Employees in input order, duplicates dropped.
    pub fn employees(&self) -> &[&'a Employee] {
        &self.employees
    }

    pub fn parent_of(&self, id: &EmployeeId) -> Option<&'a Employee> {
        let position = self.position(id)?;
        self.parents[position].map(|parent| self.employees[parent])
    }

    pub fn level(&self, id: &EmployeeId) -> Option<u32> {
        self.position(id).map(|position| self.levels[position])
    }

    pub fn has_children(&self, id: &EmployeeId) -> bool {
        self.position(id).is_some_and(|position| !self.children[position].is_empty())
    }

    pub fn children_of(&self, id: &EmployeeId) -> Vec<&'a Employee> {
        self.position(id)
            .map(|position| {
                self.children[position].iter().map(|child| self.employees[*child]).collect()
            })
            .unwrap_or_default()
    }

    pub fn roots(&self) -> Vec<&'a Employee> {
        self.parents
            .iter()
            .enumerate()
            .filter(|(_, parent)| parent.is_none())
            .map(|(position, _)| self.employees[position])
            .collect()
    }

    /// Chain of command, nearest manager first.
    pub fn ancestors(&self, id: &EmployeeId) -> Vec<&'a Employee> {
        let mut chain = Vec::new();
        let mut cursor = self.position(id).and_then(|position| self.parents[position]);
        while let Some(position) = cursor {
            chain.push(self.employees[position]);
            cursor = self.parents[position];
        }
        chain
    }

    /// True when `ancestor` sits strictly above `id` in the forest.
    pub fn is_ancestor(&self, ancestor: &EmployeeId, id: &EmployeeId) -> bool {
        let Some(target) = self.position(ancestor) else {
            return false;
        };
        let mut cursor = self.position(id).and_then(|position| self.parents[position]);
        while let Some(position) = cursor {
            if position == target {
                return true;
            }
            cursor = self.parents[position];
        }
        false
    }

    /// Direct and indirect reports, breadth first.
    pub fn descendants(&self, id: &EmployeeId) -> Vec<&'a Employee> {
        let Some(start) = self.position(id) else {
            return Vec::new();
        };

        let mut found = Vec::new();
        let mut queue: VecDeque<usize> = self.children[start].iter().copied().collect();
        while let Some(position) = queue.pop_front() {
            found.push(self.employees[position]);
            queue.extend(self.children[position].iter().copied());
        }
        found
    }

    /// Number of levels below `id`; zero for a leaf.
    pub fn subtree_height(&self, id: &EmployeeId) -> u32 {
        let Some(start) = self.position(id) else {
            return 0;
        };
        let base = self.levels[start];
        self.descendants(id)
            .iter()
            .filter_map(|employee| self.level(&employee.id))
            .map(|level| level - base)
            .max()
            .unwrap_or(0)
    }

    /// Employees whose manager edge was ignored to break a cycle in the input.
    pub fn broken_cycles(&self) -> &[EmployeeId] {
        &self.broken_cycles
    }

    pub fn is_forest(&self) -> bool {
        self.broken_cycles.is_empty()
    }

    fn position(&self, id: &EmployeeId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    fn children_positions(&self, position: usize) -> &[usize] {
        &self.children[position]
    }
}

fn break_cycles(employees: &[&Employee], parents: &mut [Option<usize>]) -> Vec<EmployeeId> {
    let mut visits = vec![Visit::Unvisited; parents.len()];
    let mut broken = Vec::new();

    for start in 0..parents.len() {
        if visits[start] != Visit::Unvisited {
            continue;
        }

        let mut path: Vec<usize> = Vec::new();
        let mut cursor = Some(start);
        while let Some(position) = cursor {
            match visits[position] {
                Visit::Done => break,
                Visit::OnPath => {
                    let cycle_start = path.iter().position(|entry| *entry == position);
                    let breaker = cycle_start.and_then(|index| path[index..].iter().min().copied());
                    if let Some(breaker) = breaker {
                        parents[breaker] = None;
                        broken.push(employees[breaker].id.clone());
                    }
                    break;
                }
                Visit::Unvisited => {
                    visits[position] = Visit::OnPath;
                    path.push(position);
                    cursor = parents[position];
                }
            }
        }

        for position in path {
            visits[position] = Visit::Done;
        }
    }

    broken
}

fn compute_levels(parents: &[Option<usize>]) -> Vec<u32> {
    let mut levels: Vec<Option<u32>> = vec![None; parents.len()];

    for start in 0..parents.len() {
        let mut path = Vec::new();
        let mut cursor = Some(start);
        let mut base = 0;
        while let Some(position) = cursor {
            if let Some(level) = levels[position] {
                base = level + 1;
                break;
            }
            path.push(position);
            cursor = parents[position];
        }

        for (offset, position) in path.iter().rev().enumerate() {
            levels[*position] = Some(base + offset as u32);
        }
    }

    levels.into_iter().map(|level| level.unwrap_or(0)).collect()
}

#[cfg(test)]
mod tests {
    use crate::domain::employee::{Employee, EmployeeId};

    use super::ManagerIndex;

    fn id(value: &str) -> EmployeeId {
        EmployeeId::new(value)
    }

    fn chain() -> Vec<Employee> {
        vec![
            Employee::new("1", "Director"),
            Employee::new("2", "Manager").reporting_to("1"),
            Employee::new("3", "Analyst").reporting_to("2"),
        ]
    }

    #[test]
    fn levels_follow_manager_chain() {
        let employees = chain();
        let index = ManagerIndex::new(&employees);

        assert_eq!(index.level(&id("1")), Some(0));
        assert_eq!(index.level(&id("2")), Some(1));
        assert_eq!(index.level(&id("3")), Some(2));
        assert!(index.is_forest());
    }

    #[test]
    fn level_is_parent_level_plus_one_for_every_present_parent() {
        let employees = vec![
            Employee::new("4", "Analyst").reporting_to("2"),
            Employee::new("2", "Manager").reporting_to("1"),
            Employee::new("5", "Intern").reporting_to("4"),
            Employee::new("1", "Director"),
            Employee::new("6", "Contractor").reporting_to("99"),
        ];
        let index = ManagerIndex::new(&employees);

        for employee in &employees {
            let level = index.level(&employee.id).expect("indexed");
            match index.parent_of(&employee.id) {
                Some(parent) => assert_eq!(level, index.level(&parent.id).expect("parent") + 1),
                None => assert_eq!(level, 0),
            }
        }
    }

    #[test]
    fn dangling_and_self_references_become_roots() {
        let employees = vec![
            Employee::new("10", "Paged out").reporting_to("missing"),
            Employee::new("11", "Self managed").reporting_to("11"),
        ];
        let index = ManagerIndex::new(&employees);

        assert_eq!(index.level(&id("10")), Some(0));
        assert_eq!(index.level(&id("11")), Some(0));
        assert_eq!(index.roots().len(), 2);
        assert!(index.broken_cycles().is_empty());
    }

    #[test]
    fn input_cycle_is_cut_at_first_member_in_input_order() {
        let employees = vec![
            Employee::new("a", "A").reporting_to("c"),
            Employee::new("b", "B").reporting_to("a"),
            Employee::new("c", "C").reporting_to("b"),
            Employee::new("d", "D").reporting_to("c"),
        ];
        let index = ManagerIndex::new(&employees);

        assert_eq!(index.broken_cycles(), &[id("a")]);
        assert!(!index.is_forest());
        assert_eq!(index.level(&id("a")), Some(0));
        assert_eq!(index.level(&id("b")), Some(1));
        assert_eq!(index.level(&id("c")), Some(2));
        assert_eq!(index.level(&id("d")), Some(3));
    }

    #[test]
    fn ancestry_queries_walk_effective_parents() {
        let employees = chain();
        let index = ManagerIndex::new(&employees);

        let ancestors: Vec<_> = index.ancestors(&id("3")).iter().map(|e| e.id.clone()).collect();
        assert_eq!(ancestors, vec![id("2"), id("1")]);
        assert!(index.is_ancestor(&id("1"), &id("3")));
        assert!(!index.is_ancestor(&id("3"), &id("1")));
        assert!(!index.is_ancestor(&id("1"), &id("1")));
        assert_eq!(index.subtree_height(&id("1")), 2);
        assert_eq!(index.subtree_height(&id("3")), 0);
    }

    #[test]
    fn descendants_are_breadth_first() {
        let employees = vec![
            Employee::new("1", "Director"),
            Employee::new("2", "Manager A").reporting_to("1"),
            Employee::new("3", "Manager B").reporting_to("1"),
            Employee::new("4", "Analyst").reporting_to("2"),
        ];
        let index = ManagerIndex::new(&employees);

        let ids: Vec<_> = index.descendants(&id("1")).iter().map(|e| e.id.0.clone()).collect();
        assert_eq!(ids, vec!["2", "3", "4"]);
        assert!(index.descendants(&id("unknown")).is_empty());
    }

    #[test]
    fn duplicate_ids_keep_first_record() {
        let employees = vec![
            Employee::new("1", "Director"),
            Employee::new("1", "Shadow copy").reporting_to("2"),
            Employee::new("2", "Manager").reporting_to("1"),
        ];
        let index = ManagerIndex::new(&employees);

        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&id("1")).map(|e| e.name.as_str()), Some("Director"));
        assert!(index.is_forest());
    }
}
