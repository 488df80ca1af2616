use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::employee::{Employee, EmployeeId};
use crate::hierarchy::ManagerIndex;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub employee: Employee,
    pub level: u32,
    pub has_children: bool,
    pub is_expanded: bool,
    pub direct_reports: usize,
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    pub fn id(&self) -> &EmployeeId {
        &self.employee.id
    }

    /// Depth-first lookup inside the materialized part of the tree.
    pub fn find(&self, id: &EmployeeId) -> Option<&HierarchyNode> {
        if self.id() == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    pub fn visible_count(&self) -> usize {
        1 + self.children.iter().map(HierarchyNode::visible_count).sum::<usize>()
    }
}

enum Expansion<'e> {
    All,
    Only(&'e HashSet<EmployeeId>),
}

impl Expansion<'_> {
    fn contains(&self, id: &EmployeeId) -> bool {
        match self {
            Self::All => true,
            Self::Only(expanded) => expanded.contains(id),
        }
    }
}

/// Builds the forest, materializing children only under `expanded` employees.
/// Unexpanded parents still report `has_children` so a caller can offer to
/// open them.
pub fn build_forest(employees: &[Employee], expanded: &HashSet<EmployeeId>) -> Vec<HierarchyNode> {
    let index = ManagerIndex::new(employees);
    build_with(&index, &Expansion::Only(expanded))
}

pub fn build_full_forest(employees: &[Employee]) -> Vec<HierarchyNode> {
    let index = ManagerIndex::new(employees);
    build_with(&index, &Expansion::All)
}

/// Keeps roots and anyone managing at least one person.
pub fn leaders_only(forest: Vec<HierarchyNode>) -> Vec<HierarchyNode> {
    forest
        .into_iter()
        .filter(|node| node.level == 0 || node.has_children)
        .map(|mut node| {
            node.children = leaders_only(std::mem::take(&mut node.children));
            node
        })
        .collect()
}

fn build_with(index: &ManagerIndex<'_>, expansion: &Expansion<'_>) -> Vec<HierarchyNode> {
    index
        .parents
        .iter()
        .enumerate()
        .filter(|(_, parent)| parent.is_none())
        .map(|(position, _)| build_node(index, position, expansion))
        .collect()
}

fn build_node(index: &ManagerIndex<'_>, position: usize, expansion: &Expansion<'_>) -> HierarchyNode {
    let employee = index.employees[position];
    let child_positions = index.children_positions(position);
    let is_expanded = expansion.contains(&employee.id);

    let children = if is_expanded {
        child_positions.iter().map(|child| build_node(index, *child, expansion)).collect()
    } else {
        Vec::new()
    };

    HierarchyNode {
        employee: employee.clone(),
        level: index.levels[position],
        has_children: !child_positions.is_empty(),
        is_expanded,
        direct_reports: child_positions.len(),
        children,
    }
}
