use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::employee::EmployeeId;
use crate::hierarchy::ManagerIndex;

pub const DEFAULT_MAX_DEPTH: u32 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRules {
    pub max_depth: u32,
}

impl Default for MoveRules {
    fn default() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum MoveViolation {
    SelfParenting,
    ManagerNotFound { manager_id: EmployeeId },
    InactiveManager { manager_id: EmployeeId },
    CreatesCycle { manager_id: EmployeeId },
    AlreadyReportsTo { manager_id: EmployeeId },
    DepthExceeded { resulting_depth: u32, max_depth: u32 },
}

impl MoveViolation {
    pub fn reason(&self) -> String {
        match self {
            Self::SelfParenting => "an employee cannot be their own manager".to_string(),
            Self::ManagerNotFound { manager_id } => {
                format!("manager `{manager_id}` does not exist")
            }
            Self::InactiveManager { manager_id } => {
                format!("manager `{manager_id}` is inactive")
            }
            Self::CreatesCycle { manager_id } => {
                format!("manager `{manager_id}` reports to the employee being moved")
            }
            Self::AlreadyReportsTo { manager_id } => {
                format!("employee already reports to `{manager_id}`")
            }
            Self::DepthExceeded { resulting_depth, max_depth } => {
                format!("move would place reports at depth {resulting_depth}, limit is {max_depth}")
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveValidation {
    pub violations: Vec<MoveViolation>,
}

impl MoveValidation {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.violations.iter().map(MoveViolation::reason).collect()
    }

    pub fn has(&self, predicate: impl Fn(&MoveViolation) -> bool) -> bool {
        self.violations.iter().any(predicate)
    }
}

/// Outcome of validating a re-parenting request against one snapshot of the
/// directory. `expected_manager_id` is the manager observed in that snapshot
/// and becomes the precondition of the persisted update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovePlan {
    pub employee_id: EmployeeId,
    pub expected_manager_id: Option<EmployeeId>,
    pub new_manager_id: EmployeeId,
    pub validation: MoveValidation,
}

impl MovePlan {
    pub fn is_valid(&self) -> bool {
        self.validation.is_valid()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("employee `{0}` not found")]
    EmployeeNotFound(EmployeeId),
}

/// `index` must cover the whole stored relation, inactive employees
/// included; otherwise an inactive link hides an ancestor and a cycle slips
/// through.
pub fn propose_move(
    index: &ManagerIndex<'_>,
    rules: &MoveRules,
    employee_id: &EmployeeId,
    new_manager_id: &EmployeeId,
) -> Result<MovePlan, MoveError> {
    let employee =
        index.get(employee_id).ok_or_else(|| MoveError::EmployeeNotFound(employee_id.clone()))?;

    let mut violations = Vec::new();
    if employee_id == new_manager_id {
        violations.push(MoveViolation::SelfParenting);
    } else if !index.contains(new_manager_id) {
        violations.push(MoveViolation::ManagerNotFound { manager_id: new_manager_id.clone() });
    } else {
        if index.get(new_manager_id).is_some_and(|manager| !manager.active) {
            violations
                .push(MoveViolation::InactiveManager { manager_id: new_manager_id.clone() });
        }

        let creates_cycle = index.is_ancestor(employee_id, new_manager_id);
        if creates_cycle {
            violations.push(MoveViolation::CreatesCycle { manager_id: new_manager_id.clone() });
        }

        if employee.manager_id.as_ref() == Some(new_manager_id) {
            violations
                .push(MoveViolation::AlreadyReportsTo { manager_id: new_manager_id.clone() });
        }

        if !creates_cycle {
            let manager_level = index.level(new_manager_id).unwrap_or(0);
            let resulting_depth = manager_level + 1 + index.subtree_height(employee_id);
            if resulting_depth > rules.max_depth {
                violations.push(MoveViolation::DepthExceeded {
                    resulting_depth,
                    max_depth: rules.max_depth,
                });
            }
        }
    }

    Ok(MovePlan {
        employee_id: employee_id.clone(),
        expected_manager_id: employee.manager_id.clone(),
        new_manager_id: new_manager_id.clone(),
        validation: MoveValidation { violations },
    })
}
