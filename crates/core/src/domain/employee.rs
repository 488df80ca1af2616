use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

impl EmployeeId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HierarchyMoveId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    pub email: Option<String>,
    pub department_id: Option<String>,
    pub position_id: Option<String>,
    pub manager_id: Option<EmployeeId>,
    pub active: bool,
}

impl Employee {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: EmployeeId(id.into()),
            name: name.into(),
            email: None,
            department_id: None,
            position_id: None,
            manager_id: None,
            active: true,
        }
    }

    pub fn reporting_to(mut self, manager_id: impl Into<String>) -> Self {
        self.manager_id = Some(EmployeeId(manager_id.into()));
        self
    }

    pub fn reports_to(&self, manager_id: &EmployeeId) -> bool {
        self.manager_id.as_ref() == Some(manager_id)
    }
}

/// One applied re-parenting, kept as movement history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyMove {
    pub id: HierarchyMoveId,
    pub employee_id: EmployeeId,
    pub previous_manager_id: Option<EmployeeId>,
    pub new_manager_id: EmployeeId,
    pub moved_by: String,
    pub reason: Option<String>,
    pub moved_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeFilter {
    pub department_id: Option<String>,
    pub include_inactive: bool,
}

impl EmployeeFilter {
    pub fn matches(&self, employee: &Employee) -> bool {
        if !self.include_inactive && !employee.active {
            return false;
        }
        match &self.department_id {
            Some(department_id) => employee.department_id.as_ref() == Some(department_id),
            None => true,
        }
    }
}
