use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLevel {
    /// 1-based position in the sign-off order.
    pub index: u8,
    pub key: String,
    pub label: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LevelConfigError {
    #[error("at least one approval level is required")]
    Empty,
    #[error("approval level keys must not be blank")]
    BlankKey,
    #[error("approval level `{0}` is configured more than once")]
    DuplicateKey(String),
    #[error("{0} approval levels configured, at most 255 are supported")]
    TooMany(usize),
}

/// Ordered, named approval levels. Every role owns exactly one level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLevels {
    levels: Vec<ApprovalLevel>,
}

impl ApprovalLevels {
    pub fn new<I, K, L>(entries: I) -> Result<Self, LevelConfigError>
    where
        I: IntoIterator<Item = (K, L)>,
        K: Into<String>,
        L: Into<String>,
    {
        let mut levels = Vec::new();
        let mut seen = HashSet::new();

        for (key, label) in entries {
            let key = key.into().trim().to_owned();
            if key.is_empty() {
                return Err(LevelConfigError::BlankKey);
            }
            if !seen.insert(key.clone()) {
                return Err(LevelConfigError::DuplicateKey(key));
            }
            let label = label.into();
            let label = if label.trim().is_empty() { key.clone() } else { label };
            levels.push((key, label));
        }

        if levels.is_empty() {
            return Err(LevelConfigError::Empty);
        }
        let count = levels.len();
        let levels = levels
            .into_iter()
            .enumerate()
            .map(|(position, (key, label))| {
                u8::try_from(position + 1)
                    .map(|index| ApprovalLevel { index, key, label })
                    .map_err(|_| LevelConfigError::TooMany(count))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { levels })
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn get(&self, index: u8) -> Option<&ApprovalLevel> {
        self.levels.iter().find(|level| level.index == index)
    }

    pub fn by_key(&self, key: &str) -> Option<&ApprovalLevel> {
        self.levels.iter().find(|level| level.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApprovalLevel> {
        self.levels.iter()
    }
}

impl Default for ApprovalLevels {
    fn default() -> Self {
        Self {
            levels: vec![
                ApprovalLevel {
                    index: 1,
                    key: "cs_specialist".to_owned(),
                    label: "C&S Specialist".to_owned(),
                },
                ApprovalLevel {
                    index: 2,
                    key: "direct_leader".to_owned(),
                    label: "Direct Leader".to_owned(),
                },
                ApprovalLevel {
                    index: 3,
                    key: "hr_manager".to_owned(),
                    label: "HR Manager".to_owned(),
                },
                ApprovalLevel {
                    index: 4,
                    key: "gai_director".to_owned(),
                    label: "GAI Director".to_owned(),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApprovalLevels, LevelConfigError};

    #[test]
    fn default_levels_are_four_distinct_roles_in_order() {
        let levels = ApprovalLevels::default();

        let keys: Vec<_> = levels.iter().map(|level| level.key.as_str()).collect();
        assert_eq!(keys, vec!["cs_specialist", "direct_leader", "hr_manager", "gai_director"]);
        assert_eq!(levels.get(3).map(|level| level.key.as_str()), Some("hr_manager"));
        assert_eq!(levels.by_key("gai_director").map(|level| level.index), Some(4));
        assert!(levels.get(0).is_none());
    }

    #[test]
    fn configured_levels_are_numbered_from_one() {
        let levels =
            ApprovalLevels::new([("reviewer", "Reviewer"), ("owner", "")]).expect("valid levels");

        assert_eq!(levels.len(), 2);
        assert_eq!(levels.get(1).map(|level| level.key.as_str()), Some("reviewer"));
        assert_eq!(levels.get(2).map(|level| level.label.as_str()), Some("owner"));
    }

    #[test]
    fn shared_or_blank_keys_are_rejected() {
        assert_eq!(
            ApprovalLevels::new([("hr", "HR"), ("hr", "HR again")]),
            Err(LevelConfigError::DuplicateKey("hr".to_owned()))
        );
        assert_eq!(ApprovalLevels::new([(" ", "Blank")]), Err(LevelConfigError::BlankKey));
        assert_eq!(
            ApprovalLevels::new(Vec::<(String, String)>::new()),
            Err(LevelConfigError::Empty)
        );
    }
}
