//! Post-process NPS surveys: delayed dispatch of survey triggers and
//! detractor follow-up. Everything here is pure; the poller service in the
//! persistence crate applies the decisions with conditional updates.

pub mod alerts;
pub mod scheduling;

use serde::{Deserialize, Serialize};

pub use alerts::{
    apply_alert_status, classify_score, new_detractor_alert, should_alert, AlertTransitionError,
    NpsCategory, NpsSummary,
};
pub use scheduling::{
    plan_trigger, resolve_due_trigger, ScheduleRefusal, TriggerRequest, TriggerResolution,
};

pub const MAX_SCORE: u8 = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpsSettings {
    pub auto_trigger_enabled: bool,
    pub default_delay_minutes: u32,
    pub detractor_alert_enabled: bool,
    /// Scores at or below this value raise a detractor alert.
    pub detractor_threshold: u8,
    pub survey_expiration_days: u32,
}

impl Default for NpsSettings {
    fn default() -> Self {
        Self {
            auto_trigger_enabled: true,
            default_delay_minutes: 1440,
            detractor_alert_enabled: true,
            detractor_threshold: 6,
            survey_expiration_days: 7,
        }
    }
}
