use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AppResult;
use crate::models::commitment::FixedCommitment;
use crate::models::session::StudyPlan;
use crate::models::settings::UserSettings;
use crate::models::task::TaskRecord;

/// Everything the engine needs to resume planning. The layout must
/// round-trip exactly: a reloaded state has to replan byte-identically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlannerState {
    #[serde(default)]
    pub plans: Vec<StudyPlan>,
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
    #[serde(default)]
    pub commitments: Vec<FixedCommitment>,
    pub settings: UserSettings,
}

impl PlannerState {
    pub fn save(&self, path: &Path) -> AppResult<()> {
        let encoded = serde_json::to_string_pretty(self)?;
        fs::write(path, encoded)?;
        info!(
            target: "app::store",
            path = %path.display(),
            plans = self.plans.len(),
            tasks = self.tasks.len(),
            "planner state saved"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = fs::read_to_string(path)?;
        let state: PlannerState = serde_json::from_str(&raw)?;
        debug!(
            target: "app::store",
            path = %path.display(),
            plans = state.plans.len(),
            tasks = state.tasks.len(),
            "planner state loaded"
        );
        Ok(state)
    }
}
