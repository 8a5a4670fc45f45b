use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::RuleEngine;
use crate::error::EngineError;
use crate::limiter::OverlayTriggerStore;
use crate::outcome::{SimulationMode, SimulationResult};

/// Knobs of [`RuleEngine::simulate_with`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimulationOptions {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub mode: SimulationMode,
}

impl SimulationOptions {
    pub fn dry_run(debug: bool) -> Self {
        Self {
            debug,
            mode: SimulationMode::DryRun,
        }
    }

    /// Writes admissions to the real trigger store.
    pub fn commit(debug: bool) -> Self {
        Self {
            debug,
            mode: SimulationMode::Commit,
        }
    }
}

impl RuleEngine {
    /// Runs the evaluation pass without touching stored trigger history.
    /// With `debug`, the result lists every rule, matching or not.
    pub async fn simulate(
        &self,
        user_id: &str,
        date: NaiveDate,
        tenant_id: &str,
        debug: bool,
    ) -> Result<SimulationResult, EngineError> {
        self.simulate_with(user_id, date, tenant_id, SimulationOptions::dry_run(debug))
            .await
    }

    pub async fn simulate_with(
        &self,
        user_id: &str,
        date: NaiveDate,
        tenant_id: &str,
        options: SimulationOptions,
    ) -> Result<SimulationResult, EngineError> {
        let report = match options.mode {
            SimulationMode::DryRun => {
                let overlay = Arc::new(OverlayTriggerStore::new(self.limiter().store()));
                let limiter = self.limiter().with_store(overlay);
                self.run_pass(user_id, date, tenant_id, &limiter, None).await?
            }
            SimulationMode::Commit => {
                warn!(user_id, tenant_id, %date, "simulation is committing trigger history");
                self.run_pass(user_id, date, tenant_id, self.limiter(), self.alert_sink())
                    .await?
            }
        };

        Ok(SimulationResult::from_report(report, options.mode, options.debug))
    }
}
