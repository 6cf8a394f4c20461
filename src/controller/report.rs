use serde::Serialize;

use crate::config::OperationMode;
use crate::domain::BudgetState;
use crate::regulation::{Action, RegulationDecision};

use super::executor::ExecutionReport;

/// Everything observable about one controller tick
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub mode: OperationMode,
    pub period_index: i64,
    pub budget: BudgetState,
    pub decision: RegulationDecision,
    pub execution: ExecutionReport,
    pub last_action: String,
    pub last_action_reason: String,
}

impl TickReport {
    pub fn action(&self) -> Action {
        self.decision.action
    }

    /// Whether any command reached an actuator this tick
    pub fn acted(&self) -> bool {
        !self.execution.effects.is_empty()
    }
}
