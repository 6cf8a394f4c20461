//! Pure regulation core: capacity, target, planning and the decision engine.

pub mod capacity;
pub mod engine;
pub mod planner;
pub mod target;

pub use capacity::{estimate_down_capacity, reduction_potential_kw};
pub use engine::{
    classify_for_reduction, decide, select_reductions, Action, CooldownWait, ReductionCandidate,
    ReductionSelection, RegulationDecision, RegulationInput, DEFAULT_RESTORE_MARGIN_KWH,
    END_OF_PERIOD_SAFETY_MINUTES, REDUCTION_EPSILON_KW,
};
pub use planner::{
    plan_reduction, reduced_current, restored_current, switch_restore_target, ReductionAction,
    ReductionPlan, RestoreCandidate,
};
pub use target::{EffectiveTarget, TargetStrategy};
