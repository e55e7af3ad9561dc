//! Pure decision logic for wager outcomes.

pub mod outcome;

pub use outcome::{
    Decision, DecisionContext, HighBalanceSuppression, LossStreakRescue, NormalPlay,
    OnboardingGuarantee, OutcomeConfig, OutcomeEngine, Rule,
};
