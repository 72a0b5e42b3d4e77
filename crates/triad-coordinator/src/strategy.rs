use std::time::Duration;

use triad_core::{CoordinatorConfig, EngineKind, MergePolicy, Strategy};

/// Deterministic engine order used for dispatch and merge tie-breaks.
pub const ENGINE_ORDER: [EngineKind; 3] =
    [EngineKind::Memory, EngineKind::Parallel, EngineKind::Creative];

/// A strategy resolved to its concrete participation profile.
///
/// Resolution happens exactly once, at intake; the plan is never re-evaluated
/// mid-task.
#[derive(Debug, Clone)]
pub struct StrategyPlan {
    /// Engines dispatched concurrently, in deterministic order.
    pub engines: Vec<EngineKind>,
    /// Engines whose absence from the result set fails the task.
    pub mandatory: Vec<EngineKind>,
    /// How collected results combine into the final output.
    pub merge: MergePolicy,
    /// Per-engine dispatch timeout.
    pub engine_timeout: Duration,
}

impl StrategyPlan {
    /// Resolve a named strategy against the task deadline.
    pub fn resolve(strategy: Strategy, deadline_ms: u64, config: &CoordinatorConfig) -> Self {
        let timeout_ms = ((deadline_ms as f64 * f64::from(config.engine_timeout_fraction)) as u64)
            .min(config.engine_timeout_cap_ms)
            .max(1);
        let engine_timeout = Duration::from_millis(timeout_ms);

        match strategy {
            // All three engines; only the parallel engine is load-bearing, so
            // a timed-out memory or creative dispatch degrades rather than
            // fails the task.
            Strategy::Collaborative => Self {
                engines: ENGINE_ORDER.to_vec(),
                mandatory: vec![EngineKind::Parallel],
                merge: MergePolicy::ConcatProvenance,
                engine_timeout,
            },
            Strategy::FastPath => Self {
                engines: vec![EngineKind::Parallel],
                mandatory: vec![EngineKind::Parallel],
                merge: MergePolicy::BestConfidence,
                engine_timeout,
            },
            Strategy::MemoryOnly => Self {
                engines: vec![EngineKind::Memory],
                mandatory: vec![EngineKind::Memory],
                merge: MergePolicy::BestConfidence,
                engine_timeout,
            },
            Strategy::CreativeOnly => Self {
                engines: vec![EngineKind::Creative],
                mandatory: vec![EngineKind::Creative],
                merge: MergePolicy::BestConfidence,
                engine_timeout,
            },
        }
    }

    /// Whether the given engine must produce a usable result.
    pub fn is_mandatory(&self, engine: EngineKind) -> bool {
        self.mandatory.contains(&engine)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborative_plan() {
        let plan =
            StrategyPlan::resolve(Strategy::Collaborative, 500, &CoordinatorConfig::default());
        assert_eq!(plan.engines, ENGINE_ORDER.to_vec());
        assert_eq!(plan.mandatory, vec![EngineKind::Parallel]);
        assert_eq!(plan.merge, MergePolicy::ConcatProvenance);
        assert!(plan.is_mandatory(EngineKind::Parallel));
        assert!(!plan.is_mandatory(EngineKind::Creative));
    }

    #[test]
    fn test_single_engine_plans() {
        let config = CoordinatorConfig::default();
        let fast = StrategyPlan::resolve(Strategy::FastPath, 500, &config);
        assert_eq!(fast.engines, vec![EngineKind::Parallel]);
        assert_eq!(fast.merge, MergePolicy::BestConfidence);

        let memory = StrategyPlan::resolve(Strategy::MemoryOnly, 500, &config);
        assert_eq!(memory.engines, vec![EngineKind::Memory]);
        assert!(memory.is_mandatory(EngineKind::Memory));

        let creative = StrategyPlan::resolve(Strategy::CreativeOnly, 500, &config);
        assert_eq!(creative.engines, vec![EngineKind::Creative]);
    }

    #[test]
    fn test_engine_timeout_fraction_and_cap() {
        let config = CoordinatorConfig {
            engine_timeout_fraction: 0.9,
            engine_timeout_cap_ms: 1_000,
            ..CoordinatorConfig::default()
        };
        let plan = StrategyPlan::resolve(Strategy::FastPath, 500, &config);
        assert_eq!(plan.engine_timeout, Duration::from_millis(450));

        // The cap bounds large deadlines.
        let plan = StrategyPlan::resolve(Strategy::FastPath, 60_000, &config);
        assert_eq!(plan.engine_timeout, Duration::from_millis(1_000));
    }
}
