use std::collections::HashMap;

use triad_core::{EngineKind, EngineResult, MergePolicy};

use crate::strategy::ENGINE_ORDER;

/// Combine collected engine results into the final task output.
///
/// Deterministic: results are visited in fixed engine order, so the same
/// result set always merges to the same output. Missing markers are skipped.
/// Returns `None` when no present result exists.
pub fn merge_results(
    policy: MergePolicy,
    results: &HashMap<EngineKind, EngineResult>,
) -> Option<String> {
    let present: Vec<&EngineResult> = ENGINE_ORDER
        .iter()
        .filter_map(|kind| results.get(kind))
        .filter(|r| r.is_present())
        .collect();

    if present.is_empty() {
        return None;
    }

    match policy {
        MergePolicy::ConcatProvenance => Some(
            present
                .iter()
                .map(|r| format!("[{}] {}", r.engine, r.payload))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        // Strictly-greater comparison keeps the earlier engine on ties.
        MergePolicy::BestConfidence => {
            let mut best = present[0];
            for r in &present[1..] {
                if r.confidence > best.confidence {
                    best = r;
                }
            }
            Some(best.payload.clone())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn results(entries: Vec<EngineResult>) -> HashMap<EngineKind, EngineResult> {
        entries.into_iter().map(|r| (r.engine, r)).collect()
    }

    #[test]
    fn test_concat_follows_engine_order() {
        let id = Uuid::new_v4();
        // Insertion order deliberately scrambled.
        let set = results(vec![
            EngineResult::ok(EngineKind::Creative, id, "ideas", 0.5, 30),
            EngineResult::ok(EngineKind::Memory, id, "recall", 0.8, 10),
            EngineResult::ok(EngineKind::Parallel, id, "computed", 0.9, 20),
        ]);
        let merged = merge_results(MergePolicy::ConcatProvenance, &set).unwrap();
        assert_eq!(merged, "[memory] recall\n[parallel] computed\n[creative] ideas");
    }

    #[test]
    fn test_concat_skips_missing() {
        let id = Uuid::new_v4();
        let set = results(vec![
            EngineResult::ok(EngineKind::Parallel, id, "computed", 0.9, 20),
            EngineResult::missing(EngineKind::Creative, id, 450),
        ]);
        let merged = merge_results(MergePolicy::ConcatProvenance, &set).unwrap();
        assert_eq!(merged, "[parallel] computed");
    }

    #[test]
    fn test_best_confidence_picks_highest() {
        let id = Uuid::new_v4();
        let set = results(vec![
            EngineResult::ok(EngineKind::Memory, id, "recall", 0.6, 10),
            EngineResult::ok(EngineKind::Parallel, id, "computed", 0.95, 20),
        ]);
        let merged = merge_results(MergePolicy::BestConfidence, &set).unwrap();
        assert_eq!(merged, "computed");
    }

    #[test]
    fn test_best_confidence_tie_breaks_by_engine_order() {
        let id = Uuid::new_v4();
        let set = results(vec![
            EngineResult::ok(EngineKind::Creative, id, "creative", 0.9, 30),
            EngineResult::ok(EngineKind::Memory, id, "memory", 0.9, 10),
        ]);
        let merged = merge_results(MergePolicy::BestConfidence, &set).unwrap();
        assert_eq!(merged, "memory");
    }

    #[test]
    fn test_all_missing_merges_to_none() {
        let id = Uuid::new_v4();
        let set = results(vec![
            EngineResult::missing(EngineKind::Memory, id, 100),
            EngineResult::missing(EngineKind::Parallel, id, 100),
        ]);
        assert!(merge_results(MergePolicy::ConcatProvenance, &set).is_none());
        assert!(merge_results(MergePolicy::BestConfidence, &set).is_none());
    }
}
