use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;

use triad_core::{CreativeConfig, TriadError, TriadResult};

use crate::strategy::{Candidate, GenerationStrategy};

/// The creative engine: fans a prompt out to every registered strategy,
/// deduplicates near-identical candidates, ranks by composite score, and
/// truncates to the requested count.
pub struct SolutionGenerator {
    strategies: Vec<Arc<dyn GenerationStrategy>>,
    config: CreativeConfig,
}

impl SolutionGenerator {
    /// Create a generator over the given strategies.
    pub fn new(strategies: Vec<Arc<dyn GenerationStrategy>>, config: CreativeConfig) -> Self {
        Self { strategies, config }
    }

    /// Number of registered strategies.
    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    /// Produce up to `n` ranked candidates.
    ///
    /// Strategies run concurrently; individual failures are tolerated as long
    /// as at least one strategy succeeds. When every strategy fails the call
    /// fails with [`TriadError::GenerationUnavailable`].
    pub async fn generate(&self, prompt: &str, n: usize) -> TriadResult<Vec<Candidate>> {
        if self.strategies.is_empty() {
            return Err(TriadError::GenerationUnavailable(
                "no generation strategies registered".into(),
            ));
        }
        let n = if n == 0 {
            self.config.default_candidates
        } else {
            n
        };

        let calls = self
            .strategies
            .iter()
            .map(|s| async move { (s.name().to_string(), s.generate(prompt, n).await) });
        let outcomes = join_all(calls).await;

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut failures: Vec<String> = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(batch) => candidates.extend(batch),
                Err(e) => {
                    tracing::warn!(strategy = %name, error = %e, "Generation strategy failed");
                    failures.push(format!("{name}: {e}"));
                }
            }
        }

        if candidates.is_empty() {
            return Err(TriadError::GenerationUnavailable(failures.join("; ")));
        }

        let deduped = self.dedup(candidates);
        Ok(self.rank(deduped, n))
    }

    /// Drop candidates whose content is near-identical to a better-scored one.
    fn dedup(&self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        // Process best-first so the survivor of a duplicate pair is the
        // higher-scoring candidate.
        self.sort_by_composite(&mut candidates);

        let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let duplicate = kept.iter().any(|existing| {
                token_similarity(&existing.content, &candidate.content)
                    >= self.config.dedup_threshold
            });
            if !duplicate {
                kept.push(candidate);
            }
        }
        kept
    }

    fn rank(&self, mut candidates: Vec<Candidate>, n: usize) -> Vec<Candidate> {
        self.sort_by_composite(&mut candidates);
        candidates.truncate(n);
        candidates
    }

    fn sort_by_composite(&self, candidates: &mut [Candidate]) {
        let (qw, nw) = (self.config.quality_weight, self.config.novelty_weight);
        candidates.sort_by(|a, b| {
            b.composite(qw, nw)
                .partial_cmp(&a.composite(qw, nw))
                .unwrap_or(std::cmp::Ordering::Equal)
                // Deterministic order for equal scores.
                .then_with(|| a.content.cmp(&b.content))
        });
    }
}

/// Jaccard similarity over lowercase word tokens.
fn token_similarity(a: &str, b: &str) -> f32 {
    let ta: HashSet<String> = tokens(a).collect();
    let tb: HashSet<String> = tokens(b).collect();
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    intersection as f32 / union as f32
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}
