use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use triad_core::TriadResult;

/// One candidate solution produced by a generation strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Generated output text.
    pub content: String,
    /// Quality score in `[0, 1]`.
    pub quality: f32,
    /// Novelty score in `[0, 1]`.
    pub novelty: f32,
    /// Name of the strategy that produced this candidate.
    pub source: String,
}

impl Candidate {
    /// Create a candidate with clamped scores.
    pub fn new(
        content: impl Into<String>,
        quality: f32,
        novelty: f32,
        source: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            quality: quality.clamp(0.0, 1.0),
            novelty: novelty.clamp(0.0, 1.0),
            source: source.into(),
        }
    }

    /// Composite ranking score under the given weights.
    pub fn composite(&self, quality_weight: f32, novelty_weight: f32) -> f32 {
        self.quality * quality_weight + self.novelty * novelty_weight
    }
}

/// A pluggable candidate source.
///
/// The concrete generation logic (typically an inference call) is injected
/// behind this seam; the generator itself is execution-agnostic.
#[async_trait]
pub trait GenerationStrategy: Send + Sync {
    /// Strategy name used for provenance tagging.
    fn name(&self) -> &str;

    /// Produce up to `n` candidates for the prompt.
    async fn generate(&self, prompt: &str, n: usize) -> TriadResult<Vec<Candidate>>;
}

/// Deterministic template-based strategy for tests and demos.
///
/// Emits numbered variations of the prompt with declining quality and rising
/// novelty, so ranking and dedup behavior is predictable.
pub struct TemplateStrategy {
    name: String,
    templates: Vec<String>,
}

impl TemplateStrategy {
    /// A strategy with the default variation templates.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            templates: vec![
                "Direct answer: {prompt}".into(),
                "Alternative approach to {prompt}".into(),
                "Contrarian take on {prompt}".into(),
                "Minimal framing of {prompt}".into(),
            ],
        }
    }

    /// Override the variation templates (`{prompt}` is substituted).
    pub fn with_templates(mut self, templates: Vec<String>) -> Self {
        self.templates = templates;
        self
    }
}

#[async_trait]
impl GenerationStrategy for TemplateStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str, n: usize) -> TriadResult<Vec<Candidate>> {
        let count = n.min(self.templates.len()).max(1);
        let candidates = self
            .templates
            .iter()
            .take(count)
            .enumerate()
            .map(|(i, template)| {
                let content = template.replace("{prompt}", prompt);
                let quality = 0.9 - 0.1 * i as f32;
                let novelty = 0.2 + 0.2 * i as f32;
                Candidate::new(content, quality, novelty, self.name.clone())
            })
            .collect();
        Ok(candidates)
    }
}
