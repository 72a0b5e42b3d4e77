//! Similarity-key derivation and score fusion for recall search.
//!
//! The similarity key is opaque to callers: entities may arrive with a
//! caller-supplied key (e.g. from an external embedding service) or have one
//! derived locally via deterministic feature hashing. Search fuses cosine
//! similarity over the key with keyword overlap over content and tags.

/// Dimensionality of locally derived similarity keys.
pub const KEY_DIM: usize = 64;

/// Derive a deterministic similarity key from text by feature hashing.
///
/// Not a semantic embedding — a stable, dependency-free stand-in with the
/// property that shared tokens produce correlated keys.
pub fn derive_key(text: &str) -> Vec<f32> {
    let mut key = vec![0.0f32; KEY_DIM];
    for token in tokenize(text) {
        let h = fnv1a(token);
        let slot = (h as usize) % KEY_DIM;
        let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
        key[slot] += sign;
    }
    let norm: f32 = key.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut key {
            *x /= norm;
        }
    }
    key
}

/// Cosine similarity between two keys; 0.0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Fraction of query tokens present in the document tokens (0..=1).
pub fn keyword_overlap(query: &str, document: &str) -> f32 {
    let query_tokens: Vec<&str> = tokenize(query).collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let doc_tokens: std::collections::HashSet<&str> = tokenize(document).collect();
    let hits = query_tokens
        .iter()
        .filter(|t| doc_tokens.contains(**t))
        .count();
    hits as f32 / query_tokens.len() as f32
}

/// Fuse similarity and keyword scores with an equal blend.
pub fn fused_score(similarity: f32, keyword: f32) -> f32 {
    0.5 * similarity.max(0.0) + 0.5 * keyword
}

fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
}

fn fnv1a(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.to_lowercase().bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100_0000_01b3);
    }
    hash
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_deterministic() {
        let a = derive_key("quarterly cost report");
        let b = derive_key("quarterly cost report");
        assert_eq!(a, b);
        assert_eq!(a.len(), KEY_DIM);
    }

    #[test]
    fn test_derive_key_is_unit_norm() {
        let key = derive_key("some content here");
        let norm: f32 = key.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_tokens_correlate() {
        let a = derive_key("rust memory safety");
        let b = derive_key("rust memory model");
        let c = derive_key("chocolate cake recipe");
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        let v = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-4);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-4);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_keyword_overlap() {
        assert_eq!(keyword_overlap("rust safety", "rust is about safety"), 1.0);
        assert_eq!(keyword_overlap("rust cake", "rust is great"), 0.5);
        assert_eq!(keyword_overlap("", "anything"), 0.0);
        // Case-sensitive tokens match exactly; hashing lowercases, overlap does not.
        assert_eq!(keyword_overlap("rust", "rust rust rust"), 1.0);
    }

    #[test]
    fn test_fused_score_blend() {
        assert_eq!(fused_score(1.0, 1.0), 1.0);
        assert_eq!(fused_score(0.0, 1.0), 0.5);
        // Negative cosine is floored so keyword matches still count.
        assert_eq!(fused_score(-1.0, 1.0), 0.5);
    }
}
