//! Textual similarity between two outputs.
//!
//! Three tiers, tried in order:
//! 1. exact equality scores 1.0
//! 2. an injected semantic backend, if any
//! 3. a deterministic blend of edit-distance ratio and word-set overlap
//!
//! Tier 3 needs nothing external and never fails, so a missing or failing
//! backend only lowers accuracy. Edit distance is quadratic, so texts whose
//! length product exceeds `SEQUENCE_CELL_LIMIT` are scored by word overlap
//! alone.

use async_trait::async_trait;
use rewind_tool::ExecutionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Largest `len(a) * len(b)` in chars scored by edit distance
pub const SEQUENCE_CELL_LIMIT: usize = 4_000_000;

/// Which tier produced a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMethod {
    /// Strings were identical
    Exact,
    /// Semantic backend
    Semantic,
    /// Edit-distance and word-overlap fallback
    Sequence,
}

/// Score in `[0, 1]` plus the method behind it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityScore {
    /// Similarity, 1.0 means identical
    pub score: f64,
    /// Producing tier
    pub method: SimilarityMethod,
}

/// Optional higher-accuracy scorer
#[async_trait]
pub trait SemanticBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Score two texts in `[0, 1]`
    async fn similarity(&self, a: &str, b: &str) -> Result<f64, ExecutionError>;
}

/// Text to vector function
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ExecutionError>;
}

/// Semantic backend from any embedder, scored by cosine similarity.
///
/// Negative cosines clamp to 0.
#[derive(Debug, Clone)]
pub struct EmbeddingSimilarity<E> {
    name: String,
    embedder: E,
}

impl<E: Embedder> EmbeddingSimilarity<E> {
    /// Wrap an embedder
    pub fn new(name: impl Into<String>, embedder: E) -> Self {
        Self {
            name: name.into(),
            embedder,
        }
    }
}

#[async_trait]
impl<E: Embedder> SemanticBackend for EmbeddingSimilarity<E> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn similarity(&self, a: &str, b: &str) -> Result<f64, ExecutionError> {
        let left = self.embedder.embed(a).await?;
        let right = self.embedder.embed(b).await?;
        cosine(&left, &right)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> Result<f64, ExecutionError> {
    if a.len() != b.len() {
        return Err(ExecutionError::permanent(format!(
            "embedding dimensions differ: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(ExecutionError::permanent("zero-length embedding"));
    }
    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0))
}

/// Scores textual similarity with graceful degradation
#[derive(Clone)]
pub struct SimilarityEngine {
    backend: Option<Arc<dyn SemanticBackend>>,
    sequence_weight: f64,
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimilarityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityEngine")
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("sequence_weight", &self.sequence_weight)
            .finish()
    }
}

impl SimilarityEngine {
    /// Engine with only the built-in tiers
    #[must_use]
    pub fn new() -> Self {
        Self {
            backend: None,
            sequence_weight: 0.5,
        }
    }

    /// Register a semantic backend
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn SemanticBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Weight of the edit-distance ratio in the fallback blend, clamped to `[0, 1]`
    #[must_use]
    pub fn with_sequence_weight(mut self, weight: f64) -> Self {
        self.sequence_weight = if weight.is_finite() {
            weight.clamp(0.0, 1.0)
        } else {
            0.5
        };
        self
    }

    /// Whether a semantic backend is registered
    #[must_use]
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Score two texts
    pub async fn compare(&self, a: &str, b: &str) -> SimilarityScore {
        if a == b {
            return SimilarityScore {
                score: 1.0,
                method: SimilarityMethod::Exact,
            };
        }
        if let Some(backend) = &self.backend {
            match backend.similarity(a, b).await {
                Ok(score) if score.is_finite() => {
                    return SimilarityScore {
                        score: score.clamp(0.0, 1.0),
                        method: SimilarityMethod::Semantic,
                    };
                }
                Ok(score) => {
                    warn!(backend = backend.name(), score, "semantic backend returned non-finite score, falling back");
                }
                Err(error) => {
                    warn!(backend = backend.name(), error = %error, "semantic backend failed, falling back");
                }
            }
        }
        SimilarityScore {
            score: self.fallback(a, b),
            method: SimilarityMethod::Sequence,
        }
    }

    /// Tier-3 score alone, deterministic
    #[must_use]
    pub fn fallback(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        let (len_a, len_b) = (a.chars().count(), b.chars().count());
        if len_a.saturating_mul(len_b) > SEQUENCE_CELL_LIMIT {
            debug!(len_a, len_b, "texts too long for edit distance, using word overlap");
            return word_jaccard(a, b).unwrap_or_else(|| length_ratio(len_a, len_b));
        }
        let sequence = sequence_ratio(a, b);
        match word_jaccard(a, b) {
            Some(overlap) => {
                self.sequence_weight * sequence + (1.0 - self.sequence_weight) * overlap
            }
            None => sequence,
        }
    }
}

fn length_ratio(a: usize, b: usize) -> f64 {
    let longest = a.max(b);
    if longest == 0 {
        1.0
    } else {
        a.min(b) as f64 / longest as f64
    }
}

/// `1 - levenshtein / max_len` over chars
#[must_use]
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let cost = usize::from(ca != cb);
            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = above;
        }
    }
    row[b.len()]
}

/// Jaccard overlap of lowercase alphanumeric words, `None` if both are empty
#[must_use]
pub fn word_jaccard(a: &str, b: &str) -> Option<f64> {
    let a = words(a);
    let b = words(b);
    if a.is_empty() && b.is_empty() {
        return None;
    }
    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    Some(intersection as f64 / union as f64)
}

fn words(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}
