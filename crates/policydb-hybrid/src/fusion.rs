//! Merges lexical and vector candidate lists into one ranking.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::HashSet;

use policydb_core::types::{Candidate, FusionMethod, FusionParams, SourceKind};

/// One document after fusion, before metadata is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub id: String,
    pub score: f32,
    /// Lists that contributed, lexical first.
    pub sources: Vec<SourceKind>,
    pub vector_score: Option<f32>,
    pub ordinal: Option<u64>,
}

#[derive(Default)]
struct Acc {
    score: f32,
    lexical: bool,
    vector: bool,
    vector_score: Option<f32>,
    ordinal: Option<u64>,
}

/// Fuses both lists under `params` and keeps the best `top_k`.
///
/// Input lists are expected best first; a repeated id keeps its first entry.
/// Equal fused scores are ordered by vector similarity (absent lowest), then
/// corpus ordinal (absent last), then id.
pub fn fuse(lexical: &[Candidate], vector: &[Candidate], params: &FusionParams, top_k: usize) -> Vec<FusedCandidate> {
    let lexical = dedup_first(lexical);
    let vector = dedup_first(vector);

    let mut order: Vec<&str> = Vec::new();
    let mut acc: HashMap<&str, Acc> = HashMap::new();

    let (lexical_weight, vector_weight) = match params.method {
        FusionMethod::Rrf => (1.0, 1.0),
        FusionMethod::AlphaBlend => {
            let alpha = params.alpha.clamp(0.0, 1.0);
            (1.0 - alpha, alpha)
        }
    };

    for (list, weight, kind) in [(&lexical, lexical_weight, SourceKind::Text), (&vector, vector_weight, SourceKind::Vector)] {
        // A zero-weight list cannot move any score, so it adds no documents either.
        if params.method == FusionMethod::AlphaBlend && weight == 0.0 {
            continue;
        }
        let contributions = match params.method {
            FusionMethod::Rrf => rrf_contributions(list, params.rrf_k),
            FusionMethod::AlphaBlend => min_max(list),
        };
        for (c, part) in list.iter().zip(contributions) {
            let entry = acc.entry(c.id.as_str()).or_insert_with(|| {
                order.push(c.id.as_str());
                Acc::default()
            });
            entry.score += weight * part;
            entry.ordinal = entry.ordinal.or(c.ordinal);
            match kind {
                SourceKind::Text => entry.lexical = true,
                SourceKind::Vector => {
                    entry.vector = true;
                    entry.vector_score = Some(c.score);
                }
            }
        }
    }

    let mut fused: Vec<FusedCandidate> = order
        .into_iter()
        .filter_map(|id| {
            let a = acc.remove(id)?;
            let mut sources = Vec::with_capacity(2);
            if a.lexical {
                sources.push(SourceKind::Text);
            }
            if a.vector {
                sources.push(SourceKind::Vector);
            }
            Some(FusedCandidate { id: id.to_string(), score: a.score, sources, vector_score: a.vector_score, ordinal: a.ordinal })
        })
        .collect();
    fused.sort_by(compare_fused);
    fused.truncate(top_k);
    fused
}

/// Lexical candidates alone, in their own order and with their own scores.
/// Used when the vector side is unavailable.
pub fn lexical_only(lexical: &[Candidate], top_k: usize) -> Vec<FusedCandidate> {
    dedup_first(lexical)
        .into_iter()
        .take(top_k)
        .map(|c| FusedCandidate { id: c.id.clone(), score: c.score, sources: vec![SourceKind::Text], vector_score: None, ordinal: c.ordinal })
        .collect()
}

fn dedup_first(list: &[Candidate]) -> Vec<&Candidate> {
    let mut seen = HashSet::new();
    list.iter().filter(|c| c.score.is_finite() && seen.insert(c.id.as_str())).collect()
}

/// `1 / (k + rank)`, ranked by position in the deduplicated list, from 1.
fn rrf_contributions(list: &[&Candidate], k: f32) -> Vec<f32> {
    (1..=list.len()).map(|rank| 1.0 / (k + rank as f32)).collect()
}

/// Scales scores to [0,1]; a list without spread maps to 1.0.
fn min_max(list: &[&Candidate]) -> Vec<f32> {
    let min = list.iter().map(|c| c.score).fold(f32::INFINITY, f32::min);
    let max = list.iter().map(|c| c.score).fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    list.iter()
        .map(|c| if range > 0.0 && range.is_finite() { (c.score - min) / range } else { 1.0 })
        .collect()
}

fn compare_fused(a: &FusedCandidate, b: &FusedCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| match (a.vector_score, b.vector_score) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| match (a.ordinal, b.ordinal) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.id.cmp(&b.id))
}
