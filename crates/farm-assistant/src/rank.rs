/// Relevance ranking of candidate documents against a query embedding.
///
/// Two distinct "no signal" cases exist and score differently:
/// - no vectors to compare (the query or the document embedding is empty):
///   [`FALLBACK_SIMILARITY`], so every such candidate ties and keeps corpus order;
/// - vectors present but one has zero magnitude: cosine is undefined, scored `0.0`.
use crate::model::{KnowledgeDocument, ScoredDocument};

/// Score given to a candidate when there is nothing to compare.
pub const FALLBACK_SIMILARITY: f32 = 0.5;

/// Number of documents kept as prompt context.
pub const TOP_K: usize = 3;

/// Cosine similarity of two vectors.
///
/// Returns `0.0` if either vector has zero magnitude or the result is not finite. Vectors
/// of different lengths are compared over their common prefix. Sums run in f64 so large
/// components do not overflow.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a[..n].iter().zip(&b[..n]) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cos = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !cos.is_finite() {
        return 0.0;
    }
    cos.clamp(-1.0, 1.0) as f32
}

pub fn score(query: &[f32], doc: &KnowledgeDocument) -> f32 {
    if query.is_empty() || doc.embedding.is_empty() {
        FALLBACK_SIMILARITY
    } else {
        cosine_similarity(query, &doc.embedding)
    }
}

/// Score, sort (stable, descending) and keep the best [`TOP_K`].
pub fn rank<'a>(candidates: &[&'a KnowledgeDocument], query: &[f32]) -> Vec<ScoredDocument<'a>> {
    let mut scored: Vec<ScoredDocument<'a>> = candidates
        .iter()
        .map(|&doc| ScoredDocument {
            doc,
            similarity: score(query, doc),
        })
        .collect();
    // sort_by is stable: equal scores keep candidate order
    scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    scored.truncate(TOP_K);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::tests::doc;
    use proptest::prelude::*;

    fn ids<'a>(ranked: &[ScoredDocument<'a>]) -> Vec<&'a str> {
        ranked.iter().map(|s| s.doc.id.as_str()).collect()
    }

    #[test]
    fn cosine_of_identical_orthogonal_and_opposite_vectors() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_magnitude_scores_zero_not_fallback() {
        let zero = doc("z", None, vec![0.0, 0.0]);
        assert_eq!(score(&[1.0, 0.0], &zero), 0.0);
        assert_eq!(score(&[0.0, 0.0], &doc("a", None, vec![1.0, 0.0])), 0.0);
    }

    #[test]
    fn huge_components_do_not_poison_the_ranking() {
        assert!((cosine_similarity(&[1e20, 0.0], &[3e20, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[f32::INFINITY, 1.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &[1.0, 1.0]), 0.0);

        let docs = [
            doc("close", None, vec![1.0, 0.1]),
            doc("overflow", None, vec![f32::MAX, f32::MAX]),
            doc("broken", None, vec![f32::INFINITY, 0.0]),
        ];
        let refs: Vec<&KnowledgeDocument> = docs.iter().collect();
        let ranked = rank(&refs, &[1.0, 0.0]);
        assert_eq!(ranked[0].doc.id, "close");
        assert!(ranked.iter().all(|s| s.similarity.is_finite()));
    }

    #[test]
    fn empty_vectors_take_the_fallback_score() {
        let with = doc("a", None, vec![1.0, 0.0]);
        let without = doc("b", None, vec![]);
        assert_eq!(score(&[], &with), FALLBACK_SIMILARITY);
        assert_eq!(score(&[1.0, 0.0], &without), FALLBACK_SIMILARITY);
    }

    #[test]
    fn ties_keep_input_order() {
        let a = doc("a", Some("NYC"), vec![1.0, 0.0]);
        let c = doc("c", None, vec![1.0, 0.0]);
        let ranked = rank(&[&a, &c], &[1.0, 0.0]);
        assert_eq!(ids(&ranked), ["a", "c"]);
        assert!((ranked[0].similarity - 1.0).abs() < 1e-6);
        assert!((ranked[1].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn sorts_descending_and_truncates_to_top_k() {
        let docs = [
            doc("far", None, vec![-1.0, 0.0]),
            doc("near", None, vec![1.0, 0.1]),
            doc("mid", None, vec![1.0, 1.0]),
            doc("side", None, vec![0.0, 1.0]),
            doc("exact", None, vec![1.0, 0.0]),
        ];
        let refs: Vec<&KnowledgeDocument> = docs.iter().collect();
        let ranked = rank(&refs, &[1.0, 0.0]);
        assert_eq!(ids(&ranked), ["exact", "near", "mid"]);
    }

    #[test]
    fn empty_query_degenerates_to_corpus_order() {
        let docs = [
            doc("d0", None, vec![0.0, 1.0]),
            doc("d1", None, vec![1.0, 0.0]),
            doc("d2", None, vec![]),
            doc("d3", None, vec![1.0, 1.0]),
        ];
        let refs: Vec<&KnowledgeDocument> = docs.iter().collect();
        let ranked = rank(&refs, &[]);
        assert_eq!(ids(&ranked), ["d0", "d1", "d2"]);
        assert!(ranked.iter().all(|s| s.similarity == FALLBACK_SIMILARITY));
    }

    #[test]
    fn fallback_documents_interleave_by_score() {
        let docs = [
            doc("opposite", None, vec![-1.0, 0.0]),
            doc("unembedded", None, vec![]),
            doc("exact", None, vec![1.0, 0.0]),
        ];
        let refs: Vec<&KnowledgeDocument> = docs.iter().collect();
        let ranked = rank(&refs, &[1.0, 0.0]);
        assert_eq!(ids(&ranked), ["exact", "unembedded", "opposite"]);
    }

    #[test]
    fn no_candidates_rank_to_nothing() {
        assert!(rank(&[], &[1.0]).is_empty());
    }

    fn arb_vec_pair() -> impl Strategy<Value = (Vec<f32>, Vec<f32>)> {
        (1usize..32).prop_flat_map(|dim| {
            (
                proptest::collection::vec(-100.0f32..100.0, dim),
                proptest::collection::vec(-100.0f32..100.0, dim),
            )
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn cosine_is_symmetric_and_bounded((a, b) in arb_vec_pair()) {
            let ab = cosine_similarity(&a, &b);
            let ba = cosine_similarity(&b, &a);
            prop_assert!((ab - ba).abs() < 1e-6);
            prop_assert!((-1.0..=1.0).contains(&ab));
        }

        #[test]
        fn ranking_is_bounded_and_sorted(
            embeddings in proptest::collection::vec(proptest::collection::vec(-1.0f32..1.0, 4), 0..12),
            query in proptest::collection::vec(-1.0f32..1.0, 4),
        ) {
            let docs: Vec<KnowledgeDocument> = embeddings
                .into_iter()
                .enumerate()
                .map(|(i, e)| doc(&format!("d{i}"), None, e))
                .collect();
            let refs: Vec<&KnowledgeDocument> = docs.iter().collect();
            let ranked = rank(&refs, &query);
            prop_assert_eq!(ranked.len(), docs.len().min(TOP_K));
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].similarity >= pair[1].similarity);
            }
        }
    }
}
