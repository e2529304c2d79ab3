use async_trait::async_trait;
use proptest::prelude::*;

use kbchat_backend::core::errors::ApiError;
use kbchat_backend::llm::EmbeddingProvider;
use kbchat_backend::rag::media::dedup_preserving_order;
use kbchat_backend::rag::retrieval::{rank_chunks, RetrievalParams};
use kbchat_backend::rag::{Chunk, VisualKeywords};

const DIM: usize = 4;

/// Only the distance function is exercised here.
struct CosineOnly;

#[async_trait]
impl EmbeddingProvider for CosineOnly {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ApiError> {
        Err(ApiError::Provider("not used".to_string()))
    }
}

fn vector(len: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-1.0f32..1.0, len)
}

fn chunk() -> impl Strategy<Value = Chunk> {
    (
        prop_oneof![Just(String::new()), "[a-z ]{1,12}"],
        prop_oneof![3 => vector(DIM), 1 => prop::collection::vec(-1.0f32..1.0, 0..8)],
    )
        .prop_map(|(text, embedding)| Chunk {
            id: None,
            text,
            images: vec![],
            videos: vec![],
            embedding,
        })
}

fn numbered(chunks: Vec<Chunk>) -> Vec<Chunk> {
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, mut c)| {
            c.id = Some(i.to_string());
            c
        })
        .collect()
}

fn ids(selected: &[kbchat_backend::rag::ScoredChunk]) -> Vec<String> {
    selected
        .iter()
        .map(|s| s.chunk.id.clone().unwrap_or_default())
        .collect()
}

proptest! {
    #[test]
    fn selection_is_bounded_relevant_and_sorted(
        chunks in prop::collection::vec(chunk(), 0..30),
        query in vector(DIM),
        top_k in 1usize..8,
        min_relevance in 0.0f32..2.0,
    ) {
        let params = RetrievalParams { top_k, min_relevance, embedding_dim: DIM };
        let selected = rank_chunks(&CosineOnly, &query, numbered(chunks), params);

        prop_assert!(selected.len() <= top_k);
        for scored in &selected {
            prop_assert!(scored.distance <= min_relevance);
            prop_assert!(scored.chunk.is_eligible(DIM));
        }
        for pair in selected.windows(2) {
            prop_assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn selection_matches_stable_sort_of_eligible_chunks(
        chunks in prop::collection::vec(chunk(), 0..30),
        query in vector(DIM),
        top_k in 1usize..8,
        min_relevance in 0.0f32..2.0,
    ) {
        let chunks = numbered(chunks);
        let provider = CosineOnly;

        let mut expected: Vec<(String, f32)> = chunks
            .iter()
            .filter(|c| c.is_eligible(DIM))
            .map(|c| (c.id.clone().unwrap_or_default(), provider.distance(&query, &c.embedding)))
            .filter(|(_, d)| d.is_finite() && *d <= min_relevance)
            .collect();
        expected.sort_by(|a, b| a.1.total_cmp(&b.1));
        expected.truncate(top_k);
        let expected: Vec<String> = expected.into_iter().map(|(id, _)| id).collect();

        let params = RetrievalParams { top_k, min_relevance, embedding_dim: DIM };
        let selected = rank_chunks(&provider, &query, chunks, params);
        prop_assert_eq!(ids(&selected), expected);
    }

    #[test]
    fn ranking_is_deterministic(
        chunks in prop::collection::vec(chunk(), 0..20),
        query in vector(DIM),
    ) {
        let chunks = numbered(chunks);
        let params = RetrievalParams { top_k: 3, min_relevance: 0.85, embedding_dim: DIM };

        let first = rank_chunks(&CosineOnly, &query, chunks.clone(), params);
        let second = rank_chunks(&CosineOnly, &query, chunks, params);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn dedup_keeps_first_occurrences_in_order(items in prop::collection::vec("[a-d]\\.jpg", 0..20)) {
        let deduped = dedup_preserving_order(items.clone());

        let mut expected: Vec<String> = Vec::new();
        for item in &items {
            if !expected.contains(item) {
                expected.push(item.clone());
            }
        }
        prop_assert_eq!(deduped, expected);
    }

    #[test]
    fn visual_detection_ignores_case(question in "[a-zA-Z áéíóúñÁÉÍÓÚÑ¿?]{0,40}") {
        let keywords = VisualKeywords::default();
        let lowered = keywords.is_visual(&question.to_lowercase());
        prop_assert_eq!(keywords.is_visual(&question), lowered);
        prop_assert_eq!(keywords.is_visual(&question.to_uppercase()), lowered);
    }

    #[test]
    fn any_keyword_in_any_case_is_visual(
        prefix in "[a-z ]{0,10}",
        suffix in "[a-z ]{0,10}",
        index in 0usize..64,
        upper in any::<bool>(),
    ) {
        let keywords = VisualKeywords::default();
        let term = &keywords.terms()[index % keywords.terms().len()];
        let term = if upper { term.to_uppercase() } else { term.clone() };
        let question = format!("{}{}{}", prefix, term, suffix);
        prop_assert!(keywords.is_visual(&question));
    }
}
