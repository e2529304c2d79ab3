//! Answer engine tests over in-memory fakes.
//!
//! - scenarios: empty store, exact match, media branches, history window
//! - parameters: visual top-k floor, per-call config, overrides forwarding
//! - failures: embedding / generation / chunk source errors abort the call

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use super::*;
use crate::core::errors::ApiError;
use crate::llm::{EmbeddingProvider, GenerationOverrides, LanguageModelProvider};

const DIM: usize = 1536;

struct FakeEmbeddings {
    vector: Vec<f32>,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeEmbeddings {
    fn returning(vector: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            vector,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            vector: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ApiError::Provider("embedding quota exceeded".to_string()));
        }
        Ok(self.vector.clone())
    }
}

#[derive(Default)]
struct FakeLlm {
    fail: bool,
    prompts: Mutex<Vec<String>>,
    overrides: Mutex<Vec<GenerationOverrides>>,
}

impl FakeLlm {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModelProvider for FakeLlm {
    async fn generate(
        &self,
        prompt: &str,
        overrides: &GenerationOverrides,
    ) -> Result<String, ApiError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.overrides.lock().unwrap().push(overrides.clone());
        if self.fail {
            return Err(ApiError::Provider("model unavailable".to_string()));
        }
        Ok("Respuesta de prueba".to_string())
    }
}

struct BrokenSource;

impl ChunkSource for BrokenSource {
    fn all(&self) -> ChunkStream<'_> {
        stream::iter(vec![
            Ok(chunk("antes del fallo", &[], &[])),
            Err(ApiError::Internal("cursor lost".to_string())),
        ])
        .boxed()
    }
}

fn chunk(text: &str, images: &[&str], videos: &[&str]) -> Chunk {
    Chunk {
        id: None,
        text: text.to_string(),
        images: images.iter().map(|s| s.to_string()).collect(),
        videos: videos.iter().map(|s| s.to_string()).collect(),
        embedding: vec![0.1; DIM],
    }
}

fn engine(
    embeddings: Arc<FakeEmbeddings>,
    llm: Arc<FakeLlm>,
    chunks: Vec<Chunk>,
) -> AnswerEngine {
    AnswerEngine::new(embeddings, llm, Arc::new(MemoryChunkSource::new(chunks)))
}

#[tokio::test]
async fn empty_store_still_calls_the_model_once() {
    let embeddings = FakeEmbeddings::returning(vec![0.1; DIM]);
    let llm = FakeLlm::new();
    let engine = engine(embeddings.clone(), llm.clone(), vec![]);

    let answer = engine.answer("hola", None, None).await.unwrap();

    assert_eq!(answer.text, "Respuesta de prueba");
    assert!(answer.images.is_empty());
    assert!(answer.videos.is_empty());
    assert_eq!(llm.calls(), 1);
    assert_eq!(embeddings.calls.load(Ordering::SeqCst), 1);
    assert!(llm
        .last_prompt()
        .contains("Contexto de conocimiento:\n\n\nPregunta actual del usuario: hola"));
}

#[tokio::test]
async fn identical_embedding_selects_the_chunk() {
    let llm = FakeLlm::new();
    let engine = engine(
        FakeEmbeddings::returning(vec![0.1; DIM]),
        llm.clone(),
        vec![chunk("Paris is the capital of France", &[], &[])],
    );

    let answer = engine.answer("capital of France", None, None).await.unwrap();

    assert!(llm.last_prompt().contains("Paris is the capital of France"));
    assert!(answer.images.is_empty());
    assert!(answer.videos.is_empty());
    assert_eq!(answer.media_branch, MediaBranch::NoMedia);
}

#[tokio::test]
async fn non_visual_question_takes_leading_media_chunk() {
    let engine = engine(
        FakeEmbeddings::returning(vec![0.1; DIM]),
        FakeLlm::new(),
        vec![chunk("Información turística", &["a.jpg", "b.jpg"], &["v.mp4"])],
    );

    let answer = engine
        .answer("¿Cuáles son los mejores lugares?", None, None)
        .await
        .unwrap();

    assert_eq!(answer.images, vec!["a.jpg", "b.jpg"]);
    assert_eq!(answer.videos, vec!["v.mp4"]);
    assert_eq!(answer.media_branch, MediaBranch::LeadingMediaChunks);
}

#[tokio::test]
async fn visual_question_takes_union_branch() {
    let engine = engine(
        FakeEmbeddings::returning(vec![0.1; DIM]),
        FakeLlm::new(),
        vec![chunk("Descripción", &["a.jpg", "b.jpg"], &["v.mp4"])],
    );

    let answer = engine.answer("muéstrame imágenes", None, None).await.unwrap();

    assert_eq!(answer.images, vec!["a.jpg", "b.jpg"]);
    assert_eq!(answer.videos, vec!["v.mp4"]);
    assert_eq!(answer.media_branch, MediaBranch::VisualUnion);
}

#[tokio::test]
async fn only_the_last_ten_turns_reach_the_prompt() {
    let llm = FakeLlm::new();
    let engine = engine(
        FakeEmbeddings::returning(vec![0.1; DIM]),
        llm.clone(),
        vec![],
    );
    let history: Vec<ConversationTurn> = (0..12)
        .map(|i| {
            if i % 2 == 0 {
                ConversationTurn::user(format!("mensaje-{:02}", i))
            } else {
                ConversationTurn::assistant(format!("mensaje-{:02}", i))
            }
        })
        .collect();

    engine
        .answer("¿y entonces?", Some(history.as_slice()), None)
        .await
        .unwrap();

    let prompt = llm.last_prompt();
    assert!(!prompt.contains("mensaje-00"));
    assert!(!prompt.contains("mensaje-01"));
    assert!(prompt.contains("Usuario: mensaje-02"));
    assert!(prompt.contains("Asistente: mensaje-11"));
    assert!(prompt.find("mensaje-02") < prompt.find("mensaje-11"));
}

#[tokio::test]
async fn empty_history_omits_the_conversation_block() {
    let llm = FakeLlm::new();
    let engine = engine(FakeEmbeddings::returning(vec![0.1; DIM]), llm.clone(), vec![]);

    engine.answer("hola", Some(&[][..]), None).await.unwrap();

    assert!(!llm.last_prompt().contains("Contexto de la conversación"));
}

#[tokio::test]
async fn visual_questions_raise_top_k_to_the_floor() {
    let chunks: Vec<Chunk> = (0..8)
        .map(|i| chunk(&format!("fragmento-{}", i), &[], &[]))
        .collect();

    let llm = FakeLlm::new();
    let engine = engine(
        FakeEmbeddings::returning(vec![0.1; DIM]),
        llm.clone(),
        chunks,
    );

    engine.answer("¿qué lugares hay?", None, None).await.unwrap();
    let plain = llm.last_prompt();
    assert_eq!(plain.matches("fragmento-").count(), 3);

    engine.answer("tienes fotos?", None, None).await.unwrap();
    let visual = llm.last_prompt();
    assert_eq!(visual.matches("fragmento-").count(), 6);
    assert!(visual.contains("fragmento-5"));
    assert!(!visual.contains("fragmento-6"));
}

#[tokio::test]
async fn per_call_config_replaces_defaults_and_forwards_overrides() {
    let llm = FakeLlm::new();
    let engine = engine(
        FakeEmbeddings::returning(vec![0.1; DIM]),
        llm.clone(),
        vec![chunk("uno", &[], &[]), chunk("dos", &[], &[])],
    );
    let config = EngineConfig {
        top_k: 1,
        system_prompt: "Eres un guía de viajes".to_string(),
        overrides: GenerationOverrides {
            model: Some("gpt-4o".to_string()),
            temperature: Some(0.7),
            ..Default::default()
        },
        ..Default::default()
    };

    engine.answer("hola", None, Some(&config)).await.unwrap();

    let prompt = llm.last_prompt();
    assert!(prompt.starts_with("Eres un guía de viajes\n\n"));
    assert!(prompt.contains("uno"));
    assert!(!prompt.contains("dos"));
    let forwarded = llm.overrides.lock().unwrap().last().cloned().unwrap();
    assert_eq!(forwarded, config.overrides);
}

#[tokio::test]
async fn chunks_beyond_min_relevance_are_not_used() {
    let llm = FakeLlm::new();
    let mut opposite = chunk("opuesto", &["x.jpg"], &[]);
    opposite.embedding = vec![-0.1; DIM];
    let engine = engine(
        FakeEmbeddings::returning(vec![0.1; DIM]),
        llm.clone(),
        vec![opposite],
    );

    let answer = engine.answer("muéstrame fotos", None, None).await.unwrap();

    assert!(!llm.last_prompt().contains("opuesto"));
    assert!(answer.images.is_empty());
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn embedding_failure_aborts_before_generation() {
    let llm = FakeLlm::new();
    let engine = engine(
        FakeEmbeddings::failing(),
        llm.clone(),
        vec![chunk("texto", &[], &[])],
    );

    let err = engine.answer("hola", None, None).await.unwrap_err();

    assert!(matches!(err, ApiError::Provider(_)));
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn generation_failure_propagates() {
    let engine = engine(
        FakeEmbeddings::returning(vec![0.1; DIM]),
        FakeLlm::failing(),
        vec![chunk("texto", &["a.jpg"], &[])],
    );

    let err = engine.answer("hola", None, None).await.unwrap_err();
    assert!(err.to_string().contains("model unavailable"));
}

#[tokio::test]
async fn chunk_source_error_aborts_the_call() {
    let llm = FakeLlm::new();
    let engine = AnswerEngine::new(
        FakeEmbeddings::returning(vec![0.1; DIM]),
        llm.clone(),
        Arc::new(BrokenSource),
    );

    let err = engine.answer("hola", None, None).await.unwrap_err();

    assert!(matches!(err, ApiError::Internal(_)));
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn retrieval_config_sets_engine_defaults() {
    let llm = FakeLlm::new();
    let config = crate::core::config::RetrievalConfig {
        embedding_dim: 2,
        top_k: 1,
        system_prompt: "Sistema".to_string(),
        visual_keywords: vec!["galería".to_string()],
        ..Default::default()
    };
    let mut small = chunk("pequeño", &["g.jpg"], &[]);
    small.embedding = vec![1.0, 0.0];
    let mut other = chunk("otro", &["h.jpg"], &[]);
    other.embedding = vec![1.0, 0.0];
    let engine = engine(FakeEmbeddings::returning(vec![1.0, 0.0]), llm.clone(), vec![small, other])
        .with_retrieval_config(&config);

    let answer = engine.answer("abre la galería", None, None).await.unwrap();

    assert!(llm.last_prompt().starts_with("Sistema\n\n"));
    assert_eq!(answer.media_branch, MediaBranch::VisualUnion);
    assert_eq!(answer.images, vec!["g.jpg", "h.jpg"]);
}

#[tokio::test]
async fn unbounded_top_k_is_answered() {
    let llm = FakeLlm::new();
    let engine = engine(
        FakeEmbeddings::returning(vec![0.1; DIM]),
        llm.clone(),
        vec![chunk("uno", &["a.jpg"], &[]), chunk("dos", &[], &[])],
    );
    let config = EngineConfig {
        top_k: usize::MAX,
        ..Default::default()
    };

    let answer = engine.answer("hola", None, Some(&config)).await;

    assert!(answer.is_ok());
    assert!(llm.last_prompt().contains("dos"));
    assert_eq!(llm.calls(), 1);
}
