use std::path::Path;
use std::sync::Arc;

use crate::core::config::{AppConfig, AppPaths, ConfigService};
use crate::core::security::ApiKey;
use crate::history::HistoryStore;
use crate::llm::{EmbeddingProvider, LanguageModelProvider, OpenAiProvider};
use crate::rag::{AnswerEngine, SqliteChunkStore};
use crate::settings::SettingsStore;

pub mod error;

use error::InitializationError;

/// Shared state behind every route.
///
/// The answer engine reads chunks through the same `SqliteChunkStore` the
/// status endpoint counts; history and settings share the `kbchat.db` file.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config_service: ConfigService,
    pub config: Arc<AppConfig>,
    pub api_key: ApiKey,
    pub history: HistoryStore,
    pub settings: SettingsStore,
    pub chunks: Arc<SqliteChunkStore>,
    pub engine: Arc<AnswerEngine>,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// 1. Load and validate configuration
    /// 2. Open the history, settings and knowledge databases
    /// 3. Import the configured knowledge file into an empty chunk store
    /// 4. Build the OpenAI-compatible provider and the answer engine
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config_service = ConfigService::new(paths.clone());
        let config = config_service
            .app_config()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let history = HistoryStore::open(paths.as_ref())
            .await
            .map_err(|e| InitializationError::History(e.into()))?;
        let settings = SettingsStore::open(paths.as_ref())
            .await
            .map_err(|e| InitializationError::Settings(e.into()))?;
        let chunks = Arc::new(
            SqliteChunkStore::new(paths.as_ref())
                .await
                .map_err(|e| InitializationError::Knowledge(e.into()))?,
        );

        if let Some(import_path) = config.knowledge.import_path.as_deref() {
            import_knowledge(&chunks, &paths.project_root.join(import_path))
                .await
                .map_err(InitializationError::Knowledge)?;
        }

        let provider = Arc::new(
            OpenAiProvider::new(&config.llm).map_err(|e| InitializationError::Llm(e.into()))?,
        );
        if config.llm.api_key.is_none() {
            tracing::warn!("No LLM API key configured; embedding calls will fail until one is set");
        }

        Ok(Arc::new(Self::with_components(
            paths,
            config_service,
            config,
            history,
            settings,
            chunks,
            provider.clone(),
            provider,
        )))
    }

    /// Assemble state from already-built parts.
    #[allow(clippy::too_many_arguments)]
    pub fn with_components(
        paths: Arc<AppPaths>,
        config_service: ConfigService,
        config: AppConfig,
        history: HistoryStore,
        settings: SettingsStore,
        chunks: Arc<SqliteChunkStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LanguageModelProvider>,
    ) -> Self {
        let engine = AnswerEngine::new(embeddings, llm, chunks.clone())
            .with_retrieval_config(&config.retrieval);
        let api_key = ApiKey::new(config.server.api_key.clone());

        Self {
            paths,
            config_service,
            config: Arc::new(config),
            api_key,
            history,
            settings,
            chunks,
            engine: Arc::new(engine),
        }
    }
}

/// Import `path` unless the store already holds chunks.
async fn import_knowledge(store: &SqliteChunkStore, path: &Path) -> anyhow::Result<()> {
    let existing = store.count().await?;
    if existing > 0 {
        tracing::info!(
            existing,
            "Knowledge store already populated; skipping import of {}",
            path.display()
        );
        return Ok(());
    }

    let imported = store.import_json(path).await?;
    tracing::info!(imported, "Imported knowledge chunks from {}", path.display());
    Ok(())
}
