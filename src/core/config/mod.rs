pub mod defaults;
pub mod paths;
pub mod service;
pub mod types;
pub mod validation;

pub use paths::AppPaths;
pub use service::ConfigService;
pub use types::{AppConfig, HistoryConfig, KnowledgeConfig, LlmConfig, RetrievalConfig, ServerConfig};
