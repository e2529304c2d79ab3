pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_TEMPERATURE: f32 = 0.0;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 2;

pub const DEFAULT_EMBEDDING_DIM: usize = 1536;
pub const DEFAULT_TOP_K: usize = 3;
/// Upper bound for `top_k` in config files and per-user settings.
pub const MAX_TOP_K: usize = 100;
pub const DEFAULT_MIN_RELEVANCE: f32 = 0.85;
pub const DEFAULT_VISUAL_TOP_K_FLOOR: usize = 6;
pub const DEFAULT_HISTORY_WINDOW: usize = 10;
pub const DEFAULT_MAX_MEDIA_CHUNKS: usize = 2;
pub const DEFAULT_SYSTEM_PROMPT: &str = "Eres un asistente experto";

pub const DEFAULT_HISTORY_LIMIT: i64 = 100;

/// Built-in visual query terms, Spanish and English. Matched as lower-case substrings.
pub const DEFAULT_VISUAL_KEYWORDS: &[&str] = &[
    "imagen",
    "imágen",
    "imágenes",
    "foto",
    "fotografía",
    "video",
    "vídeo",
    "diagrama",
    "esquema",
    "muéstrame",
    "muestrame",
    "mostrar",
    "mostrarme",
    "enséñame",
    "enseñame",
    "image",
    "picture",
    "photo",
    "diagram",
    "show me",
];
