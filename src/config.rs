//! Configuration types and constants for semcode
//!
//! Defines embedding models, engine configuration, logging options, and the
//! file filtering rules used during scans.

use crate::error::{Result, SemcodeError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Supported embedding models (all run locally via ONNX)
///
/// These models are downloaded on first use and cached locally.
/// No API keys or network access required after initial download.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum EmbeddingModel {
    /// Fast, small model (384 dims, ~30MB)
    AllMiniLmL6V2,
    /// Higher quality (384 dims, ~90MB)
    BgeSmallEnV15,
    /// Best quality for code (768 dims, ~90MB)
    #[default]
    NomicEmbedTextV15,
    /// Multilingual support (384 dims, ~470MB)
    MultilingualE5Small,
}

impl EmbeddingModel {
    /// Get the HuggingFace model identifier
    pub fn model_name(&self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "sentence-transformers/all-MiniLM-L6-v2",
            Self::BgeSmallEnV15 => "BAAI/bge-small-en-v1.5",
            Self::NomicEmbedTextV15 => "nomic-ai/nomic-embed-text-v1.5",
            Self::MultilingualE5Small => "intfloat/multilingual-e5-small",
        }
    }

    /// Get the embedding vector dimension
    pub fn dimension(&self) -> usize {
        match self {
            Self::AllMiniLmL6V2 => 384,
            Self::BgeSmallEnV15 => 384,
            Self::NomicEmbedTextV15 => 768,
            Self::MultilingualE5Small => 384,
        }
    }
}

impl std::str::FromStr for EmbeddingModel {
    type Err = SemcodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "minilm" | "all-minilm-l6-v2" => Ok(Self::AllMiniLmL6V2),
            "bge" | "bge-small" | "bge-small-en-v1.5" => Ok(Self::BgeSmallEnV15),
            "nomic" | "nomic-embed" | "nomic-embed-text-v1.5" | "default" => {
                Ok(Self::NomicEmbedTextV15)
            }
            "multilingual" | "e5" | "multilingual-e5-small" => Ok(Self::MultilingualE5Small),
            _ => Err(SemcodeError::Config(format!(
                "Unknown model: {}. Valid options: minilm, bge, nomic, multilingual",
                s
            ))),
        }
    }
}

/// Log verbosity, mirrored into the tracing filter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = SemcodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(SemcodeError::Config(format!("Unknown log level: {s}"))),
        }
    }
}

/// Log output format. Structured mode emits one JSON object per line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = SemcodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(SemcodeError::Config(format!("Unknown log format: {s}"))),
        }
    }
}

/// Configuration for semcode indexing and search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory being indexed; all query paths must lie within it
    pub root: PathBuf,
    /// Directory holding the persisted index
    pub index_dir: PathBuf,
    /// Where embedder/reranker weights are cached
    pub model_cache_dir: PathBuf,
    /// Embedding model to use
    pub model: EmbeddingModel,
    /// Target chunk size in characters before splitting
    pub chunk_target_size: usize,
    /// Maximum file size to index (bytes)
    pub max_file_size: u64,
    /// Number of parallel ingest workers
    pub workers: usize,
    /// Debounce window for file-system events (milliseconds)
    pub debounce_ms: u64,
    /// Log verbosity
    pub log_level: LogLevel,
    /// Log output format
    pub log_format: LogFormat,
    /// Path globs skipped during scans, in addition to the index directory
    pub ignore_patterns: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let root = PathBuf::from(".");
        Self {
            index_dir: root.join(INDEX_DIR),
            root,
            model_cache_dir: default_model_cache_dir(),
            model: EmbeddingModel::default(),
            chunk_target_size: 1500,
            max_file_size: 10 * 1024 * 1024, // 10 MB
            workers: num_cpus::get().min(8),
            debounce_ms: 1000,
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
            ignore_patterns: DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// Index location beneath the root.
pub const INDEX_DIR: &str = ".semantic-code/index";

fn default_model_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("semcode")
}

impl Config {
    /// Create a new config for the given root path
    pub fn new(root: PathBuf) -> Self {
        let index_dir = root.join(INDEX_DIR);
        Self {
            root,
            index_dir,
            ..Default::default()
        }
    }

    /// Set the embedding model
    pub fn with_model(mut self, model: EmbeddingModel) -> Self {
        self.model = model;
        self
    }

    /// Set the log level
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Set the log format
    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Replace the ignore pattern set
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Get path to the vector index file
    pub fn index_path(&self) -> PathBuf {
        self.index_dir.join("vectors.usearch")
    }

    /// Get path to the record metadata file
    pub fn records_path(&self) -> PathBuf {
        self.index_dir.join("records.bin")
    }

    /// Get path to the config file
    pub fn config_path(&self) -> PathBuf {
        self.index_dir.join("config.json")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.index_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(self.config_path(), json)?;
        Ok(())
    }

    /// Load configuration from disk
    pub fn load(index_dir: &std::path::Path) -> Result<Self> {
        let config_path = index_dir.join("config.json");
        if !config_path.exists() {
            return Err(SemcodeError::Config(format!(
                "no index configuration at {}",
                config_path.display()
            )));
        }
        let json = std::fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&json)?;
        Ok(config)
    }
}

/// File extensions considered for indexing.
///
/// Extensions without a grammar still get indexed through the line-windowed
/// fallback chunker.
pub const INDEXABLE_EXTENSIONS: &[&str] = &[
    // Grammar-backed
    "rs", "py", "pyi", "js", "jsx", "mjs", "cjs", "ts", "tsx", "mts", "cts", "go",
    // Fallback-chunked
    "java", "kt", "kts", "c", "h", "cpp", "hpp", "cc", "cxx", "hxx", "cs", "rb", "php", "swift",
    "scala", "sh", "bash", "zsh", "sql", "html", "css", "scss", "vue", "svelte", "json", "yaml",
    "yml", "toml", "md", "mdx", "txt",
];

/// Check if a file should be indexed based on its extension
pub fn should_index_file(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| INDEXABLE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Path globs skipped during scans by default.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "**/node_modules/**",
    "**/.git/**",
    "**/dist/**",
    "**/build/**",
    "**/.next/**",
    "**/coverage/**",
    "**/__pycache__/**",
    "**/venv/**",
    "**/.venv/**",
    "**/target/**",
    "**/vendor/**",
    "**/*.min.js",
    "**/*.bundle.js",
    "**/*.map",
    "**/package-lock.json",
    "**/yarn.lock",
    "**/pnpm-lock.yaml",
    "**/Cargo.lock",
    "**/poetry.lock",
    "**/go.sum",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_parsing() {
        let model: EmbeddingModel = "minilm".parse().unwrap();
        assert_eq!(model.dimension(), 384);

        let model: EmbeddingModel = "nomic".parse().unwrap();
        assert_eq!(model.dimension(), 768);

        assert!("invalid".parse::<EmbeddingModel>().is_err());
    }

    #[test]
    fn default_model_is_code_tuned() {
        assert_eq!(EmbeddingModel::default(), EmbeddingModel::NomicEmbedTextV15);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.chunk_target_size, 1500);
        assert_eq!(config.debounce_ms, 1000);
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
        assert!(config
            .ignore_patterns
            .iter()
            .any(|p| p.contains("node_modules")));
    }

    #[test]
    fn index_dir_is_beneath_root() {
        let config = Config::new(PathBuf::from("/proj"));
        assert!(config.index_dir.starts_with("/proj"));
        assert!(config
            .index_dir
            .to_string_lossy()
            .contains(".semantic-code"));
    }

    #[test]
    fn test_should_index_file() {
        use std::path::Path;

        assert!(should_index_file(Path::new("main.rs")));
        assert!(should_index_file(Path::new("app.py")));
        assert!(should_index_file(Path::new("index.tsx")));
        assert!(!should_index_file(Path::new("image.png")));
        assert!(!should_index_file(Path::new("binary.exe")));
    }

    #[test]
    fn log_enums_parse() {
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
