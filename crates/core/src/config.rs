use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u16(key: &str, default: u16) -> u16 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env_opt(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub aws: AwsConfig,
    pub queues: QueuesConfig,
    pub llm: LlmConfig,
    pub images: ImagesConfig,
    pub collector: CollectorConfig,
    pub renderer: RendererConfig,
    pub publisher: PublisherConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            storage: StorageConfig::from_env(),
            aws: AwsConfig::from_env(),
            queues: QueuesConfig::from_env(),
            llm: LlmConfig::from_env(),
            images: ImagesConfig::from_env(),
            collector: CollectorConfig::from_env(),
            renderer: RendererConfig::from_env(),
            publisher: PublisherConfig::from_env(),
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  server:     port={}", self.server.port);
        tracing::info!(
            "  storage:    backend={}, data_dir={}",
            self.storage.backend,
            self.storage.data_dir.display()
        );
        tracing::info!(
            "  aws:        region={}, bucket={}",
            self.aws.region,
            self.aws.s3_bucket.as_deref().unwrap_or("(none)")
        );
        tracing::info!(
            "  queues:     provider={}, poll_interval_ms={}",
            self.queues.provider,
            self.queues.poll_interval_ms
        );
        tracing::info!(
            "  llm:        provider={}, rate_limit_per_min={}",
            self.llm.provider,
            self.llm.rate_limit_per_min
        );
        tracing::info!("  images:     strategy={}", self.images.strategy);
        tracing::info!(
            "  collector:  auto_on_startup={}, interval_min={}",
            self.collector.auto_collect_on_startup,
            self.collector.collect_interval_minutes
        );
        tracing::info!(
            "  renderer:   stable_empty_secs={}",
            self.renderer.stable_empty_secs
        );
        tracing::info!(
            "  publisher:  build_command={}, output_max_mb={}",
            self.publisher.build_command,
            self.publisher.output_max_mb
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_u16("PORT", 3100),
            cors_origin: env_or("CORS_ORIGIN", "*"),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "local", "s3", or "memory".
    pub backend: String,
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_env() -> Self {
        Self {
            backend: env_or("STORAGE_BACKEND", "local"),
            data_dir: PathBuf::from(env_or("DATA_DIR", "data")),
        }
    }
}

// ── AWS / S3 ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_prefix: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env() -> Self {
        Self {
            region: env_or("AWS_REGION", "eu-west-1"),
            access_key_id: env_opt("AWS_ACCESS_KEY_ID"),
            secret_access_key: env_opt("AWS_SECRET_ACCESS_KEY"),
            session_token: env_opt("AWS_SESSION_TOKEN"),
            s3_bucket: env_opt("S3_BUCKET"),
            s3_prefix: env_opt("S3_PREFIX"),
            endpoint_url: env_opt("AWS_ENDPOINT_URL"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.access_key_id.is_some() && self.s3_bucket.is_some()
    }
}

// ── Queues ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuesConfig {
    /// "memory" or "sqs".
    pub provider: String,
    pub collect_queue_url: String,
    pub process_queue_url: String,
    pub render_queue_url: String,
    pub publish_queue_url: String,
    pub poll_interval_ms: u64,
    /// Visibility timeouts are per stage: a single large default would delay
    /// retry of genuinely failed messages.
    pub processor_visibility_secs: u32,
    pub renderer_visibility_secs: u32,
    pub publisher_visibility_secs: u32,
}

impl QueuesConfig {
    fn from_env() -> Self {
        Self {
            provider: env_or("QUEUE_PROVIDER", "memory"),
            collect_queue_url: env_or("COLLECT_QUEUE_URL", "collection-requests"),
            process_queue_url: env_or("PROCESS_QUEUE_URL", "content-processing-requests"),
            render_queue_url: env_or("RENDER_QUEUE_URL", "markdown-generation-requests"),
            publish_queue_url: env_or("PUBLISH_QUEUE_URL", "site-publishing-requests"),
            poll_interval_ms: env_u64("QUEUE_POLL_INTERVAL_MS", 1000),
            processor_visibility_secs: env_u32("PROCESSOR_VISIBILITY_SECS", 90),
            renderer_visibility_secs: env_u32("RENDERER_VISIBILITY_SECS", 60),
            publisher_visibility_secs: env_u32("PUBLISHER_VISIBILITY_SECS", 180),
        }
    }
}

// ── LLM ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai" or "anthropic".
    pub provider: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Per-replica quota. Operators size this conservatively relative to
    /// replica count x provider ceiling.
    pub rate_limit_per_min: u32,
    pub prompt_cost_per_1k: f64,
    pub completion_cost_per_1k: f64,
}

impl LlmConfig {
    fn from_env() -> Self {
        Self {
            provider: env_or("LLM_PROVIDER", "openai"),
            openai_api_key: env_opt("OPENAI_API_KEY"),
            openai_model: env_or("OPENAI_MODEL", "gpt-4o-mini"),
            openai_base_url: env_opt("OPENAI_BASE_URL"),
            anthropic_api_key: env_opt("ANTHROPIC_API_KEY"),
            anthropic_model: env_or("ANTHROPIC_MODEL", "claude-sonnet-4-5-20250929"),
            temperature: env_f64("LLM_TEMPERATURE", 0.7) as f32,
            max_tokens: env_u32("LLM_MAX_TOKENS", 4096),
            timeout_secs: env_u64("LLM_TIMEOUT_SECS", 60),
            rate_limit_per_min: env_u32("PROCESSOR_RATE_LIMIT_PER_MIN", 60),
            prompt_cost_per_1k: env_f64("LLM_PROMPT_COST_PER_1K", 0.00015),
            completion_cost_per_1k: env_f64("LLM_COMPLETION_COST_PER_1K", 0.0006),
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "openai" => self.openai_api_key.is_some(),
            "anthropic" => self.anthropic_api_key.is_some(),
            _ => false,
        }
    }
}

// ── Image sources ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// "pexels-only", "unsplash-only", or "dual-roundrobin".
    pub strategy: String,
    pub pexels_api_key: Option<String>,
    pub unsplash_access_key: Option<String>,
    pub pexels_hourly_limit: u32,
    pub unsplash_hourly_limit: u32,
    pub timeout_secs: u64,
}

impl ImagesConfig {
    fn from_env() -> Self {
        Self {
            strategy: env_or("IMAGE_SOURCE_STRATEGY", "dual-roundrobin"),
            pexels_api_key: env_opt("PEXELS_API_KEY"),
            unsplash_access_key: env_opt("UNSPLASH_ACCESS_KEY"),
            pexels_hourly_limit: env_u32("PEXELS_HOURLY_LIMIT", 45),
            unsplash_hourly_limit: env_u32("UNSPLASH_HOURLY_LIMIT", 400),
            timeout_secs: env_u64("IMAGE_TIMEOUT_SECS", 10),
        }
    }
}

// ── Collector ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub auto_collect_on_startup: bool,
    /// 0 disables the periodic timer.
    pub collect_interval_minutes: u64,
    pub dedup_window_hours: u32,
    pub sources_config_path: Option<PathBuf>,
    pub fetch_timeout_secs: u64,
    pub max_items_per_source: u32,
}

impl CollectorConfig {
    fn from_env() -> Self {
        Self {
            auto_collect_on_startup: env_bool("AUTO_COLLECT_ON_STARTUP", false),
            collect_interval_minutes: env_u64("COLLECT_INTERVAL_MINUTES", 240),
            dedup_window_hours: env_u32("DEDUP_WINDOW_HOURS", 48),
            sources_config_path: env_opt("SOURCES_CONFIG_PATH").map(PathBuf::from),
            fetch_timeout_secs: env_u64("SOURCE_FETCH_TIMEOUT_SECS", 10),
            max_items_per_source: env_u32("MAX_ITEMS_PER_SOURCE", 25),
        }
    }
}

// ── Renderer ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// How long the render queue must stay empty before one coalesced
    /// build message is emitted.
    pub stable_empty_secs: u64,
    pub drain_check_interval_secs: u64,
}

impl RendererConfig {
    fn from_env() -> Self {
        Self {
            stable_empty_secs: env_u64("STABLE_EMPTY_SECONDS", 30),
            drain_check_interval_secs: env_u64("DRAIN_CHECK_INTERVAL_SECONDS", 5),
        }
    }
}

// ── Publisher ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    pub work_dir: PathBuf,
    pub build_command: String,
    pub site_config_path: Option<PathBuf>,
    pub output_max_mb: u64,
    pub build_timeout_secs: u64,
    /// Copy loops log progress every this many files.
    pub progress_every_files: usize,
    pub site_url: String,
}

impl PublisherConfig {
    fn from_env() -> Self {
        Self {
            work_dir: PathBuf::from(env_or("PUBLISH_WORK_DIR", "work/publish")),
            build_command: env_or("SITE_BUILD_COMMAND", "hugo"),
            site_config_path: env_opt("SITE_CONFIG_PATH").map(PathBuf::from),
            output_max_mb: env_u64("SITE_BUILD_OUTPUT_MAX_MB", 200),
            build_timeout_secs: env_u64("SITE_BUILD_TIMEOUT_SECS", 600),
            progress_every_files: env_u32("PUBLISH_PROGRESS_EVERY_FILES", 500) as usize,
            site_url: env_or("SITE_URL", "http://localhost"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        // Rely on defaults for keys that are unlikely to be set in CI.
        let queues = QueuesConfig::from_env();
        assert_eq!(queues.processor_visibility_secs, 90);
        assert_eq!(queues.renderer_visibility_secs, 60);
        assert_eq!(queues.publisher_visibility_secs, 180);

        let renderer = RendererConfig::from_env();
        assert_eq!(renderer.stable_empty_secs, 30);

        let publisher = PublisherConfig::from_env();
        assert_eq!(publisher.output_max_mb, 200);
        assert_eq!(publisher.progress_every_files, 500);
    }

    #[test]
    fn llm_configured_requires_key() {
        let mut llm = LlmConfig::from_env();
        llm.provider = "openai".to_string();
        llm.openai_api_key = None;
        assert!(!llm.is_configured());
        llm.openai_api_key = Some("sk-test".to_string());
        assert!(llm.is_configured());
        llm.provider = "other".to_string();
        assert!(!llm.is_configured());
    }
}
