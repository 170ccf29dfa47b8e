//! Source adapters: one variant per kind of third-party source.

pub mod feed;
pub mod forum;
pub mod microblog;

use std::path::Path;
use std::time::Duration;

use tracing::info;

use mill_core::config::CollectorConfig;
use mill_core::content::{CollectedItem, SourceConfig, SourceKind};

use crate::error::CollectError;

pub use feed::FeedSource;
pub use forum::ForumSource;
pub use microblog::MicroblogSource;

/// A configured source, dispatched by kind.
pub enum SourceAdapter {
    Forum(ForumSource),
    Microblog(MicroblogSource),
    Feed(FeedSource),
    /// Fixture-backed source for tests and offline development.
    Static(crate::testing::StaticSource),
}

impl SourceAdapter {
    pub fn from_config(config: SourceConfig, http: reqwest::Client, max_items: u32) -> Self {
        let max_items = config.max_items.unwrap_or(max_items) as usize;
        match config.kind {
            SourceKind::Forum => SourceAdapter::Forum(ForumSource::new(config, http, max_items)),
            SourceKind::Microblog => {
                SourceAdapter::Microblog(MicroblogSource::new(config, http, max_items))
            }
            SourceKind::Feed => SourceAdapter::Feed(FeedSource::new(config, http, max_items)),
        }
    }

    pub fn name(&self) -> &str {
        &self.config().name
    }

    pub fn config(&self) -> &SourceConfig {
        match self {
            SourceAdapter::Forum(s) => &s.config,
            SourceAdapter::Microblog(s) => &s.config,
            SourceAdapter::Feed(s) => &s.config,
            SourceAdapter::Static(s) => &s.config,
        }
    }

    /// Pull candidate items from the source.
    pub async fn fetch(&self) -> Result<Vec<CollectedItem>, CollectError> {
        match self {
            SourceAdapter::Forum(s) => s.fetch().await,
            SourceAdapter::Microblog(s) => s.fetch().await,
            SourceAdapter::Feed(s) => s.fetch().await,
            SourceAdapter::Static(s) => s.fetch().await,
        }
    }
}

/// Build all adapters from the collector config. Sources come from the JSON
/// file at `SOURCES_CONFIG_PATH`, or built-in defaults when unset.
pub fn build_sources(config: &CollectorConfig) -> Result<Vec<SourceAdapter>, CollectError> {
    let configs = match &config.sources_config_path {
        Some(path) => load_sources_file(path)?,
        None => default_sources(),
    };

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.fetch_timeout_secs))
        .user_agent("mill-collector/0.1")
        .build()
        .map_err(|e| CollectError::Config(format!("http client: {e}")))?;

    info!(count = configs.len(), "sources configured");
    Ok(configs
        .into_iter()
        .map(|c| SourceAdapter::from_config(c, http.clone(), config.max_items_per_source))
        .collect())
}

fn load_sources_file(path: &Path) -> Result<Vec<SourceConfig>, CollectError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| CollectError::Config(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| CollectError::Config(format!("invalid sources file {}: {e}", path.display())))
}

fn default_sources() -> Vec<SourceConfig> {
    use mill_core::content::QualityTemplate;

    vec![
        SourceConfig {
            name: "reddit-programming".to_string(),
            kind: SourceKind::Forum,
            endpoint: "https://www.reddit.com/r/programming/hot".to_string(),
            quality: QualityTemplate {
                min_score: 25.0,
                min_comments: 5,
                ..QualityTemplate::default()
            },
            max_items: None,
        },
        SourceConfig {
            name: "mastodon-social".to_string(),
            kind: SourceKind::Microblog,
            endpoint: "https://mastodon.social".to_string(),
            quality: QualityTemplate {
                min_score: 10.0,
                ..QualityTemplate::default()
            },
            max_items: None,
        },
        SourceConfig {
            name: "hn-frontpage".to_string(),
            kind: SourceKind::Feed,
            endpoint: "https://hnrss.org/frontpage".to_string(),
            // Feeds carry no engagement signals; the template must not
            // require them.
            quality: QualityTemplate::default(),
            max_items: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_all_kinds() {
        let sources = default_sources();
        assert!(sources.iter().any(|s| s.kind == SourceKind::Forum));
        assert!(sources.iter().any(|s| s.kind == SourceKind::Microblog));
        assert!(sources.iter().any(|s| s.kind == SourceKind::Feed));
    }

    #[test]
    fn sources_file_roundtrip() {
        let tmp = std::env::temp_dir().join(format!("mill-sources-{}.json", uuid::Uuid::new_v4()));
        let configs = default_sources();
        std::fs::write(&tmp, serde_json::to_string_pretty(&configs).unwrap()).unwrap();

        let loaded = load_sources_file(&tmp).unwrap();
        assert_eq!(loaded.len(), configs.len());
        assert_eq!(loaded[0].name, configs[0].name);
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn missing_sources_file_is_config_error() {
        let err = load_sources_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, CollectError::Config(_)));
    }
}
