//! Fixture source for tests and offline development.

use mill_core::content::{CollectedItem, QualityTemplate, SourceConfig, SourceKind};

use crate::error::CollectError;
use crate::sources::SourceAdapter;

/// Source that returns a fixed set of items without touching the network.
pub struct StaticSource {
    pub config: SourceConfig,
    items: Vec<CollectedItem>,
}

impl StaticSource {
    pub fn new(name: &str, items: Vec<CollectedItem>) -> Self {
        Self {
            config: SourceConfig {
                name: name.to_string(),
                kind: SourceKind::Forum,
                endpoint: "fixture://".to_string(),
                quality: QualityTemplate::default(),
                max_items: None,
            },
            items,
        }
    }

    /// Convenience: wrap directly into an adapter.
    pub fn adapter(name: &str, items: Vec<CollectedItem>) -> SourceAdapter {
        SourceAdapter::Static(Self::new(name, items))
    }

    pub fn with_quality(mut self, quality: QualityTemplate) -> Self {
        self.config.quality = quality;
        self
    }

    pub async fn fetch(&self) -> Result<Vec<CollectedItem>, CollectError> {
        Ok(self.items.clone())
    }
}
