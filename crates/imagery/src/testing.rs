//! Scripted image provider for tests.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::provider::{ImageError, ImageProvider, StockImage};

enum Script {
    AlwaysOk(StockImage),
    AlwaysNone,
    AlwaysErr(u16, String),
}

pub struct ScriptedImageProvider {
    name: String,
    script: Script,
    calls: AtomicU64,
}

impl ScriptedImageProvider {
    pub fn always_ok(name: &str, image: StockImage) -> Self {
        Self {
            name: name.to_string(),
            script: Script::AlwaysOk(image),
            calls: AtomicU64::new(0),
        }
    }

    pub fn always_none(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Script::AlwaysNone,
            calls: AtomicU64::new(0),
        }
    }

    pub fn always_err(name: &str, err: ImageError) -> Self {
        let (status, body) = match err {
            ImageError::ApiError { status, body } => (status, body),
            other => (0, other.to_string()),
        };
        Self {
            name: name.to_string(),
            script: Script::AlwaysErr(status, body),
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageProvider for ScriptedImageProvider {
    async fn search(&self, _query: &str) -> Result<Option<StockImage>, ImageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::AlwaysOk(image) => Ok(Some(image.clone())),
            Script::AlwaysNone => Ok(None),
            Script::AlwaysErr(0, body) => Err(ImageError::ParseError(body.clone())),
            Script::AlwaysErr(status, body) => Err(ImageError::ApiError {
                status: *status,
                body: body.clone(),
            }),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
