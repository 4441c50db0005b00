//! Reference template loading.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use image::RgbaImage;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{MonitorError, MonitorResult};

#[derive(Debug)]
enum TemplateSource {
    File(PathBuf),
    Fixed(Arc<RgbaImage>),
}

#[derive(Debug)]
struct CachedTemplate {
    modified: Option<SystemTime>,
    image: Arc<RgbaImage>,
}

/// Loads the reference template and keeps the decoded bitmap.
///
/// File-backed templates are re-read whenever the file's modification time
/// changes, so the template can be replaced while the monitor runs.
#[derive(Debug)]
pub struct TemplateStore {
    source: TemplateSource,
    cache: Mutex<Option<CachedTemplate>>,
}

impl TemplateStore {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: TemplateSource::File(path.into()),
            cache: Mutex::new(None),
        }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            source: TemplateSource::Fixed(Arc::new(image)),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            TemplateSource::File(path) => Some(path),
            TemplateSource::Fixed(_) => None,
        }
    }

    /// Current template bitmap.
    pub async fn load(&self) -> MonitorResult<Arc<RgbaImage>> {
        let path = match &self.source {
            TemplateSource::Fixed(image) => return Ok(image.clone()),
            TemplateSource::File(path) => path,
        };

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| load_error(path, e))?;
        let modified = metadata.modified().ok();

        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if modified.is_some() && cached.modified == modified {
                return Ok(cached.image.clone());
            }
        }

        let bytes = tokio::fs::read(path).await.map_err(|e| load_error(path, e))?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| load_error(path, e))?
            .to_rgba8();

        if cache.is_some() {
            info!(path = %path.display(), "Template changed on disk, reloaded");
        } else {
            debug!(path = %path.display(), "Template loaded");
        }
        info!(
            width = image.width(),
            height = image.height(),
            "Template dimensions"
        );

        let image = Arc::new(image);
        *cache = Some(CachedTemplate {
            modified,
            image: image.clone(),
        });
        Ok(image)
    }
}

fn load_error(path: &Path, err: impl std::fmt::Display) -> MonitorError {
    MonitorError::TemplateLoad {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
