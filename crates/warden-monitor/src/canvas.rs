//! Remote canvas access: tile bitmaps and pixel ownership.

use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use warden_types::{Coordinate, PixelOwnerInfo, TileRegion};

use crate::error::{MonitorError, MonitorResult};

/// Source of the current canvas tile.
#[async_trait]
pub trait TileSource: Send + Sync {
    async fn fetch_tile(&self, region: TileRegion) -> MonitorResult<RgbaImage>;
}

/// Resolves who last painted a pixel.
///
/// `Ok(None)` means the canvas knows no owner for the pixel, which is distinct
/// from a failed lookup.
#[async_trait]
pub trait OwnerLookup: Send + Sync {
    async fn lookup(
        &self,
        region: TileRegion,
        coordinate: Coordinate,
    ) -> MonitorResult<Option<PixelOwnerInfo>>;
}

pub const DEFAULT_TILE_URL: &str = "https://backend.wplace.live/files/s0/tiles/{tx}/{ty}.png";
pub const DEFAULT_PIXEL_URL: &str = "https://backend.wplace.live/s0/pixel/{tx}/{ty}?x={x}&y={y}";

/// URL templates and transport settings for the canvas backend.
///
/// `{tx}`/`{ty}` expand to the tile address, `{x}`/`{y}` to the pixel.
#[derive(Debug, Clone)]
pub struct CanvasEndpoints {
    pub tile_url: String,
    pub pixel_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for CanvasEndpoints {
    fn default() -> Self {
        Self {
            tile_url: DEFAULT_TILE_URL.to_string(),
            pixel_url: DEFAULT_PIXEL_URL.to_string(),
            user_agent: concat!("pixel-warden/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

impl CanvasEndpoints {
    pub fn tile_url(&self, region: TileRegion) -> String {
        expand_region(&self.tile_url, region)
    }

    pub fn pixel_url(&self, region: TileRegion, coordinate: Coordinate) -> String {
        expand_region(&self.pixel_url, region)
            .replace("{x}", &coordinate.x.to_string())
            .replace("{y}", &coordinate.y.to_string())
    }
}

fn expand_region(template: &str, region: TileRegion) -> String {
    template
        .replace("{tx}", &region.x.to_string())
        .replace("{ty}", &region.y.to_string())
}

#[derive(Debug, Deserialize)]
struct PixelPayload {
    #[serde(rename = "paintedBy", default)]
    painted_by: Option<PixelOwnerInfo>,
}

/// HTTP client for the canvas backend.
#[derive(Debug, Clone)]
pub struct HttpCanvasClient {
    client: Client,
    endpoints: CanvasEndpoints,
}

impl HttpCanvasClient {
    pub fn new(endpoints: CanvasEndpoints) -> MonitorResult<Self> {
        let client = Client::builder()
            .timeout(endpoints.timeout)
            .user_agent(endpoints.user_agent.clone())
            .build()
            .map_err(|e| MonitorError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &CanvasEndpoints {
        &self.endpoints
    }

    fn timeout_error(&self, operation: &'static str) -> MonitorError {
        MonitorError::Timeout {
            operation,
            timeout_ms: self.endpoints.timeout.as_millis() as u64,
        }
    }
}

#[async_trait]
impl TileSource for HttpCanvasClient {
    #[instrument(skip(self))]
    async fn fetch_tile(&self, region: TileRegion) -> MonitorResult<RgbaImage> {
        let url = self.endpoints.tile_url(region);
        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                self.timeout_error("tile fetch")
            } else {
                MonitorError::TileFetch(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::TileFetch(format!("{} returned {}", url, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MonitorError::TileFetch(e.to_string()))?;
        let tile = image::load_from_memory(&bytes)
            .map_err(|e| MonitorError::TileFetch(format!("undecodable tile: {}", e)))?
            .to_rgba8();

        debug!(width = tile.width(), height = tile.height(), "Fetched tile");
        Ok(tile)
    }
}

#[async_trait]
impl OwnerLookup for HttpCanvasClient {
    async fn lookup(
        &self,
        region: TileRegion,
        coordinate: Coordinate,
    ) -> MonitorResult<Option<PixelOwnerInfo>> {
        let url = self.endpoints.pixel_url(region, coordinate);
        let lookup_error = |reason: String| MonitorError::Lookup { coordinate, reason };

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                self.timeout_error("ownership lookup")
            } else {
                lookup_error(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(lookup_error(format!("{} returned {}", url, status)));
        }

        let payload: PixelPayload = response
            .json()
            .await
            .map_err(|e| lookup_error(format!("malformed payload: {}", e)))?;

        // The canvas reports unpainted pixels with an empty or zero id.
        Ok(payload.painted_by.filter(|info| {
            info.user_id()
                .is_some_and(|id| !matches!(id.as_str(), "" | "0"))
        }))
    }
}
