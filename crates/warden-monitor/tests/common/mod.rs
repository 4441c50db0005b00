#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use warden_monitor::{
    Ledger, MemoryBackend, MonitorConfig, MonitorError, MonitorLoop, MonitorResult, Notifier,
    OutgoingImage, OwnerLookup, StatsBackend, StatsStore, TemplateStore, TileSource,
};
use warden_types::{ChannelId, Coordinate, PixelOffset, PixelOwnerInfo, TileRegion};

pub const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

/// Tile source returning whatever tile was last set.
#[derive(Default)]
pub struct ScriptedTiles {
    tile: Mutex<Option<RgbaImage>>,
    panicking: AtomicBool,
}

impl ScriptedTiles {
    /// Make every fetch panic until [`ScriptedTiles::set`] is called.
    pub fn panic_on_fetch(&self) {
        self.panicking.store(true, Ordering::SeqCst);
    }

    pub fn set(&self, tile: RgbaImage) {
        self.panicking.store(false, Ordering::SeqCst);
        *self.tile.lock().unwrap() = Some(tile);
    }

    pub fn fail(&self) {
        *self.tile.lock().unwrap() = None;
    }
}

#[async_trait]
impl TileSource for ScriptedTiles {
    async fn fetch_tile(&self, _region: TileRegion) -> MonitorResult<RgbaImage> {
        if self.panicking.load(Ordering::SeqCst) {
            panic!("tile decoder crashed");
        }
        self.tile
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| MonitorError::TileFetch("503 Service Unavailable".to_string()))
    }
}

/// Ownership lookup backed by a coordinate → owner table.
#[derive(Default)]
pub struct ScriptedOwners {
    owners: Mutex<HashMap<Coordinate, PixelOwnerInfo>>,
    failing: Mutex<Vec<Coordinate>>,
}

impl ScriptedOwners {
    pub fn paint(&self, x: u32, y: u32, user: &str) {
        self.owners.lock().unwrap().insert(
            Coordinate::new(x, y),
            PixelOwnerInfo::new(user, format!("{}-name", user)),
        );
    }

    pub fn fail_at(&self, x: u32, y: u32) {
        self.failing.lock().unwrap().push(Coordinate::new(x, y));
    }
}

#[async_trait]
impl OwnerLookup for ScriptedOwners {
    async fn lookup(
        &self,
        _region: TileRegion,
        coordinate: Coordinate,
    ) -> MonitorResult<Option<PixelOwnerInfo>> {
        if self.failing.lock().unwrap().contains(&coordinate) {
            return Err(MonitorError::Lookup {
                coordinate,
                reason: "500 Internal Server Error".to_string(),
            });
        }
        Ok(self.owners.lock().unwrap().get(&coordinate).cloned())
    }
}

/// In-memory ledger whose next saves can be made to fail.
#[derive(Default)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    failures: AtomicUsize,
}

impl FlakyBackend {
    pub fn fail_next_saves(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub async fn saved(&self) -> Ledger {
        self.inner.saved().await
    }
}

#[async_trait]
impl StatsBackend for FlakyBackend {
    async fn load(&self) -> MonitorResult<Ledger> {
        self.inner.load().await
    }

    async fn save(&self, ledger: &Ledger) -> MonitorResult<()> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(MonitorError::Persistence("disk full".to_string()));
        }
        self.inner.save(ledger).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text { channel: ChannelId, text: String },
    Image { channel: ChannelId, caption: String, filename: String },
}

/// Notifier that records every delivery.
pub struct RecordingNotifier {
    channels: Vec<ChannelId>,
    sent: Mutex<Vec<Sent>>,
}

impl RecordingNotifier {
    pub fn new(channels: &[&str]) -> Self {
        Self {
            channels: channels.iter().map(|c| ChannelId::new(*c)).collect(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                Sent::Image { .. } => None,
            })
            .collect()
    }

    pub fn images(&self) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s, Sent::Image { .. }))
            .count()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn channels(&self) -> Vec<ChannelId> {
        self.channels.clone()
    }

    async fn send_text(&self, channel: &ChannelId, text: &str) -> MonitorResult<()> {
        self.sent.lock().unwrap().push(Sent::Text {
            channel: channel.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_image(
        &self,
        channel: &ChannelId,
        image: &OutgoingImage,
        caption: &str,
    ) -> MonitorResult<()> {
        self.sent.lock().unwrap().push(Sent::Image {
            channel: channel.clone(),
            caption: caption.to_string(),
            filename: image.filename.clone(),
        });
        Ok(())
    }
}

pub struct Harness {
    pub monitor: MonitorLoop,
    pub tiles: Arc<ScriptedTiles>,
    pub owners: Arc<ScriptedOwners>,
    pub stats: Arc<StatsStore>,
    pub backend: Arc<FlakyBackend>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Monitor over a 4×4 all-red template at offset (0, 0).
pub async fn harness() -> Harness {
    harness_with(MonitorConfig::new(TileRegion::new(3, 7), PixelOffset::default())).await
}

pub async fn harness_with(mut config: MonitorConfig) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    config.request_timeout = Duration::from_secs(2);

    let tiles = Arc::new(ScriptedTiles::default());
    let owners = Arc::new(ScriptedOwners::default());
    let backend = Arc::new(FlakyBackend::default());
    let stats = Arc::new(StatsStore::open(backend.clone()).await.unwrap());
    let notifier = Arc::new(RecordingNotifier::new(&["alerts"]));

    let monitor = MonitorLoop::new(
        config,
        Arc::new(TemplateStore::from_image(RgbaImage::from_pixel(4, 4, RED))),
        tiles.clone(),
        owners.clone(),
        stats.clone(),
        notifier.clone(),
    )
    .unwrap();

    Harness {
        monitor,
        tiles,
        owners,
        stats,
        backend,
        notifier,
    }
}

/// A red tile with the given pixels painted blue.
pub fn tile_with_errors(errors: &[(u32, u32)]) -> RgbaImage {
    let mut tile = RgbaImage::from_pixel(8, 8, RED);
    for &(x, y) in errors {
        tile.put_pixel(x, y, BLUE);
    }
    tile
}
