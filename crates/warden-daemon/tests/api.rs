use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use image::{Rgba, RgbaImage};
use serde_json::{json, Value};
use tower::ServiceExt;
use warden_daemon::api::create_router;
use warden_daemon::api::rest::state::AppState;
use warden_monitor::{
    CommandRouter, Ledger, LogNotifier, MemoryBackend, MonitorConfig, MonitorLoop, MonitorResult,
    OwnerLookup, StatsStore, TemplateStore, TileSource,
};
use warden_types::{
    ChannelId, Coordinate, PixelOffset, PixelOwnerInfo, TileRegion, UserErrorRecord, UserId,
};

struct StaticTile(RgbaImage);

#[async_trait]
impl TileSource for StaticTile {
    async fn fetch_tile(&self, _region: TileRegion) -> MonitorResult<RgbaImage> {
        Ok(self.0.clone())
    }
}

struct SinglePainter;

#[async_trait]
impl OwnerLookup for SinglePainter {
    async fn lookup(
        &self,
        _region: TileRegion,
        _coordinate: Coordinate,
    ) -> MonitorResult<Option<PixelOwnerInfo>> {
        Ok(Some(PixelOwnerInfo::new("7", "mallory")))
    }
}

/// Router over a monitor that has run one cycle with mismatches at (2, 1)
/// and (0, 3), and a ledger holding two offenders.
async fn app() -> (Router, Arc<StatsStore>) {
    let red = Rgba([255, 0, 0, 255]);
    let mut tile = RgbaImage::from_pixel(4, 4, red);
    tile.put_pixel(2, 1, Rgba([0, 0, 0, 255]));
    tile.put_pixel(0, 3, Rgba([0, 0, 0, 255]));

    let mut ledger = Ledger::new();
    ledger.insert(
        UserId::new("7"),
        UserErrorRecord::new(3, PixelOwnerInfo::new("7", "mallory").with_alliance("Raiders")),
    );
    ledger.insert(
        UserId::new("12"),
        UserErrorRecord::new(5, PixelOwnerInfo::new("12", "trent")),
    );
    let stats = Arc::new(
        StatsStore::open(Arc::new(MemoryBackend::with_ledger(ledger)))
            .await
            .unwrap(),
    );

    let mut monitor = MonitorLoop::new(
        MonitorConfig::new(TileRegion::new(0, 0), PixelOffset::default()),
        Arc::new(TemplateStore::from_image(RgbaImage::from_pixel(4, 4, red))),
        Arc::new(StaticTile(tile)),
        Arc::new(SinglePainter),
        stats.clone(),
        Arc::new(LogNotifier::new(vec![ChannelId::new("1")])),
    )
    .unwrap();
    monitor.tick().await.unwrap();

    let handle = monitor.handle();
    let commands = CommandRouter::new(stats.clone(), handle.mismatches(), "!");
    (
        create_router(AppState::new(stats.clone(), handle, commands)),
        stats,
    )
}

async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn health_and_status() {
    let (app, _) = app().await;

    let (status, body) = call(app.clone(), Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = call(app, Method::GET, "/api/v1/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["monitor"]["cycles"], 1);
    assert_eq!(body["monitor"]["baseline"], "baselined");
    assert_eq!(body["monitor"]["last_outcome"]["outcome"], "new_errors");
    assert_eq!(body["ledger"]["offenders"], 2);
    assert_eq!(body["ledger"]["total_errors"], 8);
}

#[tokio::test]
async fn leaderboard_is_ranked() {
    let (app, _) = app().await;

    let (status, body) = call(app, Method::GET, "/api/v1/leaderboard", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            { "rank": 1, "user_id": "12", "name": "trent", "count": 5 },
            { "rank": 2, "user_id": "7", "name": "mallory", "alliance": "Raiders", "count": 3 },
        ])
    );
}

#[tokio::test]
async fn error_pixels_are_sorted() {
    let (app, _) = app().await;

    let (status, body) = call(app, Method::GET, "/api/v1/error-pixels", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(
        body["pixels"],
        json!([{ "x": 0, "y": 3 }, { "x": 2, "y": 1 }])
    );
}

#[tokio::test]
async fn pardon_removes_record() {
    let (app, stats) = app().await;

    let (status, body) = call(app.clone(), Method::DELETE, "/api/v1/offenders/7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "mallory");
    assert_eq!(body["count"], 3);
    assert!(stats.get(&UserId::new("7")).await.is_none());

    let (status, body) = call(app, Method::DELETE, "/api/v1/offenders/7", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn commands_are_answered() {
    let (app, stats) = app().await;

    let (status, body) = call(
        app.clone(),
        Method::POST,
        "/api/v1/commands",
        Some(json!({ "text": "!errorPixels" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let reply = body["reply"].as_str().unwrap();
    assert!(reply.contains("| 0 | 3 |"));
    assert!(reply.contains("| 2 | 1 |"));

    let (status, body) = call(
        app.clone(),
        Method::POST,
        "/api/v1/commands",
        Some(json!({ "text": "!rm 12" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["reply"].as_str().unwrap().contains("trent"));
    assert_eq!(stats.len().await, 1);

    let (status, _) = call(
        app,
        Method::POST,
        "/api/v1/commands",
        Some(json!({ "text": "good morning" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
