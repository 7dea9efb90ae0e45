//! One collection cycle against in-memory collaborators.

mod common;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{FakeAssets, FakePlatform, FakeWeather, config};
use weather_sync::domain::{AssetRole, Location};
use weather_sync::platform::{DataSubtype, ROOT_ASSET_TYPE};
use weather_sync::scheduler::{CollectionRunner, Collector};

fn location(name: &str) -> Location {
    Location {
        name: name.to_string(),
        lat: 47.0,
        lon: 8.0,
    }
}

#[tokio::test]
async fn test_ensure_root_creates_missing_roots_once() {
    let assets = FakeAssets::new();
    assets.add_root(1, "p1", 500);
    let platform = FakePlatform::new();
    let runner = CollectionRunner::new(assets.clone(), FakeWeather::new(), platform.clone());

    let mut tenant = config(1, &["p1", "p2"]);
    tenant.owner_user_id = Some("user-7".into());
    runner.ensure_root(&tenant).await.unwrap();

    let created = platform.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].project_id, "p2");
    assert_eq!(created[0].asset_type, ROOT_ASSET_TYPE);

    let root = assets.find(9000).unwrap();
    assert_eq!(root.role, AssetRole::Root);
    assert_eq!(root.project_id, "p2");

    let notifications = platform.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user, "user-7");

    runner.ensure_root(&tenant).await.unwrap();
    assert_eq!(platform.created().len(), 1);
}

#[tokio::test]
async fn test_collect_upserts_one_reading_per_location() {
    let assets = FakeAssets::new();
    assets.add_root(1, "p1", 500);
    assets.add_leaf(1, "p1", 501, location("Bern, Bern, CH"));
    assets.add_leaf(1, "p1", 502, location("Thun, Bern, CH"));
    assets.add_leaf(2, "p9", 900, location("Chur, Grisons, CH"));
    let weather = FakeWeather::new();
    let platform = FakePlatform::new();
    let runner = CollectionRunner::new(assets, weather.clone(), platform.clone());

    runner
        .collect(&config(1, &["p1"]), &CancellationToken::new())
        .await
        .unwrap();

    let readings = platform.upserts_of(DataSubtype::Input);
    let mut ids: Vec<i64> = readings.iter().map(|r| r.asset_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![501, 502]);
    assert_eq!(readings[0].data["temperature"], json!(11.5));
    assert_eq!(readings[0].data["humidity"], json!(71));
    assert_eq!(weather.fetches(), 2);
}

#[tokio::test]
async fn test_collect_fails_when_any_upsert_fails() {
    let assets = FakeAssets::new();
    assets.add_leaf(1, "p1", 501, location("Bern, Bern, CH"));
    assets.add_leaf(1, "p1", 502, location("Thun, Bern, CH"));
    let platform = FakePlatform::new();
    platform.fail_upserts_for(502);
    let runner = CollectionRunner::new(assets, FakeWeather::new(), platform);

    let cancel = CancellationToken::new();
    let result = runner.collect(&config(1, &["p1"]), &cancel).await;

    assert!(result.is_err());
    assert!(cancel.is_cancelled());
}

#[tokio::test]
async fn test_collect_with_bad_key_fails() {
    let assets = FakeAssets::new();
    assets.add_leaf(1, "p1", 501, location("Bern, Bern, CH"));
    let weather = FakeWeather::new();
    weather.accept_only("another-key");
    let platform = FakePlatform::new();
    let runner = CollectionRunner::new(assets, weather, platform.clone());

    let result = runner
        .collect(&config(1, &["p1"]), &CancellationToken::new())
        .await;

    assert!(result.is_err());
    assert!(platform.upserts().is_empty());
}
