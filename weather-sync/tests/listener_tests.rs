//! Reconciliation of pushed property changes and listener supervision.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use common::{
    Connection, FakeAssets, FakeConfigs, FakePlatform, FakePushSource, FakeWeather, config,
    geolocation, notification,
};
use weather_sync::domain::{AssetRole, Location, ProcessStatus, StatusHandle, TenantId};
use weather_sync::listener::{
    BackoffConfig, EventListener, ListenerSupervisor, ReconcileOutcome, ReconnectBackoff,
};
use weather_sync::platform::{ChangeNotification, DataSubtype};
use weather_sync::scheduler::ReloadTrigger;
use weather_sync::{Error, Result};

const CLIENT_REFERENCE: &str = "weather-sync-test";

struct Fixture {
    assets: Arc<FakeAssets>,
    configs: Arc<FakeConfigs>,
    platform: Arc<FakePlatform>,
    weather: Arc<FakeWeather>,
    status: StatusHandle,
    reload_rx: mpsc::Receiver<TenantId>,
    listener: EventListener,
}

fn fixture() -> Fixture {
    let assets = FakeAssets::new();
    let configs = FakeConfigs::with([config(1, &["p1"]), config(2, &["p2"])]);
    let platform = FakePlatform::new();
    let weather = FakeWeather::new();
    weather.add_place("Bern", geolocation("Bern", "Bern", "CH", 46.948, 7.447));
    weather.add_place("Zurich", geolocation("Zürich", "Zurich", "CH", 47.374, 8.541));
    let status = StatusHandle::new();
    let (reload, reload_rx) = ReloadTrigger::channel(8);

    let listener = EventListener::new(
        assets.clone(),
        configs.clone(),
        platform.clone(),
        weather.clone(),
        reload,
        status.clone(),
        CLIENT_REFERENCE,
    );

    Fixture {
        assets,
        configs,
        platform,
        weather,
        status,
        reload_rx,
        listener,
    }
}

fn old_location() -> Location {
    Location {
        name: "Basel, Basel-City, CH".into(),
        lat: 47.56,
        lon: 7.59,
    }
}

#[tokio::test]
async fn test_new_managed_asset_is_resolved_written_back_and_stored() {
    let mut fx = fixture();
    fx.platform.add_managed_asset(100, "p1");

    let outcome = fx
        .listener
        .handle(&notification(100, json!({"name": "Bern"})))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome::Created {
            tenant_id: 1,
            external_id: 100
        }
    );

    let writes = fx.platform.upserts_of(DataSubtype::Property);
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].asset_id, 100);
    assert_eq!(writes[0].data["name"], json!("Bern, Bern, CH"));

    let stored = fx.assets.find(100).unwrap();
    assert_eq!(stored.configuration_id, 1);
    assert_eq!(stored.project_id, "p1");
    assert_eq!(
        stored.role,
        AssetRole::Leaf(Location {
            name: "Bern, Bern, CH".into(),
            lat: 46.948,
            lon: 7.447,
        })
    );

    assert_eq!(fx.reload_rx.try_recv().unwrap(), 1);
}

#[tokio::test]
async fn test_own_writes_are_ignored() {
    let mut fx = fixture();
    fx.platform.add_managed_asset(100, "p1");

    let mut echo = notification(100, json!({"name": "Bern, Bern, CH"}));
    echo.client_reference = Some(CLIENT_REFERENCE.to_string());

    let outcome = fx.listener.handle(&echo).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Echo);
    assert!(fx.platform.upserts().is_empty());
    assert!(fx.assets.all().is_empty());
    assert!(fx.reload_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_foreign_asset_type_is_skipped() {
    let mut fx = fixture();
    fx.platform.add_asset(100, "p1", "weather_station");

    let outcome = fx
        .listener
        .handle(&notification(100, json!({"name": "Bern"})))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Skipped(_)));
    assert!(fx.platform.upserts().is_empty());
    assert!(fx.assets.all().is_empty());
    assert!(fx.reload_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_non_string_location_name_is_skipped() {
    let fx = fixture();
    fx.platform.add_managed_asset(100, "p1");

    for data in [json!({"name": 42}), json!({"name": {"city": "Bern"}}), json!({})] {
        let outcome = fx.listener.handle(&notification(100, data)).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Skipped(_)));
    }
    assert!(fx.assets.all().is_empty());
}

#[tokio::test]
async fn test_unknown_place_is_skipped_without_writes() {
    let mut fx = fixture();
    fx.platform.add_managed_asset(100, "p1");

    let outcome = fx
        .listener
        .handle(&notification(100, json!({"name": "Atlantis"})))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Skipped(_)));
    assert!(fx.platform.upserts().is_empty());
    assert!(fx.assets.all().is_empty());
    assert!(fx.reload_rx.try_recv().is_err());
    assert_eq!(fx.weather.fetches(), 0);
    assert_eq!(fx.status.get(), ProcessStatus::Ok);
}

#[tokio::test]
async fn test_asset_in_unserved_project_is_skipped() {
    let fx = fixture();
    fx.platform.add_managed_asset(100, "p-unknown");

    let outcome = fx
        .listener
        .handle(&notification(100, json!({"name": "Bern"})))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Skipped(_)));
    assert!(fx.assets.all().is_empty());
}

#[tokio::test]
async fn test_lowest_configuration_id_serves_shared_project() {
    let fx = fixture();
    fx.configs.put(config(7, &["shared"]));
    fx.configs.put(config(3, &["shared", "p3"]));
    fx.platform.add_managed_asset(100, "shared");

    let outcome = fx
        .listener
        .handle(&notification(100, json!({"name": "Bern"})))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome::Created {
            tenant_id: 3,
            external_id: 100
        }
    );
}

#[tokio::test]
async fn test_failed_metadata_fetch_drops_notification() {
    let fx = fixture();

    let outcome = fx
        .listener
        .handle(&notification(404, json!({"name": "Bern"})))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Failed(_)));
    assert!(fx.assets.all().is_empty());
}

#[tokio::test]
async fn test_known_leaf_is_updated_and_tenant_reloaded() {
    let mut fx = fixture();
    fx.assets.add_leaf(2, "p2", 200, old_location());

    let outcome = fx
        .listener
        .handle(&notification(200, json!({"name": "Zurich"})))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome::Updated {
            tenant_id: 2,
            external_id: 200
        }
    );
    let stored = fx.assets.find(200).unwrap();
    assert_eq!(stored.location().unwrap().name, "Zürich, Zurich, CH");
    assert_eq!(
        fx.platform.upserts_of(DataSubtype::Property)[0].data["name"],
        json!("Zürich, Zurich, CH")
    );
    assert_eq!(fx.reload_rx.try_recv().unwrap(), 2);
}

#[tokio::test]
async fn test_known_leaf_keeps_location_when_place_is_unknown() {
    let fx = fixture();
    fx.assets.add_leaf(2, "p2", 200, old_location());

    let outcome = fx
        .listener
        .handle(&notification(200, json!({"name": "Atlantis"})))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Skipped(_)));
    assert_eq!(fx.assets.find(200).unwrap().location(), Some(&old_location()));
}

#[tokio::test]
async fn test_root_asset_changes_are_skipped() {
    let fx = fixture();
    fx.assets.add_root(1, "p1", 10);

    let outcome = fx
        .listener
        .handle(&notification(10, json!({"name": "Bern"})))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Skipped(_)));
    assert!(fx.platform.upserts().is_empty());
}

#[tokio::test]
async fn test_asset_store_failure_is_an_error() {
    let fx = fixture();
    fx.assets.set_fail_lookup(true);

    let result = fx
        .listener
        .handle(&notification(100, json!({"name": "Bern"})))
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_run_stops_with_error_when_stream_fails() {
    let fx = fixture();
    fx.platform.add_managed_asset(100, "p1");
    let items: Vec<Result<_>> = vec![
        Ok(notification(100, json!({"name": "Bern"}))),
        Err(Error::transient("connection reset")),
    ];
    let stream = futures::stream::iter(items);

    let result = fx
        .listener
        .run(Box::pin(stream), &CancellationToken::new())
        .await;

    assert!(result.is_err());
    assert_eq!(fx.status.get(), ProcessStatus::Error);
    assert!(fx.assets.find(100).is_some());
}

#[tokio::test]
async fn test_run_stops_with_error_when_stream_ends() {
    let fx = fixture();
    let stream = futures::stream::iter(Vec::<Result<ChangeNotification>>::new());

    let result = fx
        .listener
        .run(Box::pin(stream), &CancellationToken::new())
        .await;

    assert!(result.is_err());
    assert_eq!(fx.status.get(), ProcessStatus::Error);
}

#[tokio::test]
async fn test_run_returns_ok_when_cancelled() {
    let fx = fixture();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = fx
        .listener
        .run(
            Box::pin(futures::stream::pending::<Result<ChangeNotification>>()),
            &cancel,
        )
        .await;

    assert!(result.is_ok());
    assert_eq!(fx.status.get(), ProcessStatus::Ok);
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_reconnects_after_failures() {
    let fx = fixture();
    fx.platform.add_managed_asset(100, "p1");

    let source = FakePushSource::scripted([
        Connection::Refused,
        Connection::Closing(vec![]),
        Connection::Open(vec![Ok(notification(100, json!({"name": "Bern"})))]),
    ]);
    let backoff = ReconnectBackoff::new(BackoffConfig {
        base: Duration::from_secs(1),
        max: Duration::from_secs(8),
        failure_window: Duration::from_secs(300),
    });
    let supervisor =
        ListenerSupervisor::new(fx.listener, source.clone(), backoff, fx.status.clone());

    let cancel = CancellationToken::new();
    let task = tokio::spawn(supervisor.run(cancel.clone()));

    // 1s after the refusal, 2s after the closed stream.
    tokio::time::sleep(Duration::from_secs(4)).await;

    assert_eq!(source.connects(), 3);
    assert!(fx.assets.find(100).is_some());
    assert_eq!(fx.status.get(), ProcessStatus::Error);

    cancel.cancel();
    task.await.unwrap();
    assert_eq!(source.connects(), 3);
}
