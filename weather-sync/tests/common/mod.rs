//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use openweather::{CurrentConditions, Geolocation};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use weather_sync::database::{AssetRepository, ConfigurationRepository};
use weather_sync::domain::{Asset, AssetRole, Configuration, Location, NewAsset, TenantId};
use weather_sync::platform::{
    ChangeNotification, CreateAssetRequest, DataRecord, DataSubtype, MANAGED_ASSET_TYPE,
    NotificationStream, PlatformApi, PlatformAsset, PushSource, UserNotification,
};
use weather_sync::scheduler::Collector;
use weather_sync::weather::WeatherProvider;
use weather_sync::{Error, Result};

pub fn config(id: TenantId, projects: &[&str]) -> Configuration {
    Configuration {
        id,
        api_key: format!("key-{id}"),
        refresh_interval_secs: 60,
        request_timeout_secs: 10,
        enabled: true,
        active: false,
        project_ids: projects.iter().map(|p| p.to_string()).collect(),
        owner_user_id: None,
    }
}

pub fn notification(asset_id: i64, data: serde_json::Value) -> ChangeNotification {
    let serde_json::Value::Object(data) = data else {
        panic!("notification data must be an object");
    };
    ChangeNotification {
        asset_id,
        subtype: DataSubtype::Property,
        timestamp: None,
        data,
        client_reference: None,
    }
}

pub fn geolocation(name: &str, state: &str, country: &str, lat: f64, lon: f64) -> Geolocation {
    Geolocation {
        name: name.to_string(),
        local_names: HashMap::new(),
        lat,
        lon,
        country: country.to_string(),
        state: state.to_string(),
    }
}

pub fn current_conditions() -> CurrentConditions {
    CurrentConditions {
        dt: 1_700_000_000,
        sunrise: 1_699_990_000,
        sunset: 1_700_030_000,
        temp: 11.5,
        feels_like: 10.2,
        pressure: 1018,
        humidity: 71,
        dew_point: 6.4,
        uvi: 1.3,
        clouds: 40,
        visibility: 10_000,
        wind_speed: 3.6,
        wind_deg: 220,
        weather: Vec::new(),
    }
}

/// Lets spawned tasks run without advancing a paused clock.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
pub struct FakeConfigs {
    configs: Mutex<BTreeMap<TenantId, Configuration>>,
    fail_list: AtomicBool,
    set_active_failures: AtomicUsize,
}

impl FakeConfigs {
    pub fn with(configs: impl IntoIterator<Item = Configuration>) -> Arc<Self> {
        let fake = Self::default();
        {
            let mut stored = fake.configs.lock();
            for config in configs {
                stored.insert(config.id, config);
            }
        }
        Arc::new(fake)
    }

    /// Replaces a stored configuration verbatim, including `active`.
    pub fn put(&self, config: Configuration) {
        self.configs.lock().insert(config.id, config);
    }

    pub fn remove(&self, id: TenantId) {
        self.configs.lock().remove(&id);
    }

    pub fn stored(&self, id: TenantId) -> Option<Configuration> {
        self.configs.lock().get(&id).cloned()
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `count` calls to `set_active` fail.
    pub fn fail_set_active(&self, count: usize) {
        self.set_active_failures.store(count, Ordering::SeqCst);
    }

    pub fn update(&self, id: TenantId, change: impl FnOnce(&mut Configuration)) {
        if let Some(config) = self.configs.lock().get_mut(&id) {
            change(config);
        }
    }
}

#[async_trait]
impl ConfigurationRepository for FakeConfigs {
    async fn list(&self) -> Result<Vec<Configuration>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::Other("configuration store unavailable".into()));
        }
        Ok(self.configs.lock().values().cloned().collect())
    }

    async fn get(&self, id: TenantId) -> Result<Configuration> {
        self.stored(id)
            .ok_or_else(|| Error::not_found("Configuration", id.to_string()))
    }

    async fn upsert(&self, config: &Configuration) -> Result<Configuration> {
        let mut configs = self.configs.lock();
        let mut stored = config.clone();
        if stored.id == 0 {
            stored.id = configs.keys().next_back().copied().unwrap_or(0) + 1;
        }
        stored.active = configs.get(&stored.id).is_some_and(|c| c.active);
        configs.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn set_active(&self, id: TenantId, active: bool) -> Result<()> {
        let pending = self.set_active_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.set_active_failures.store(pending - 1, Ordering::SeqCst);
            return Err(Error::Other("configuration store busy".into()));
        }
        match self.configs.lock().get_mut(&id) {
            Some(config) => {
                config.active = active;
                Ok(())
            }
            None => Err(Error::not_found("Configuration", id.to_string())),
        }
    }

    async fn delete(&self, id: TenantId) -> Result<()> {
        match self.configs.lock().remove(&id) {
            Some(_) => Ok(()),
            None => Err(Error::not_found("Configuration", id.to_string())),
        }
    }
}

#[derive(Default)]
pub struct FakeAssets {
    assets: Mutex<Vec<Asset>>,
    fail_lookup: AtomicBool,
}

impl FakeAssets {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_root(&self, configuration_id: TenantId, project_id: &str, external_id: i64) {
        self.push(configuration_id, project_id, external_id, AssetRole::Root);
    }

    pub fn add_leaf(
        &self,
        configuration_id: TenantId,
        project_id: &str,
        external_id: i64,
        location: Location,
    ) {
        self.push(
            configuration_id,
            project_id,
            external_id,
            AssetRole::Leaf(location),
        );
    }

    fn push(&self, configuration_id: TenantId, project_id: &str, external_id: i64, role: AssetRole) {
        let mut assets = self.assets.lock();
        let id = assets.len() as i64 + 1;
        assets.push(Asset {
            id,
            configuration_id,
            project_id: project_id.to_string(),
            external_id,
            role,
        });
    }

    pub fn all(&self) -> Vec<Asset> {
        self.assets.lock().clone()
    }

    pub fn find(&self, external_id: i64) -> Option<Asset> {
        self.assets
            .lock()
            .iter()
            .find(|a| a.external_id == external_id)
            .cloned()
    }

    pub fn set_fail_lookup(&self, fail: bool) {
        self.fail_lookup.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AssetRepository for FakeAssets {
    async fn get_by_external_id(&self, external_id: i64) -> Result<Asset> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(Error::Other("asset store unavailable".into()));
        }
        self.find(external_id)
            .ok_or_else(|| Error::not_found("Asset", external_id.to_string()))
    }

    async fn insert(&self, asset: &NewAsset) -> Result<Asset> {
        if let Some(existing) = self.find(asset.external_id) {
            return Ok(existing);
        }
        self.push(
            asset.configuration_id,
            &asset.project_id,
            asset.external_id,
            asset.role.clone(),
        );
        self.get_by_external_id(asset.external_id).await
    }

    async fn update_location(&self, asset: &Asset) -> Result<()> {
        let mut assets = self.assets.lock();
        match assets
            .iter_mut()
            .find(|a| a.external_id == asset.external_id && !a.is_root())
        {
            Some(stored) => {
                stored.role = asset.role.clone();
                Ok(())
            }
            None => Err(Error::not_found("Asset", asset.external_id.to_string())),
        }
    }

    async fn list_roots(&self) -> Result<Vec<Asset>> {
        Ok(self.all().into_iter().filter(Asset::is_root).collect())
    }

    async fn list_leaves(&self, configuration_id: TenantId) -> Result<Vec<Asset>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|a| a.configuration_id == configuration_id && !a.is_root())
            .collect())
    }

    async fn find_root(
        &self,
        configuration_id: TenantId,
        project_id: &str,
    ) -> Result<Option<Asset>> {
        Ok(self.all().into_iter().find(|a| {
            a.is_root() && a.configuration_id == configuration_id && a.project_id == project_id
        }))
    }
}

pub struct FakePlatform {
    assets: Mutex<HashMap<i64, PlatformAsset>>,
    upserts: Mutex<Vec<DataRecord>>,
    failing_upserts: Mutex<HashSet<i64>>,
    created: Mutex<Vec<CreateAssetRequest>>,
    notifications: Mutex<Vec<UserNotification>>,
    next_asset_id: AtomicI64,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            assets: Mutex::new(HashMap::new()),
            upserts: Mutex::new(Vec::new()),
            failing_upserts: Mutex::new(HashSet::new()),
            created: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
            next_asset_id: AtomicI64::new(9000),
        })
    }

    pub fn add_asset(&self, id: i64, project_id: &str, asset_type: &str) {
        self.assets.lock().insert(
            id,
            PlatformAsset {
                id,
                project_id: project_id.to_string(),
                asset_type: asset_type.to_string(),
                name: None,
            },
        );
    }

    pub fn add_managed_asset(&self, id: i64, project_id: &str) {
        self.add_asset(id, project_id, MANAGED_ASSET_TYPE);
    }

    pub fn fail_upserts_for(&self, asset_id: i64) {
        self.failing_upserts.lock().insert(asset_id);
    }

    pub fn upserts(&self) -> Vec<DataRecord> {
        self.upserts.lock().clone()
    }

    pub fn upserts_of(&self, subtype: DataSubtype) -> Vec<DataRecord> {
        self.upserts()
            .into_iter()
            .filter(|r| r.subtype == subtype)
            .collect()
    }

    pub fn created(&self) -> Vec<CreateAssetRequest> {
        self.created.lock().clone()
    }

    pub fn notifications(&self) -> Vec<UserNotification> {
        self.notifications.lock().clone()
    }
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn upsert_data(&self, record: &DataRecord) -> Result<()> {
        if self.failing_upserts.lock().contains(&record.asset_id) {
            return Err(Error::platform(format!(
                "upsert for asset {} rejected",
                record.asset_id
            )));
        }
        self.upserts.lock().push(record.clone());
        Ok(())
    }

    async fn get_asset(&self, asset_id: i64) -> Result<PlatformAsset> {
        self.assets
            .lock()
            .get(&asset_id)
            .cloned()
            .ok_or_else(|| Error::not_found("Asset", asset_id.to_string()))
    }

    async fn create_asset(&self, request: &CreateAssetRequest) -> Result<i64> {
        self.created.lock().push(request.clone());
        Ok(self.next_asset_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn notify_user(&self, notification: &UserNotification) -> Result<()> {
        self.notifications.lock().push(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeWeather {
    places: Mutex<HashMap<String, Vec<Geolocation>>>,
    valid_key: Mutex<Option<String>>,
    fetches: AtomicUsize,
}

impl FakeWeather {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_place(&self, query: &str, hit: Geolocation) {
        self.places
            .lock()
            .entry(query.to_string())
            .or_default()
            .push(hit);
    }

    /// Only `key` passes authentication from now on.
    pub fn accept_only(&self, key: &str) {
        *self.valid_key.lock() = Some(key.to_string());
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check_key(&self, api_key: &str) -> Result<()> {
        match self.valid_key.lock().as_deref() {
            Some(valid) if valid != api_key => {
                Err(Error::platform("401 Unauthorized: invalid API key"))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl WeatherProvider for FakeWeather {
    async fn geocode(&self, name: &str, api_key: &str) -> Result<Vec<Geolocation>> {
        self.check_key(api_key)?;
        Ok(self.places.lock().get(name).cloned().unwrap_or_default())
    }

    async fn fetch_current(&self, _lat: f64, _lon: f64, api_key: &str) -> Result<CurrentConditions> {
        self.check_key(api_key)?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(current_conditions())
    }

    async fn test_authentication(&self, api_key: &str) -> Result<()> {
        self.check_key(api_key)
    }
}

/// Collector that counts calls and can be slowed down or made to fail.
#[derive(Default)]
pub struct CountingCollector {
    started: AtomicUsize,
    completed: AtomicUsize,
    ensure_roots: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    delay: Mutex<Duration>,
    fail: AtomicBool,
    refresh_intervals: Mutex<Vec<u64>>,
}

impl CountingCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        let collector = Self::default();
        *collector.delay.lock() = delay;
        Arc::new(collector)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn ensure_roots(&self) -> usize {
        self.ensure_roots.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    /// Refresh interval of the configuration each cycle ran with.
    pub fn refresh_intervals(&self) -> Vec<u64> {
        self.refresh_intervals.lock().clone()
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Collector for CountingCollector {
    async fn ensure_root(&self, _config: &Configuration) -> Result<()> {
        self.ensure_roots.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn collect(&self, config: &Configuration, _cancel: &CancellationToken) -> Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.refresh_intervals.lock().push(config.refresh_interval_secs);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let _running = RunningGuard(&self.running);

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::transient("weather provider unreachable"));
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One scripted outcome of [`FakePushSource::connect`].
pub enum Connection {
    Refused,
    /// Yields the items, then stays open.
    Open(Vec<Result<ChangeNotification>>),
    /// Yields the items, then ends.
    Closing(Vec<Result<ChangeNotification>>),
}

#[derive(Default)]
pub struct FakePushSource {
    script: Mutex<VecDeque<Connection>>,
    connects: AtomicUsize,
}

impl FakePushSource {
    pub fn scripted(script: impl IntoIterator<Item = Connection>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            connects: AtomicUsize::new(0),
        })
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushSource for FakePushSource {
    async fn connect(&self) -> Result<NotificationStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        match next {
            Some(Connection::Refused) => Err(Error::transient("connection refused")),
            Some(Connection::Open(items)) => Ok(futures::stream::iter(items)
                .chain(futures::stream::pending())
                .boxed()),
            Some(Connection::Closing(items)) => Ok(futures::stream::iter(items).boxed()),
            None => Ok(futures::stream::pending().boxed()),
        }
    }
}
