//! Hub facing entities: one switch per resource and a connectivity sensor.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;

use crate::duration::duration_pretty;
use crate::error::Result;
use crate::executor::Executor;
use crate::resource::{attributes, Resource, ResourceKey};
use crate::session::{RouterIdentity, RouterSession};
use crate::toggle::ToggleCoordinator;

pub const DOMAIN: &str = "fritzbox_tools";

pub const SWITCH_SCAN_INTERVAL: Duration = Duration::seconds(30);
pub const SENSOR_SCAN_INTERVAL: Duration = Duration::seconds(60);

/// The router as a device in the hub's device registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub identifiers: (&'static str, String),
    pub name: String,
    pub manufacturer: &'static str,
    pub model: String,
    pub sw_version: String,
}

impl From<&RouterIdentity> for DeviceInfo {
    fn from(identity: &RouterIdentity) -> Self {
        Self {
            identifiers: (DOMAIN, identity.serial_number.clone()),
            name: identity.short_model().to_string(),
            manufacturer: identity.manufacturer,
            model: identity.model_name.clone(),
            sw_version: identity.software_version.clone(),
        }
    }
}

fn unique_id(identity: &RouterIdentity, entity_id: &str) -> String {
    format!("{}-{}", identity.serial_number, entity_id)
}

pub struct SwitchEntity {
    coordinator: Arc<ToggleCoordinator>,
    executor: Executor,
    key: ResourceKey,
    name: String,
    entity_id: String,
    unique_id: String,
    icon: &'static str,
    device_info: DeviceInfo,
    is_on: bool,
    available: bool,
    attributes: BTreeMap<String, String>,
}

impl SwitchEntity {
    /// Registers `resource` with the coordinator. Fails if the router
    /// identity is unknown.
    pub fn new(
        resource: &Resource,
        coordinator: Arc<ToggleCoordinator>,
        executor: Executor,
    ) -> Result<Self> {
        let identity = coordinator.session().identity()?;
        let unique_id = unique_id(identity, &resource.entity_id);
        let device_info = DeviceInfo::from(identity);
        coordinator.register(resource);

        let mut entity = Self {
            coordinator,
            executor,
            key: resource.key.clone(),
            name: resource.name.clone(),
            entity_id: resource.entity_id.clone(),
            unique_id,
            icon: resource.icon,
            device_info,
            is_on: resource.initial_state,
            available: resource.unusable.is_none(),
            attributes: attributes(resource.kind(), &resource.details),
        };
        entity.sync();
        Ok(entity)
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn icon(&self) -> &'static str {
        self.icon
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn available(&self) -> bool {
        self.available
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn scan_interval(&self) -> Duration {
        SWITCH_SCAN_INTERVAL
    }

    pub async fn update(&mut self) {
        let coordinator = self.coordinator.clone();
        let key = self.key.clone();
        if let Err(err) = self
            .executor
            .spawn(move || coordinator.poll(&key))
            .join()
            .await
        {
            debug!("{} not updated: {err}", self.entity_id);
        }
        self.sync();
    }

    pub async fn turn_on(&mut self) -> Result<()> {
        self.switch(true).await
    }

    pub async fn turn_off(&mut self) -> Result<()> {
        self.switch(false).await
    }

    async fn switch(&mut self, on: bool) -> Result<()> {
        let previous = self.is_on;
        self.is_on = on;

        let coordinator = self.coordinator.clone();
        let key = self.key.clone();
        let result = self
            .executor
            .spawn(move || coordinator.apply(&key, on))
            .join()
            .await;
        self.sync();
        if result.is_err() {
            self.is_on = previous;
        }
        result
    }

    fn sync(&mut self) {
        if let Some(status) = self.coordinator.status(&self.key) {
            self.is_on = status.is_on;
            self.available = status.available;
            self.attributes = attributes(self.key.kind(), &status.details);
        }
    }
}

impl std::fmt::Debug for SwitchEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchEntity")
            .field("entity_id", &self.entity_id)
            .field("is_on", &self.is_on)
            .field("available", &self.available)
            .finish()
    }
}

/// Whether the router has a working WAN connection.
#[derive(Debug)]
pub struct ConnectivitySensor {
    session: Arc<RouterSession>,
    executor: Executor,
    unique_id: String,
    device_info: DeviceInfo,
    is_on: bool,
    available: bool,
    attributes: BTreeMap<String, String>,
}

impl ConnectivitySensor {
    pub const NAME: &'static str = "FRITZ!Box Connectivity";
    pub const ENTITY_ID: &'static str = "binary_sensor.fritzbox_connectivity";
    pub const ICON: &'static str = "mdi:router-wireless";

    pub fn new(session: Arc<RouterSession>, executor: Executor) -> Result<Self> {
        let identity = session.identity()?;
        let unique_id = unique_id(identity, Self::ENTITY_ID);
        let device_info = DeviceInfo::from(identity);
        let mut attributes = BTreeMap::new();
        attributes.insert("modelname".to_string(), identity.model_name.clone());
        Ok(Self {
            session,
            executor,
            unique_id,
            device_info,
            is_on: false,
            available: true,
            attributes,
        })
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn available(&self) -> bool {
        self.available
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn scan_interval(&self) -> Duration {
        SENSOR_SCAN_INTERVAL
    }

    pub async fn update(&mut self) {
        let session = self.session.clone();
        if let Err(err) = self
            .executor
            .spawn(move || session.poll_connection())
            .join()
            .await
        {
            debug!("{} not updated: {err}", Self::ENTITY_ID);
        }

        let health = self.session.connection_health();
        self.is_on = health.connected;
        self.available = health.last_error.is_none();
        if let Some(ip) = health.external_ip {
            self.attributes.insert("external_ip".to_string(), ip);
        }
        if let Some(ip) = health.external_ipv6 {
            self.attributes.insert("external_ipv6".to_string(), ip);
        }
        if let Some(uptime) = health.uptime {
            self.attributes.insert("uptime".to_string(), uptime.to_string());
            if let Some(d) = Duration::try_seconds(uptime) {
                self.attributes
                    .insert("str_uptime".to_string(), duration_pretty(d));
            }
        }
    }
}
