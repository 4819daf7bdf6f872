//! In-memory stand-ins for the router and its profile interface.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::client::{
    args, ArgValue, Arguments, ConnectionParams, Connector, Profile, ProfileClient, ProfileDevice,
    RouterClient,
};
use crate::error::{ClientError, ClientResult};

pub(crate) const SERIAL: &str = "989BCB2C4A6F";

pub(crate) struct FakeRouter {
    services: BTreeSet<String>,
    wifi: Mutex<BTreeMap<u8, bool>>,
    port_mappings: Mutex<Vec<Arguments>>,
    deflections: Mutex<Vec<(u32, bool)>>,
    failures: Mutex<HashMap<String, ClientError>>,
    calls: Mutex<Vec<(String, String, Arguments)>>,
    reconnects: AtomicUsize,
}

impl FakeRouter {
    pub(crate) fn new(services: &[&str]) -> Self {
        Self {
            services: services.iter().map(|s| s.to_string()).collect(),
            wifi: Mutex::new(BTreeMap::new()),
            port_mappings: Mutex::new(Vec::new()),
            deflections: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            reconnects: AtomicUsize::new(0),
        }
    }

    /// A dual band box with every service this crate uses.
    pub(crate) fn fritzbox_7590() -> Self {
        Self::new(&[
            "DeviceInfo:1",
            "DeviceConfig:1",
            "Layer3Forwarding:1",
            "WANIPConnection:1",
            "WANPPPConnection:1",
            "WLANConfiguration:1",
            "WLANConfiguration:2",
            "WLANConfiguration:3",
            "X_AVM-DE_OnTel:1",
        ])
    }

    pub(crate) fn set_wifi(&self, network: u8, on: bool) {
        self.wifi.lock().unwrap().insert(network, on);
    }

    pub(crate) fn add_port_mapping(&self, mapping: Arguments) {
        self.port_mappings.lock().unwrap().push(mapping);
    }

    pub(crate) fn port_mapping(&self, index: usize) -> Arguments {
        self.port_mappings.lock().unwrap()[index].clone()
    }

    pub(crate) fn set_port_mapping_enabled(&self, index: usize, on: bool) {
        self.port_mappings.lock().unwrap()[index].insert("NewEnabled".to_string(), ArgValue::flag(on));
    }

    pub(crate) fn add_deflection(&self, id: u32, on: bool) {
        self.deflections.lock().unwrap().push((id, on));
    }

    pub(crate) fn set_deflection(&self, id: u32, on: bool) {
        for deflection in self.deflections.lock().unwrap().iter_mut() {
            if deflection.0 == id {
                deflection.1 = on;
            }
        }
    }

    /// Makes every call of `action` fail with `err`.
    pub(crate) fn fail(&self, action: &str, err: ClientError) {
        self.failures.lock().unwrap().insert(action.to_string(), err);
    }

    pub(crate) fn heal(&self, action: &str) {
        self.failures.lock().unwrap().remove(action);
    }

    pub(crate) fn calls_of(&self, action: &str) -> Vec<Arguments> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, a, _)| a == action)
            .map(|(_, _, args)| args.clone())
            .collect()
    }

    pub(crate) fn count(&self, action: &str) -> usize {
        self.calls_of(action).len()
    }

    pub(crate) fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    fn deflection_list(&self) -> String {
        let items: String = self
            .deflections
            .lock()
            .unwrap()
            .iter()
            .map(|(id, on)| {
                format!(
                    "<Item><DeflectionId>{id}</DeflectionId><Enable>{}</Enable>\
                     <Type>fromNumber</Type><Number>0301234567</Number>\
                     <DeflectionToNumber>0179876543</DeflectionToNumber>\
                     <Mode>eImmediately</Mode><Outgoing>0</Outgoing>\
                     <PhonebookID>0</PhonebookID></Item>",
                    u8::from(*on)
                )
            })
            .collect();
        format!("<?xml version=\"1.0\" encoding=\"utf-8\"?><List>{items}</List>")
    }

    fn network(service: &str) -> Option<u8> {
        service.strip_prefix("WLANConfiguration:")?.parse().ok()
    }
}

impl RouterClient for FakeRouter {
    fn call_action(
        &self,
        service: &str,
        action: &str,
        arguments: &Arguments,
    ) -> ClientResult<Arguments> {
        self.calls
            .lock()
            .unwrap()
            .push((service.to_string(), action.to_string(), arguments.clone()));
        if let Some(err) = self.failures.lock().unwrap().get(action) {
            return Err(err.clone());
        }
        if !self.services.contains(service) {
            return Err(ClientError::Service(service.to_string()));
        }

        let arg = |name: &str| arguments.get(name).cloned();

        match (service, action) {
            ("DeviceInfo:1", "GetInfo") => Ok(args([
                ("NewSerialNumber", SERIAL),
                ("NewModelName", "FRITZ!Box 7590"),
                ("NewSoftwareVersion", "154.07.29"),
                ("NewManufacturerName", "AVM"),
            ])),
            ("DeviceConfig:1", "Reboot") => Err(ClientError::Connection(
                "connection reset by peer".to_string(),
            )),
            ("Layer3Forwarding:1", "GetDefaultConnectionService") => Ok(args([(
                "NewDefaultConnectionService",
                "1.WANPPPConnection.1",
            )])),
            (_, "GetStatusInfo") => Ok(args([
                ("NewConnectionStatus", ArgValue::from("Connected")),
                ("NewUptime", ArgValue::Int(86_400)),
            ])),
            (_, "GetExternalIPAddress") => {
                Ok(args([("NewExternalIPAddress", "93.184.216.34")]))
            }
            ("WANIPConnection:1", "X_AVM_DE_GetExternalIPv6Address") => Ok(args([
                ("NewExternalIPv6Address", ArgValue::from("2003:e0:a71f:1b00::1")),
                ("NewPrefixLength", ArgValue::Int(64)),
            ])),
            (_, "GetPortMappingNumberOfEntries") => Ok(args([(
                "NewPortMappingNumberOfEntries",
                ArgValue::Int(self.port_mappings.lock().unwrap().len() as i64),
            )])),
            (_, "GetGenericPortMappingEntry") => {
                let index = arg("NewPortMappingIndex")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(-1);
                self.port_mappings
                    .lock()
                    .unwrap()
                    .get(index as usize)
                    .cloned()
                    .ok_or_else(|| ClientError::Action("SpecifiedArrayIndexInvalid".to_string()))
            }
            (_, "AddPortMapping") => {
                let mut mappings = self.port_mappings.lock().unwrap();
                let existing = mappings.iter_mut().find(|m| {
                    m.get("NewExternalPort") == arguments.get("NewExternalPort")
                        && m.get("NewProtocol") == arguments.get("NewProtocol")
                });
                match existing {
                    Some(mapping) => *mapping = arguments.clone(),
                    None => mappings.push(arguments.clone()),
                }
                Ok(Arguments::new())
            }
            ("X_AVM-DE_OnTel:1", "GetDeflections") => {
                Ok(args([("NewDeflectionList", self.deflection_list())]))
            }
            ("X_AVM-DE_OnTel:1", "SetDeflectionEnable") => {
                let id = arg("NewDeflectionId").and_then(|v| v.as_i64()).unwrap_or(-1);
                let on = arg("NewEnable").and_then(|v| v.as_flag()).unwrap_or(false);
                self.set_deflection(id as u32, on);
                Ok(Arguments::new())
            }
            (service, "GetInfo") if Self::network(service).is_some() => {
                let network = Self::network(service).unwrap_or_default();
                let on = self.wifi.lock().unwrap().get(&network).copied().unwrap_or(false);
                Ok(args([
                    ("NewEnable", ArgValue::flag(on)),
                    ("NewStatus", ArgValue::from(if on { "Up" } else { "Disabled" })),
                    ("NewSSID", ArgValue::from("FRITZ!Box Gastzugang")),
                ]))
            }
            (service, "SetEnable") if Self::network(service).is_some() => {
                let network = Self::network(service).unwrap_or_default();
                let on = arg("NewEnable").and_then(|v| v.as_flag()).unwrap_or(false);
                self.set_wifi(network, on);
                Ok(Arguments::new())
            }
            _ => Err(ClientError::Action(format!("{service}/{action}"))),
        }
    }

    fn reconnect(&self) -> ClientResult<()> {
        if let Some(err) = self.failures.lock().unwrap().get("ForceTermination") {
            return Err(err.clone());
        }
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn services(&self) -> BTreeSet<String> {
        self.services.clone()
    }
}

pub(crate) struct FakeProfiles {
    profiles: Vec<Profile>,
    devices: Mutex<Vec<ProfileDevice>>,
    fetches: AtomicUsize,
    rounds: AtomicUsize,
    fail_devices: AtomicBool,
    fail_set: AtomicBool,
    assignments: Mutex<Vec<(String, String)>>,
}

impl FakeProfiles {
    pub(crate) fn new(profiles: &[(&str, &str)], devices: &[(&str, &str, &str)]) -> Self {
        Self {
            profiles: profiles
                .iter()
                .map(|(id, name)| Profile {
                    id: id.to_string(),
                    name: name.to_string(),
                })
                .collect(),
            devices: Mutex::new(
                devices
                    .iter()
                    .map(|(name, profile, id1)| ProfileDevice {
                        name: name.to_string(),
                        profile: profile.to_string(),
                        id1: id1.to_string(),
                    })
                    .collect(),
            ),
            fetches: AtomicUsize::new(0),
            rounds: AtomicUsize::new(0),
            fail_devices: AtomicBool::new(false),
            fail_set: AtomicBool::new(false),
            assignments: Mutex::new(Vec::new()),
        }
    }

    /// Profiles "Standard" (on) and "Gesperrt" (off), a NAS that may use the
    /// internet and a tablet that may not.
    pub(crate) fn kids() -> Self {
        Self::new(
            &[("filtprof1", "Standard"), ("filtprof3", "Gesperrt")],
            &[
                ("NAS", "filtprof1", "landevice1"),
                ("tablet", "filtprof3", "landevice2"),
            ],
        )
    }

    /// Number of complete three call refreshes.
    pub(crate) fn fetch_rounds(&self) -> usize {
        self.rounds.load(Ordering::SeqCst)
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_devices(&self, fail: bool) {
        self.fail_devices.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_set(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn assignments(&self) -> Vec<(String, String)> {
        self.assignments.lock().unwrap().clone()
    }

    /// Changes an assignment behind the back of the cache.
    pub(crate) fn assign(&self, hostname: &str, profile: &str) {
        for device in self.devices.lock().unwrap().iter_mut() {
            if device.name == hostname {
                device.profile = profile.to_string();
            }
        }
    }
}

impl ProfileClient for FakeProfiles {
    fn fetch_profiles(&self) -> ClientResult<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn fetch_devices(&self) -> ClientResult<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_devices.load(Ordering::SeqCst) {
            return Err(ClientError::Connection("timed out".to_string()));
        }
        Ok(())
    }

    fn fetch_device_profiles(&self) -> ClientResult<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.rounds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn profiles(&self) -> Vec<Profile> {
        self.profiles.clone()
    }

    fn devices(&self) -> Vec<ProfileDevice> {
        self.devices.lock().unwrap().clone()
    }

    fn set_profiles(&self, assignments: &[(String, String)]) -> ClientResult<()> {
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(ClientError::Other("set_profiles rejected".to_string()));
        }
        let mut devices = self.devices.lock().unwrap();
        for (device_id, profile_id) in assignments {
            for device in devices.iter_mut().filter(|d| &d.id1 == device_id) {
                device.profile = profile_id.clone();
            }
        }
        self.assignments
            .lock()
            .unwrap()
            .extend(assignments.iter().cloned());
        Ok(())
    }
}

pub(crate) struct FakeConnector {
    router: ClientResult<Arc<FakeRouter>>,
    profiles: HashMap<String, ClientResult<Arc<FakeProfiles>>>,
    pub(crate) connects: Mutex<Vec<ConnectionParams>>,
}

impl FakeConnector {
    pub(crate) fn new(router: Arc<FakeRouter>) -> Self {
        Self {
            router: Ok(router),
            profiles: HashMap::new(),
            connects: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(err: ClientError) -> Self {
        Self {
            router: Err(err),
            profiles: HashMap::new(),
            connects: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_profiles(mut self, group: &str, profiles: Arc<FakeProfiles>) -> Self {
        self.profiles.insert(group.to_string(), Ok(profiles));
        self
    }

    pub(crate) fn with_profile_error(mut self, group: &str, err: ClientError) -> Self {
        self.profiles.insert(group.to_string(), Err(err));
        self
    }
}

impl Connector for FakeConnector {
    fn connect(&self, params: &ConnectionParams) -> ClientResult<Arc<dyn RouterClient>> {
        self.connects.lock().unwrap().push(params.clone());
        let router = self.router.clone()?;
        Ok(router)
    }

    fn connect_profiles(
        &self,
        _params: &ConnectionParams,
        group: &str,
    ) -> ClientResult<Arc<dyn ProfileClient>> {
        match self.profiles.get(group) {
            Some(Ok(profiles)) => Ok(profiles.clone()),
            Some(Err(err)) => Err(err.clone()),
            None => Err(ClientError::ProfileNotFound(group.to_string())),
        }
    }
}

/// A port forward to `client` as the router reports it.
pub(crate) fn port_mapping(
    description: &str,
    protocol: &str,
    port: i64,
    client: &str,
    enabled: ArgValue,
) -> Arguments {
    args([
        ("NewRemoteHost", ArgValue::from("0.0.0.0")),
        ("NewExternalPort", ArgValue::Int(port)),
        ("NewProtocol", ArgValue::from(protocol)),
        ("NewInternalPort", ArgValue::Int(port)),
        ("NewInternalClient", ArgValue::from(client)),
        ("NewEnabled", enabled),
        ("NewPortMappingDescription", ArgValue::from(description)),
        ("NewLeaseDuration", ArgValue::Int(0)),
    ])
}
