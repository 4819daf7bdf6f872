//! Debounced read-modify-write access to switchable router resources.
//!
//! Every resource runs the same small state machine:
//!
//! * `Settled`: polls read the router.
//! * `Cooldown`: entered after a successful write. Polls return the written
//!   value without asking the router, which takes a while to report the new
//!   state. Ends once the grace period of the resource kind has passed.
//! * `Failed`: the last read or write failed. The resource is unavailable
//!   and keeps its last good value until an operation succeeds again.
//!
//! The kinds only differ in which actions they call, see [`KIND_TABLE`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::client::{args, ArgValue, Arguments};
use crate::clock::Clock;
use crate::deflection::parse_deflections;
use crate::error::{Error, ErrorKind, Result};
use crate::profiles::MIN_REFRESH_INTERVAL;
use crate::resource::{
    deflection_details, Resource, ResourceKey, ResourceKind, DEVICE_ID, PROFILE, PROFILE_OFF,
    PROFILE_ON,
};
use crate::session::RouterSession;

const ONTEL: &str = "X_AVM-DE_OnTel:1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    Settled,
    Cooldown { until: DateTime<Utc> },
    Failed(ErrorKind),
}

/// Snapshot of what the coordinator knows about a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceStatus {
    pub state: ToggleState,
    pub is_on: bool,
    pub available: bool,
    pub last_toggle: Option<DateTime<Utc>>,
    pub details: Arguments,
}

struct Reading {
    on: bool,
    details: Arguments,
}

type ReadFn = fn(&RouterSession, &ResourceKey, &Arguments, DateTime<Utc>) -> Result<Reading>;
type WriteFn = fn(&RouterSession, &ResourceKey, &Arguments, bool) -> Result<Arguments>;

struct KindSpec {
    kind: ResourceKind,
    grace_period_secs: i64,
    read: ReadFn,
    write: WriteFn,
}

/// Read and write actions per resource kind, indexed by the kind's
/// discriminant.
static KIND_TABLE: [KindSpec; 4] = [
    KindSpec {
        kind: ResourceKind::WifiRadio,
        grace_period_secs: 5,
        read: read_wifi,
        write: write_wifi,
    },
    KindSpec {
        kind: ResourceKind::PortMapping,
        grace_period_secs: 5,
        read: read_port_mapping,
        write: write_port_mapping,
    },
    KindSpec {
        kind: ResourceKind::CallDeflection,
        grace_period_secs: 5,
        read: read_deflection,
        write: write_deflection,
    },
    // the profile store of the router takes long to reflect changes
    KindSpec {
        kind: ResourceKind::ProfileAssignment,
        grace_period_secs: 30,
        read: read_profile,
        write: write_profile,
    },
];

fn kind_spec(kind: ResourceKind) -> &'static KindSpec {
    let spec = &KIND_TABLE[kind as usize];
    debug_assert_eq!(spec.kind, kind);
    spec
}

pub fn grace_period(kind: ResourceKind) -> Duration {
    Duration::seconds(kind_spec(kind).grace_period_secs)
}

struct Entry {
    is_on: bool,
    state: ToggleState,
    last_toggle: Option<DateTime<Utc>>,
    details: Arguments,
    unusable: Option<Error>,
}

impl Entry {
    fn status(&self) -> ResourceStatus {
        ResourceStatus {
            state: self.state,
            is_on: self.is_on,
            available: self.unusable.is_none() && !matches!(self.state, ToggleState::Failed(_)),
            last_toggle: self.last_toggle,
            details: self.details.clone(),
        }
    }

    fn settle_if_expired(&mut self, now: DateTime<Utc>) {
        if let ToggleState::Cooldown { until } = self.state {
            if now >= until {
                self.state = ToggleState::Settled;
            }
        }
    }
}

/// Arbitrates polls and writes of all resources of one router session.
///
/// Router calls are made without holding any lock, so the methods block for
/// as long as the router takes to answer. Run them on an
/// [`crate::Executor`].
pub struct ToggleCoordinator {
    session: Arc<RouterSession>,
    clock: Arc<dyn Clock>,
    entries: Mutex<BTreeMap<ResourceKey, Entry>>,
}

impl ToggleCoordinator {
    pub fn new(session: Arc<RouterSession>, clock: Arc<dyn Clock>) -> Self {
        Self {
            session,
            clock,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn session(&self) -> &Arc<RouterSession> {
        &self.session
    }

    /// Starts tracking `resource`. Registering a key again is a no-op.
    pub fn register(&self, resource: &Resource) {
        if let Some(err) = &resource.unusable {
            warn!("{} ({}) will be unavailable: {err}", resource.name, resource.key);
        }
        self.entries()
            .entry(resource.key.clone())
            .or_insert_with(|| Entry {
                is_on: resource.initial_state,
                state: ToggleState::Settled,
                last_toggle: None,
                details: resource.details.clone(),
                unusable: resource.unusable.clone(),
            });
    }

    pub fn status(&self, key: &ResourceKey) -> Option<ResourceStatus> {
        let now = self.clock.now();
        let mut entries = self.entries();
        let entry = entries.get_mut(key)?;
        entry.settle_if_expired(now);
        Some(entry.status())
    }

    /// Returns the current state of `key`, reading it from the router unless
    /// the resource is cooling down after a write.
    pub fn poll(&self, key: &ResourceKey) -> Result<bool> {
        let now = self.clock.now();
        let details = {
            let mut entries = self.entries();
            let entry = entries.get_mut(key).ok_or_else(|| unknown(key))?;
            if let Some(err) = &entry.unusable {
                return Err(err.clone());
            }
            if let ToggleState::Cooldown { until } = entry.state {
                if now < until {
                    debug!(
                        "not polling {key}, toggled less than {}s ago",
                        kind_spec(key.kind()).grace_period_secs
                    );
                    return Ok(entry.is_on);
                }
            }
            entry.settle_if_expired(now);
            entry.details.clone()
        };

        debug!("polling {key}");
        let reading = (kind_spec(key.kind()).read)(&self.session, key, &details, now);

        let mut entries = self.entries();
        let entry = entries.get_mut(key).ok_or_else(|| unknown(key))?;
        if let ToggleState::Cooldown { .. } = entry.state {
            debug!("{key} was toggled while polling, keeping {}", entry.is_on);
            return Ok(entry.is_on);
        }
        match reading {
            Ok(reading) => {
                entry.is_on = reading.on;
                entry.details = reading.details;
                entry.state = ToggleState::Settled;
                Ok(reading.on)
            }
            Err(err) => {
                error!("cannot get state of {key}: {err}");
                entry.state = ToggleState::Failed(err.kind());
                Err(err)
            }
        }
    }

    /// Switches `key` on or off. Every call issues a write, nothing is
    /// coalesced.
    pub fn apply(&self, key: &ResourceKey, on: bool) -> Result<()> {
        let details = {
            let entries = self.entries();
            let entry = entries.get(key).ok_or_else(|| unknown(key))?;
            if let Some(err) = &entry.unusable {
                return Err(err.clone());
            }
            entry.details.clone()
        };

        let spec = kind_spec(key.kind());
        debug!("turning {key} {}", if on { "on" } else { "off" });
        let written = (spec.write)(&self.session, key, &details, on);

        let now = self.clock.now();
        let mut entries = self.entries();
        let entry = entries.get_mut(key).ok_or_else(|| unknown(key))?;
        match written {
            Ok(details) => {
                entry.is_on = on;
                entry.details = details;
                entry.last_toggle = Some(now);
                entry.state = ToggleState::Cooldown {
                    until: now + Duration::seconds(spec.grace_period_secs),
                };
                Ok(())
            }
            Err(err) => {
                error!("cannot switch {key}: {err}");
                entry.state = ToggleState::Failed(err.kind());
                Err(err)
            }
        }
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<ResourceKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ToggleCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToggleCoordinator")
            .field("host", &self.session.host())
            .finish()
    }
}

fn unknown(key: &ResourceKey) -> Error {
    Error::Protocol(format!("{key} is not registered"))
}

fn mismatch(key: &ResourceKey, expected: ResourceKind) -> Error {
    Error::Protocol(format!("{key} is not a {expected}"))
}

fn missing(key: &ResourceKey, field: &str) -> Error {
    Error::Protocol(format!("router did not report {field} for {key}"))
}

// -=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-
// wifi radios

fn wlan_service(network: u8) -> String {
    format!("WLANConfiguration:{network}")
}

fn read_wifi(
    session: &RouterSession,
    key: &ResourceKey,
    _details: &Arguments,
    _now: DateTime<Utc>,
) -> Result<Reading> {
    let ResourceKey::WifiRadio { network } = key else {
        return Err(mismatch(key, ResourceKind::WifiRadio));
    };
    let info = session.call_action(&wlan_service(*network), "GetInfo", &Arguments::new())?;
    let status = info
        .get("NewStatus")
        .and_then(ArgValue::as_str)
        .ok_or_else(|| missing(key, "NewStatus"))?;
    Ok(Reading {
        on: status == "Up",
        details: info
            .get("NewSSID")
            .map(|ssid| args([("NewSSID", ssid.clone())]))
            .unwrap_or_default(),
    })
}

fn write_wifi(
    session: &RouterSession,
    key: &ResourceKey,
    details: &Arguments,
    on: bool,
) -> Result<Arguments> {
    let ResourceKey::WifiRadio { network } = key else {
        return Err(mismatch(key, ResourceKind::WifiRadio));
    };
    session.call_action(
        &wlan_service(*network),
        "SetEnable",
        &args([("NewEnable", ArgValue::flag(on))]),
    )?;
    Ok(details.clone())
}

// -=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-
// port mappings

fn read_port_mapping(
    session: &RouterSession,
    key: &ResourceKey,
    _details: &Arguments,
    _now: DateTime<Utc>,
) -> Result<Reading> {
    let ResourceKey::PortMapping { service, index, .. } = key else {
        return Err(mismatch(key, ResourceKind::PortMapping));
    };
    let mapping = session.call_action(
        service,
        "GetGenericPortMappingEntry",
        &args([("NewPortMappingIndex", *index)]),
    )?;
    let on = mapping
        .get("NewEnabled")
        .and_then(ArgValue::as_flag)
        .ok_or_else(|| missing(key, "NewEnabled"))?;
    Ok(Reading {
        on,
        details: mapping,
    })
}

/// Re-adds the mapping with all its fields, only the enabled flag changes.
fn write_port_mapping(
    session: &RouterSession,
    key: &ResourceKey,
    details: &Arguments,
    on: bool,
) -> Result<Arguments> {
    let ResourceKey::PortMapping { service, .. } = key else {
        return Err(mismatch(key, ResourceKind::PortMapping));
    };
    if !details.contains_key("NewExternalPort") {
        return Err(missing(key, "NewExternalPort"));
    }
    let mut mapping = details.clone();
    let enabled = mapping
        .get("NewEnabled")
        .map(|current| current.with_flag(on))
        .unwrap_or_else(|| ArgValue::flag(on));
    mapping.insert("NewEnabled".to_string(), enabled);
    session.call_action(service, "AddPortMapping", &mapping)?;
    Ok(mapping)
}

// -=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-
// call deflections

fn read_deflection(
    session: &RouterSession,
    key: &ResourceKey,
    _details: &Arguments,
    _now: DateTime<Utc>,
) -> Result<Reading> {
    let ResourceKey::CallDeflection { id } = key else {
        return Err(mismatch(key, ResourceKind::CallDeflection));
    };
    let response = session.call_action(ONTEL, "GetDeflections", &Arguments::new())?;
    let list = response
        .get("NewDeflectionList")
        .and_then(ArgValue::as_str)
        .ok_or_else(|| missing(key, "NewDeflectionList"))?;
    let deflection = parse_deflections(list)?
        .into_iter()
        .find(|d| d.id == *id)
        .ok_or_else(|| Error::Protocol(format!("{key} no longer exists")))?;
    Ok(Reading {
        on: deflection.is_enabled(),
        details: deflection_details(&deflection),
    })
}

fn write_deflection(
    session: &RouterSession,
    key: &ResourceKey,
    details: &Arguments,
    on: bool,
) -> Result<Arguments> {
    let ResourceKey::CallDeflection { id } = key else {
        return Err(mismatch(key, ResourceKind::CallDeflection));
    };
    session.call_action(
        ONTEL,
        "SetDeflectionEnable",
        &args([
            ("NewDeflectionId", ArgValue::from(*id)),
            ("NewEnable", ArgValue::flag(on)),
        ]),
    )?;
    Ok(details.clone())
}

// -=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-
// profile assignments

fn detail<'a>(key: &ResourceKey, details: &'a Arguments, field: &str) -> Result<&'a str> {
    details
        .get(field)
        .and_then(ArgValue::as_str)
        .ok_or_else(|| Error::ProfileNotFound(format!("{field} of {key}")))
}

fn read_profile(
    session: &RouterSession,
    key: &ResourceKey,
    details: &Arguments,
    now: DateTime<Utc>,
) -> Result<Reading> {
    let ResourceKey::ProfileAssignment { group, hostname } = key else {
        return Err(mismatch(key, ResourceKind::ProfileAssignment));
    };
    let cache = session.profile_cache(group)?;
    cache.refresh_if_stale(now, MIN_REFRESH_INTERVAL)?;
    let snapshot = cache.snapshot();
    let device = snapshot
        .device(hostname)
        .ok_or_else(|| Error::Protocol(format!("device {hostname:?} is gone")))?;

    let off = detail(key, details, PROFILE_OFF)?;
    let mut details = details.clone();
    details.insert(DEVICE_ID.to_string(), device.id1.as_str().into());
    details.insert(PROFILE.to_string(), device.profile.as_str().into());
    Ok(Reading {
        on: device.profile != off,
        details,
    })
}

fn write_profile(
    session: &RouterSession,
    key: &ResourceKey,
    details: &Arguments,
    on: bool,
) -> Result<Arguments> {
    let ResourceKey::ProfileAssignment { group, .. } = key else {
        return Err(mismatch(key, ResourceKind::ProfileAssignment));
    };
    let cache = session.profile_cache(group)?;
    let device_id = detail(key, details, DEVICE_ID)?;
    let target = detail(key, details, if on { PROFILE_ON } else { PROFILE_OFF })?;
    cache
        .client()
        .set_profiles(&[(device_id.to_string(), target.to_string())])?;

    let mut details = details.clone();
    details.insert(PROFILE.to_string(), target.into());
    Ok(details)
}
