//! Finds the switchable resources a router offers.

use std::collections::BTreeSet;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::capabilities::Capability;
use crate::client::{args, ArgValue, Arguments};
use crate::config::RouterConfig;
use crate::deflection::parse_deflections;
use crate::error::{Error, ErrorKind, Result};
use crate::profiles::{ProfileCache, MIN_REFRESH_INTERVAL};
use crate::resource::{Resource, ResourceKind};
use crate::session::RouterSession;

/// Problems found during discovery that the user should know about.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The session could not be established, nothing was discovered.
    SessionUnavailable(ErrorKind),
    /// These hostnames are used by several devices and get no profile switch.
    DuplicateHostnames { group: String, hostnames: Vec<String> },
    /// A configured profile name does not exist in the group.
    UnknownProfile { group: String, profile: String },
    /// `profile_on` or `profile_off` is not configured.
    MissingProfile { group: String, setting: &'static str },
    /// Listing resources of one kind failed, the other kinds are unaffected.
    DiscoveryFailed { kind: ResourceKind, error: Error },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::SessionUnavailable(kind) => write!(f, "session unavailable: {kind}"),
            Diagnostic::DuplicateHostnames { group, hostnames } => write!(
                f,
                "devices in profile group {group} share hostnames, no profile switches for: {}",
                hostnames.join(", ")
            ),
            Diagnostic::UnknownProfile { group, profile } => {
                write!(f, "profile {profile:?} does not exist in group {group}")
            }
            Diagnostic::MissingProfile { group, setting } => {
                write!(f, "{setting} is not configured for group {group}")
            }
            Diagnostic::DiscoveryFailed { kind, error } => {
                write!(f, "cannot list {kind}s: {error}")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discovery {
    pub resources: Vec<Resource>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Discovery {
    fn collect(&mut self, kind: ResourceKind, found: Result<Vec<Resource>>) {
        match found {
            Ok(resources) => {
                debug!("found {} {kind}s", resources.len());
                self.resources.extend(resources);
            }
            Err(error) => {
                error!("cannot list {kind}s: {error}");
                self.diagnostics
                    .push(Diagnostic::DiscoveryFailed { kind, error });
            }
        }
    }
}

/// Lists the resources `config` asks for and the router supports.
pub fn discover(session: &RouterSession, config: &RouterConfig, now: DateTime<Utc>) -> Discovery {
    let mut discovery = Discovery::default();

    if let (false, reason) = session.health_status() {
        let kind = reason.unwrap_or(ErrorKind::Connection);
        warn!("not discovering resources of {}: {kind}", session.host());
        discovery.diagnostics.push(Diagnostic::SessionUnavailable(kind));
        return discovery;
    }

    if config.use_wifi {
        discovery.collect(ResourceKind::WifiRadio, Ok(guest_wifi(session)));
    }
    if config.use_port {
        discovery.collect(
            ResourceKind::PortMapping,
            port_mappings(session, config.local_ip),
        );
    }
    if config.use_deflections {
        discovery.collect(ResourceKind::CallDeflection, deflections(session));
    }
    if config.profiles_enabled() {
        for cache in session.profile_caches() {
            let found = profile_assignments(cache, config, now, &mut discovery.diagnostics);
            discovery.collect(ResourceKind::ProfileAssignment, found);
        }
    }

    info!(
        "discovered {} resources on {}",
        discovery.resources.len(),
        session.host()
    );
    discovery
}

fn guest_wifi(session: &RouterSession) -> Vec<Resource> {
    session
        .capabilities()
        .guest_wifi_network()
        .map(Resource::wifi_radio)
        .into_iter()
        .collect()
}

/// The WAN service port forwards live on, e.g. `WANPPPConnection:1`.
fn connection_service(session: &RouterSession) -> Result<String> {
    lazy_static! {
        // e.g. "1.WANPPPConnection.1"
        static ref RE: Regex = Regex::new(r"^\d+\.(\w+)\.(\d+)$").unwrap();
    }
    let capabilities = session.capabilities();
    if capabilities.has(Capability::Layer3Forwarding) {
        let default = session.call_action(
            Capability::Layer3Forwarding.service(),
            "GetDefaultConnectionService",
            &Arguments::new(),
        )?;
        let service = default
            .get("NewDefaultConnectionService")
            .and_then(ArgValue::as_str)
            .unwrap_or_default();
        if let Some(caps) = RE.captures(service) {
            return Ok(format!("{}:{}", &caps[1], &caps[2]));
        }
        debug!("cannot make sense of default connection service {service:?}");
    }
    capabilities
        .wan_service()
        .map(str::to_string)
        .ok_or_else(|| Error::Protocol("router has no WAN connection service".to_string()))
}

fn port_mappings(session: &RouterSession, local_ip: Option<IpAddr>) -> Result<Vec<Resource>> {
    let Some(local_ip) = local_ip else {
        warn!("local_ip is not configured, not looking for port forwards");
        return Ok(Vec::new());
    };
    let local_ip = local_ip.to_string();
    let service = connection_service(session)?;

    let count = session
        .call_action(&service, "GetPortMappingNumberOfEntries", &Arguments::new())?
        .get("NewPortMappingNumberOfEntries")
        .and_then(ArgValue::as_i64)
        .unwrap_or_default();

    let mut resources = Vec::new();
    for index in 0..u32::try_from(count).unwrap_or_default() {
        let mapping = session.call_action(
            &service,
            "GetGenericPortMappingEntry",
            &args([("NewPortMappingIndex", index)]),
        )?;
        let client = mapping.get("NewInternalClient").and_then(ArgValue::as_str);
        if client == Some(local_ip.as_str()) {
            resources.push(Resource::port_mapping(&service, index, mapping));
        }
    }
    Ok(resources)
}

fn deflections(session: &RouterSession) -> Result<Vec<Resource>> {
    if !session.capabilities().has(Capability::CallDeflection) {
        return Ok(Vec::new());
    }
    let response = session.call_action(
        Capability::CallDeflection.service(),
        "GetDeflections",
        &Arguments::new(),
    )?;
    let list = response
        .get("NewDeflectionList")
        .and_then(ArgValue::as_str)
        .unwrap_or_default();
    if list.is_empty() {
        return Ok(Vec::new());
    }
    Ok(parse_deflections(list)?
        .iter()
        .map(Resource::call_deflection)
        .collect())
}

fn profile_assignments(
    cache: &ProfileCache,
    config: &RouterConfig,
    now: DateTime<Utc>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Vec<Resource>> {
    let group = cache.group();
    cache.refresh_if_stale(now, MIN_REFRESH_INTERVAL)?;
    let snapshot = cache.snapshot();

    let duplicates = snapshot.duplicate_hostnames();
    if !duplicates.is_empty() {
        error!(
            "devices in profile group {group} share hostnames {duplicates:?}, \
             rename them on the router to get a profile switch"
        );
        diagnostics.push(Diagnostic::DuplicateHostnames {
            group: group.to_string(),
            hostnames: duplicates.clone(),
        });
    }
    let duplicates: BTreeSet<String> = duplicates.into_iter().collect();

    let mut lookup = |setting: &'static str, name: &Option<String>| match name {
        None => {
            diagnostics.push(Diagnostic::MissingProfile {
                group: group.to_string(),
                setting,
            });
            None
        }
        Some(name) => {
            let id = snapshot.profile_id(name);
            if id.is_none() {
                error!("{setting} {name:?} does not exist in profile group {group}");
                diagnostics.push(Diagnostic::UnknownProfile {
                    group: group.to_string(),
                    profile: name.clone(),
                });
            }
            id
        }
    };
    let on = lookup("profile_on", &config.profile_on);
    let off = lookup("profile_off", &config.profile_off);

    Ok(snapshot
        .devices
        .iter()
        .filter(|device| !duplicates.contains(&device.name))
        .filter(|device| config.allows_device(&device.name))
        .map(|device| Resource::profile_assignment(group, device, on, off))
        .collect())
}
