use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::client::{args, ArgValue, Arguments, ProfileDevice};
use crate::deflection::Deflection;
use crate::error::Error;

/// The four categories of switchable router features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    WifiRadio = 0,
    PortMapping = 1,
    CallDeflection = 2,
    ProfileAssignment = 3,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::WifiRadio => write!(f, "wifi radio"),
            ResourceKind::PortMapping => write!(f, "port mapping"),
            ResourceKind::CallDeflection => write!(f, "call deflection"),
            ResourceKind::ProfileAssignment => write!(f, "profile assignment"),
        }
    }
}

/// Stable identity of a switchable resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKey {
    /// `WLANConfiguration:<network>`.
    WifiRadio { network: u8 },
    /// Entry `index` of the port mapping table of `service`. The router may
    /// reorder its table, which goes unnoticed: the index is all there is to
    /// address an entry.
    PortMapping {
        service: String,
        index: u32,
        protocol: String,
        external_port: i64,
    },
    CallDeflection { id: u32 },
    ProfileAssignment { group: String, hostname: String },
}

impl ResourceKey {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceKey::WifiRadio { .. } => ResourceKind::WifiRadio,
            ResourceKey::PortMapping { .. } => ResourceKind::PortMapping,
            ResourceKey::CallDeflection { .. } => ResourceKind::CallDeflection,
            ResourceKey::ProfileAssignment { .. } => ResourceKind::ProfileAssignment,
        }
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKey::WifiRadio { network } => write!(f, "wifi-{network}"),
            ResourceKey::PortMapping {
                index,
                protocol,
                external_port,
                ..
            } => write!(f, "portmapping-{index}-{protocol}-{external_port}"),
            ResourceKey::CallDeflection { id } => write!(f, "deflection-{id}"),
            ResourceKey::ProfileAssignment { group, hostname } => {
                write!(f, "profile-{group}-{hostname}")
            }
        }
    }
}

// keys of the details of a profile assignment
pub(crate) const DEVICE_ID: &str = "device_id";
pub(crate) const PROFILE: &str = "profile";
pub(crate) const PROFILE_ON: &str = "profile_on";
pub(crate) const PROFILE_OFF: &str = "profile_off";

/// A discovered switchable resource, before it is handed to the
/// [`crate::ToggleCoordinator`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub key: ResourceKey,
    pub name: String,
    /// Hub entity id, e.g. `switch.fritzbox_guestwifi`.
    pub entity_id: String,
    pub icon: &'static str,
    pub initial_state: bool,
    /// Kind specific data the read and write actions need: the complete port
    /// mapping, the profile ids of a profile assignment.
    pub details: Arguments,
    /// Set if the resource can never work, e.g. because a configured profile
    /// does not exist.
    pub unusable: Option<Error>,
}

impl Resource {
    pub fn wifi_radio(network: u8) -> Self {
        Self {
            key: ResourceKey::WifiRadio { network },
            name: "FRITZ!Box Guest Wifi".to_string(),
            entity_id: "switch.fritzbox_guestwifi".to_string(),
            icon: "mdi:wifi",
            initial_state: false,
            details: Arguments::new(),
            unusable: None,
        }
    }

    pub fn port_mapping(service: impl ToString, index: u32, mapping: Arguments) -> Self {
        let field = |name: &str| mapping.get(name).map(|v| v.to_string()).unwrap_or_default();
        let description = field("NewPortMappingDescription");
        Self {
            key: ResourceKey::PortMapping {
                service: service.to_string(),
                index,
                protocol: field("NewProtocol"),
                external_port: mapping
                    .get("NewExternalPort")
                    .and_then(ArgValue::as_i64)
                    .unwrap_or_default(),
            },
            name: format!("Port forward {description}"),
            entity_id: format!("switch.fritzbox_portforward_{}", slugify(&description)),
            icon: "mdi:lan",
            initial_state: mapping
                .get("NewEnabled")
                .and_then(ArgValue::as_flag)
                .unwrap_or(false),
            details: mapping,
            unusable: None,
        }
    }

    pub fn call_deflection(deflection: &Deflection) -> Self {
        Self {
            key: ResourceKey::CallDeflection { id: deflection.id },
            name: format!("Call deflection {}", deflection.id),
            entity_id: format!("switch.fritzbox_deflection_{}", deflection.id),
            icon: "mdi:phone-forward",
            initial_state: deflection.is_enabled(),
            details: deflection_details(deflection),
            unusable: None,
        }
    }

    /// A device's profile assignment. `profile_on` and `profile_off` are
    /// profile ids; if either is unknown the resource is unusable.
    pub fn profile_assignment(
        group: impl ToString,
        device: &ProfileDevice,
        profile_on: Option<&str>,
        profile_off: Option<&str>,
    ) -> Self {
        let mut details = args([
            (DEVICE_ID, device.id1.as_str()),
            (PROFILE, device.profile.as_str()),
        ]);
        if let Some(on) = profile_on {
            details.insert(PROFILE_ON.to_string(), on.into());
        }
        if let Some(off) = profile_off {
            details.insert(PROFILE_OFF.to_string(), off.into());
        }
        let unusable = match (profile_on, profile_off) {
            (Some(_), Some(_)) => None,
            (None, _) => Some(Error::ProfileNotFound(PROFILE_ON.to_string())),
            (_, None) => Some(Error::ProfileNotFound(PROFILE_OFF.to_string())),
        };
        Self {
            key: ResourceKey::ProfileAssignment {
                group: group.to_string(),
                hostname: device.name.clone(),
            },
            name: format!("Device Profile {}", device.name),
            entity_id: format!(
                "switch.{}",
                slugify(&format!("fritzbox_profile_{}", device.name))
            ),
            icon: "mdi:lan",
            initial_state: profile_off.map_or(false, |off| device.profile != off),
            details,
            unusable,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.key.kind()
    }
}

pub(crate) fn deflection_details(deflection: &Deflection) -> Arguments {
    args([
        ("Type", deflection.kind.as_str()),
        ("Number", deflection.number.as_str()),
        ("DeflectionToNumber", deflection.deflection_to_number.as_str()),
        ("Mode", deflection.mode.as_str()),
    ])
}

/// State attributes a hub entity shows for a resource.
pub fn attributes(kind: ResourceKind, details: &Arguments) -> BTreeMap<String, String> {
    let pick: &[(&str, &str)] = match kind {
        ResourceKind::WifiRadio => &[("ssid", "NewSSID")],
        ResourceKind::PortMapping => &[
            ("internalIP", "NewInternalClient"),
            ("internalPort", "NewInternalPort"),
            ("externalPort", "NewExternalPort"),
            ("protocol", "NewProtocol"),
            ("description", "NewPortMappingDescription"),
        ],
        ResourceKind::CallDeflection => &[
            ("type", "Type"),
            ("number", "Number"),
            ("deflectionToNumber", "DeflectionToNumber"),
            ("mode", "Mode"),
        ],
        ResourceKind::ProfileAssignment => &[("profile", PROFILE)],
    };
    pick.iter()
        .filter_map(|(attr, field)| Some((attr.to_string(), details.get(*field)?.to_string())))
        .collect()
}

/// Lowercase, everything but ascii letters and digits replaced by `_`.
pub fn slugify(s: &str) -> String {
    lazy_static! {
        static ref RE: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
    }
    RE.replace_all(&s.to_lowercase(), "_")
        .trim_matches('_')
        .to_string()
}
