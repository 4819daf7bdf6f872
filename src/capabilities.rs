use std::collections::BTreeSet;

/// Router features this crate knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    /// Second 2.4 GHz radio, used as guest network on single band boxes.
    GuestWifi,
    /// Third radio, the guest network on dual band boxes.
    DualBandGuestWifi,
    CallDeflection,
    WanIpConnection,
    WanPppConnection,
    /// Lookup of the default WAN connection service.
    Layer3Forwarding,
    DeviceConfig,
    DeviceInfo,
}

/// Which advertised service name enables which capability.
const CAPABILITY_TABLE: &[(Capability, &str)] = &[
    (Capability::GuestWifi, "WLANConfiguration:2"),
    (Capability::DualBandGuestWifi, "WLANConfiguration:3"),
    (Capability::CallDeflection, "X_AVM-DE_OnTel:1"),
    (Capability::WanIpConnection, "WANIPConnection:1"),
    (Capability::WanPppConnection, "WANPPPConnection:1"),
    (Capability::Layer3Forwarding, "Layer3Forwarding:1"),
    (Capability::DeviceConfig, "DeviceConfig:1"),
    (Capability::DeviceInfo, "DeviceInfo:1"),
];

impl Capability {
    pub fn service(self) -> &'static str {
        CAPABILITY_TABLE
            .iter()
            .find(|(cap, _)| *cap == self)
            .map(|(_, service)| *service)
            .unwrap_or_default()
    }
}

/// The set of features a router advertises. Computed once per session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    services: BTreeSet<String>,
    capabilities: BTreeSet<Capability>,
}

impl CapabilitySet {
    pub fn from_services(services: BTreeSet<String>) -> Self {
        let capabilities = CAPABILITY_TABLE
            .iter()
            .filter(|(_, service)| services.contains(*service))
            .map(|(cap, _)| *cap)
            .collect();
        Self {
            services,
            capabilities,
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.services.contains(service)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities.iter().copied()
    }

    /// Index of the `WLANConfiguration` service serving the guest network.
    pub fn guest_wifi_network(&self) -> Option<u8> {
        if self.has(Capability::DualBandGuestWifi) {
            Some(3)
        } else if self.has(Capability::GuestWifi) {
            Some(2)
        } else {
            None
        }
    }

    /// WAN connection service used for the connection status.
    pub fn wan_service(&self) -> Option<&'static str> {
        [Capability::WanIpConnection, Capability::WanPppConnection]
            .into_iter()
            .find(|cap| self.has(*cap))
            .map(Capability::service)
    }
}
