use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::capabilities::{Capability, CapabilitySet};
use crate::client::{Arguments, ConnectionParams, Connector, RouterClient};
use crate::error::{ClientError, Error, ErrorKind, Result};
use crate::profiles::ProfileCache;

pub const MANUFACTURER: &str = "AVM";

const DEVICE_INFO: &str = "DeviceInfo:1";
const DEVICE_CONFIG: &str = "DeviceConfig:1";

/// Identity of the router. The serial number is the stable id every entity
/// id is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterIdentity {
    pub serial_number: String,
    pub model_name: String,
    pub software_version: String,
    pub manufacturer: &'static str,
}

impl RouterIdentity {
    /// Model without the product family, e.g. `7590`.
    pub fn short_model(&self) -> &str {
        self.model_name
            .strip_prefix("FRITZ!Box ")
            .unwrap_or(&self.model_name)
    }
}

/// Last known state of the WAN connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionHealth {
    pub connected: bool,
    pub last_error: Option<ErrorKind>,
    pub external_ip: Option<String>,
    pub external_ipv6: Option<String>,
    /// Seconds since the connection was established.
    pub uptime: Option<i64>,
}

/// The one authenticated connection to a router, shared by all resources.
///
/// Construction performs blocking I/O. Establishment failures are kept and
/// reported through [`RouterSession::health_status`], they are not returned.
pub struct RouterSession {
    params: ConnectionParams,
    client: Option<Arc<dyn RouterClient>>,
    profiles: BTreeMap<String, Arc<ProfileCache>>,
    failure: Option<Error>,
    identity: OnceLock<RouterIdentity>,
    capabilities: OnceLock<CapabilitySet>,
    connection: Mutex<ConnectionHealth>,
}

impl RouterSession {
    pub fn initialize(
        connector: &dyn Connector,
        params: ConnectionParams,
        profile_groups: &[String],
    ) -> Self {
        let mut session = Self {
            params,
            client: None,
            profiles: BTreeMap::new(),
            failure: None,
            identity: OnceLock::new(),
            capabilities: OnceLock::new(),
            connection: Mutex::new(ConnectionHealth::default()),
        };

        match session.establish(connector, profile_groups) {
            Ok(identity) => info!(
                "connected to {} ({}) at {}",
                identity.model_name, identity.serial_number, session.params.host
            ),
            Err(err) => {
                error!("cannot set up session to {}: {err}", session.params.host);
                session.client = None;
                session.profiles.clear();
                session.failure = Some(err);
            }
        }
        session
    }

    fn establish(
        &mut self,
        connector: &dyn Connector,
        profile_groups: &[String],
    ) -> Result<RouterIdentity> {
        debug!(
            "connecting to {}:{} (timeout {})",
            self.params.host,
            self.params.port,
            crate::duration::duration_pretty(self.params.timeout)
        );
        self.client = Some(connector.connect(&self.params)?);

        for group in profile_groups {
            let client = connector.connect_profiles(&self.params, group)?;
            self.profiles
                .insert(group.clone(), Arc::new(ProfileCache::new(group, client)));
        }

        let identity = self.identity()?.clone();
        let capabilities = self.capabilities();
        debug!(
            "{} advertises {:?}",
            identity.serial_number,
            capabilities.iter().collect::<Vec<_>>()
        );
        Ok(identity)
    }

    /// `(true, None)` if the session is usable, otherwise the reason it is
    /// not.
    pub fn health_status(&self) -> (bool, Option<ErrorKind>) {
        (
            self.failure.is_none(),
            self.failure.as_ref().map(Error::kind),
        )
    }

    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn host(&self) -> &str {
        &self.params.host
    }

    fn client(&self) -> Result<&Arc<dyn RouterClient>> {
        match (&self.client, &self.failure) {
            (Some(client), None) => Ok(client),
            (_, Some(err)) => Err(err.clone()),
            (None, None) => Err(Error::Connection("session not established".to_string())),
        }
    }

    /// Calls a router action. Every client error is translated here.
    pub fn call_action(&self, service: &str, action: &str, args: &Arguments) -> Result<Arguments> {
        let client = self.client()?;
        client.call_action(service, action, args).map_err(|err| {
            debug!("{service}/{action} failed: {err}");
            Error::from(err)
        })
    }

    pub fn identity(&self) -> Result<&RouterIdentity> {
        if let Some(identity) = self.identity.get() {
            return Ok(identity);
        }
        let info = self.call_action(DEVICE_INFO, "GetInfo", &Arguments::new())?;
        let field = |name: &str| info.get(name).map(|v| v.to_string()).unwrap_or_default();
        let serial_number = field("NewSerialNumber");
        if serial_number.is_empty() {
            return Err(Error::Protocol("router reported no serial number".to_string()));
        }
        let identity = RouterIdentity {
            serial_number,
            model_name: field("NewModelName"),
            software_version: field("NewSoftwareVersion"),
            manufacturer: MANUFACTURER,
        };
        Ok(self.identity.get_or_init(|| identity))
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        self.capabilities.get_or_init(|| match self.client() {
            Ok(client) => CapabilitySet::from_services(client.services()),
            Err(_) => CapabilitySet::default(),
        })
    }

    pub fn profile_cache(&self, group: &str) -> Result<&Arc<ProfileCache>> {
        self.client()?;
        self.profiles
            .get(group)
            .ok_or_else(|| Error::ProfileNotFound(group.to_string()))
    }

    pub fn profile_caches(&self) -> impl Iterator<Item = &Arc<ProfileCache>> {
        self.profiles.values()
    }

    /// Makes the router establish a new WAN connection.
    pub fn reconnect(&self) -> Result<()> {
        info!("reconnecting {}", self.params.host);
        self.client()?.reconnect().map_err(Error::from)
    }

    /// Reboots the router. The router drops the connection while answering,
    /// which counts as success.
    pub fn reboot(&self) -> Result<()> {
        info!("rebooting {}", self.params.host);
        match self
            .client()?
            .call_action(DEVICE_CONFIG, "Reboot", &Arguments::new())
        {
            Ok(_) => Ok(()),
            Err(ClientError::Connection(reason)) => {
                debug!("connection dropped during reboot: {reason}");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn connection_health(&self) -> ConnectionHealth {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Queries the WAN connection status and updates [`ConnectionHealth`].
    pub fn poll_connection(&self) -> Result<ConnectionHealth> {
        let result = self.fetch_connection();
        let mut health = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(fresh) => {
                *health = fresh;
                Ok(health.clone())
            }
            Err(err) => {
                error!("cannot get the connection state of {}: {err}", self.params.host);
                health.last_error = Some(err.kind());
                Err(err)
            }
        }
    }

    fn fetch_connection(&self) -> Result<ConnectionHealth> {
        let wan = self
            .capabilities()
            .wan_service()
            .ok_or_else(|| Error::Protocol("router has no WAN connection service".to_string()))?;
        let status = self.call_action(wan, "GetStatusInfo", &Arguments::new())?;
        let address = self.call_action(wan, "GetExternalIPAddress", &Arguments::new())?;
        let external_ipv6 = if self.capabilities().has(Capability::WanIpConnection) {
            match self.call_action(
                Capability::WanIpConnection.service(),
                "X_AVM_DE_GetExternalIPv6Address",
                &Arguments::new(),
            ) {
                Ok(v6) => v6
                    .get("NewExternalIPv6Address")
                    .map(|v| v.to_string())
                    .filter(|ip| !ip.is_empty()),
                Err(err) => {
                    debug!("no IPv6 address for {}: {err}", self.params.host);
                    None
                }
            }
        } else {
            None
        };
        Ok(ConnectionHealth {
            connected: status
                .get("NewConnectionStatus")
                .and_then(|v| v.as_str())
                .map(|s| s == "Connected")
                .unwrap_or(false),
            last_error: None,
            external_ip: address
                .get("NewExternalIPAddress")
                .map(|v| v.to_string()),
            external_ipv6,
            uptime: status.get("NewUptime").and_then(|v| v.as_i64()),
        })
    }
}

impl std::fmt::Debug for RouterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterSession")
            .field("host", &self.params.host)
            .field("failure", &self.failure)
            .field("identity", &self.identity.get())
            .field("profiles", &self.profiles.keys().collect::<Vec<_>>())
            .finish()
    }
}
