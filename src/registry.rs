use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::ServiceError;
use crate::session::RouterSession;

/// Services the integration offers to the hub. Both take the host of the
/// router they act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Reconnect,
    Reboot,
}

impl Service {
    pub fn name(self) -> &'static str {
        match self {
            Service::Reconnect => "reconnect",
            Service::Reboot => "reboot",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [Service::Reconnect, Service::Reboot]
            .into_iter()
            .find(|service| service.name() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCall {
    pub service: Service,
    pub host: String,
}

/// The sessions of all configured routers, keyed by config entry id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<BTreeMap<String, Arc<RouterSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session previously stored under `entry_id`, if any.
    pub fn insert(
        &self,
        entry_id: impl ToString,
        session: Arc<RouterSession>,
    ) -> Option<Arc<RouterSession>> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry_id.to_string(), session)
    }

    pub fn remove(&self, entry_id: &str) -> Option<Arc<RouterSession>> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(entry_id)
    }

    pub fn get(&self, entry_id: &str) -> Option<Arc<RouterSession>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entry_id)
            .cloned()
    }

    pub fn by_host(&self, host: &str) -> Option<Arc<RouterSession>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|session| session.host().eq_ignore_ascii_case(host))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs a service call. Blocks while the router is busy.
    pub fn call_service(&self, call: &ServiceCall) -> Result<(), ServiceError> {
        let service = call.service.name();
        let Some(session) = self.by_host(&call.host) else {
            error!("{service}: no configured router for host {:?}", call.host);
            return Err(ServiceError::UnknownHost {
                service,
                host: call.host.clone(),
            });
        };
        let result = match call.service {
            Service::Reconnect => session.reconnect(),
            Service::Reboot => session.reboot(),
        };
        result.map_err(|source| ServiceError::Session { service, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::error::ClientError;
    use crate::testing::{FakeConnector, FakeRouter};

    fn session(host: &str, router: Arc<FakeRouter>) -> Arc<RouterSession> {
        let params = RouterConfig::new(host, "admin", "secret").connection_params();
        Arc::new(RouterSession::initialize(
            &FakeConnector::new(router),
            params,
            &[],
        ))
    }

    #[test]
    fn registry() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty());
        let router = Arc::new(FakeRouter::fritzbox_7590());
        assert!(registry
            .insert("entry-1", session("fritz.box", router.clone()))
            .is_none());
        registry.insert("entry-2", session("192.168.179.1", router));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("entry-1").unwrap().host(), "fritz.box");
        assert_eq!(registry.by_host("FRITZ.box").unwrap().host(), "fritz.box");
        assert!(registry.by_host("10.0.0.1").is_none());

        assert!(registry.remove("entry-1").is_some());
        assert!(registry.get("entry-1").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn service_names() {
        assert_eq!(Service::from_name("reboot"), Some(Service::Reboot));
        assert_eq!(Service::from_name("reconnect"), Some(Service::Reconnect));
        assert_eq!(Service::from_name("restart"), None);
    }

    #[tracing_test::traced_test]
    #[test]
    fn services() {
        let router = Arc::new(FakeRouter::fritzbox_7590());
        let registry = SessionRegistry::new();
        registry.insert("entry-1", session("fritz.box", router.clone()));

        let reconnect = ServiceCall {
            service: Service::Reconnect,
            host: "fritz.box".to_string(),
        };
        registry.call_service(&reconnect).unwrap();
        assert_eq!(router.reconnects(), 1);

        let reboot = ServiceCall {
            service: Service::Reboot,
            host: "fritz.box".to_string(),
        };
        registry.call_service(&reboot).unwrap();
        assert_eq!(router.count("Reboot"), 1);

        let unknown = ServiceCall {
            service: Service::Reboot,
            host: "10.0.0.1".to_string(),
        };
        let err = registry.call_service(&unknown).unwrap_err();
        assert!(matches!(err, ServiceError::UnknownHost { service: "reboot", .. }));
        assert!(err.to_string().starts_with("reboot:"));
        assert!(logs_contain("no configured router"));

        router.fail("ForceTermination", ClientError::Action("busy".to_string()));
        let err = registry.call_service(&reconnect).unwrap_err();
        assert!(matches!(err, ServiceError::Session { service: "reconnect", .. }));
    }
}
