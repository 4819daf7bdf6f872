use std::sync::Arc;

use crate::client::Connector;
use crate::clock::Clock;
use crate::config::{Config, RouterConfig};
use crate::discovery::{discover, Diagnostic};
use crate::entity::{ConnectivitySensor, SwitchEntity};
use crate::executor::Executor;
use crate::registry::SessionRegistry;
use crate::session::RouterSession;
use crate::toggle::ToggleCoordinator;

/// Everything set up for one configured router.
#[derive(Debug)]
pub struct RouterEntry {
    pub entry_id: String,
    pub session: Arc<RouterSession>,
    pub coordinator: Arc<ToggleCoordinator>,
    pub sensor: Option<ConnectivitySensor>,
    pub switches: Vec<SwitchEntity>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Connects to the router of `config` and creates its entities. Blocks
/// while talking to the router. Never fails, problems end up in
/// [`RouterEntry::diagnostics`].
pub fn setup_router(
    entry_id: impl ToString,
    connector: &dyn Connector,
    config: &RouterConfig,
    clock: Arc<dyn Clock>,
    executor: &Executor,
) -> RouterEntry {
    let groups = if config.profiles_enabled() {
        config.profiles.clone()
    } else {
        Vec::new()
    };
    let session = Arc::new(RouterSession::initialize(
        connector,
        config.connection_params(),
        &groups,
    ));
    let discovery = discover(&session, config, clock.now());
    let coordinator = Arc::new(ToggleCoordinator::new(session.clone(), clock));

    let mut entry = RouterEntry {
        entry_id: entry_id.to_string(),
        session: session.clone(),
        coordinator: coordinator.clone(),
        sensor: None,
        switches: Vec::new(),
        diagnostics: discovery.diagnostics,
    };
    if !session.health_status().0 {
        return entry;
    }

    match ConnectivitySensor::new(session, executor.clone()) {
        Ok(sensor) => entry.sensor = Some(sensor),
        Err(err) => warn!("no connectivity sensor for {}: {err}", config.host),
    }
    for resource in &discovery.resources {
        match SwitchEntity::new(resource, coordinator.clone(), executor.clone()) {
            Ok(switch) => entry.switches.push(switch),
            Err(err) => warn!("no switch for {}: {err}", resource.key),
        }
    }
    info!(
        "{}: {} switches, {} diagnostics",
        config.host,
        entry.switches.len(),
        entry.diagnostics.len()
    );
    entry
}

/// Sets up every router of `config` and registers its session under the
/// router's host.
pub fn setup(
    connector: &dyn Connector,
    config: &Config,
    registry: &SessionRegistry,
    clock: Arc<dyn Clock>,
    executor: &Executor,
) -> Vec<RouterEntry> {
    config
        .routers
        .iter()
        .map(|router| {
            let entry = setup_router(&router.host, connector, router, clock.clone(), executor);
            registry.insert(&entry.entry_id, entry.session.clone());
            entry
        })
        .collect()
}
