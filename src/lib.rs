//! Exposes the administrative functions of an AVM FRITZ!Box (connectivity,
//! guest wifi, port forwards, call deflections, device network profiles) as
//! entities of a smart home hub.
//!
//! The router protocol itself is not implemented here. Hosts plug in a
//! [`Connector`] that builds [`RouterClient`]s and [`ProfileClient`]s.
//!
//! ## Example
//!
//! ```ignore
//! let config = fritzbox_tools::Config::from_yaml_file("fritzbox.yaml")?;
//! let registry = fritzbox_tools::SessionRegistry::new();
//! let executor = fritzbox_tools::Executor::default();
//! let entries = fritzbox_tools::setup(
//!     &my_connector,
//!     &config,
//!     &registry,
//!     std::sync::Arc::new(fritzbox_tools::SystemClock),
//!     &executor,
//! );
//! for switch in &mut entries[0].switches {
//!     switch.update().await;
//! }
//! ```

#[macro_use]
extern crate tracing;

pub mod capabilities;
pub mod client;
pub mod clock;
mod config;
pub mod deflection;
pub mod discovery;
pub mod duration;
pub mod entity;
mod error;
mod executor;
pub mod profiles;
pub mod registry;
pub mod resource;
pub mod session;
mod setup;
pub mod toggle;

#[cfg(test)]
mod testing;

pub use capabilities::{Capability, CapabilitySet};
pub use client::{ArgValue, Arguments, ConnectionParams, Connector, ProfileClient, RouterClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::*;
pub use discovery::{discover, Diagnostic, Discovery};
pub use entity::{ConnectivitySensor, DeviceInfo, SwitchEntity};
pub use error::{
    ClientError, ClientResult, ConfigError, Error, ErrorKind, Result, ServiceError,
};
pub use executor::{Executor, JobHandle};
pub use profiles::{ProfileCache, ProfileSnapshot};
pub use registry::{Service, ServiceCall, SessionRegistry};
pub use resource::{Resource, ResourceKey, ResourceKind};
pub use session::{ConnectionHealth, RouterIdentity, RouterSession};
pub use setup::{setup, setup_router, RouterEntry};
pub use toggle::{ResourceStatus, ToggleCoordinator, ToggleState};
