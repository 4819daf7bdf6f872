//! Contracts of the protocol clients this crate drives.
//!
//! The TR-064 transport and the profile web interface are implemented
//! elsewhere; a host hands in a [`Connector`] that knows how to build them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Duration;

use crate::error::ClientResult;

/// A single argument or result value of a router action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ArgValue::Int(n) => Some(*n),
            ArgValue::Str(s) => s.trim().parse().ok(),
            ArgValue::Bool(_) => None,
        }
    }

    /// Interprets the value as an on/off flag. The router answers with
    /// `"1"`/`"0"` strings, integers or booleans depending on the action and
    /// the client library version.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            ArgValue::Int(n) => Some(*n != 0),
            ArgValue::Str(s) => match s.trim() {
                "1" | "true" | "True" => Some(true),
                "0" | "false" | "False" | "" => Some(false),
                _ => None,
            },
        }
    }

    /// Returns `on` encoded the same way this value encodes its flag.
    pub fn with_flag(&self, on: bool) -> ArgValue {
        match self {
            ArgValue::Bool(_) => ArgValue::Bool(on),
            ArgValue::Int(_) => ArgValue::Int(i64::from(on)),
            ArgValue::Str(_) => ArgValue::flag(on),
        }
    }

    pub fn flag(on: bool) -> ArgValue {
        ArgValue::Str(if on { "1" } else { "0" }.to_string())
    }
}

impl std::fmt::Display for ArgValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgValue::Str(s) => write!(f, "{s}"),
            ArgValue::Int(n) => write!(f, "{n}"),
            ArgValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::Str(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::Str(s)
    }
}

impl From<i64> for ArgValue {
    fn from(n: i64) -> Self {
        ArgValue::Int(n)
    }
}

impl From<u32> for ArgValue {
    fn from(n: u32) -> Self {
        ArgValue::Int(i64::from(n))
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Bool(b)
    }
}

/// Named arguments of an action call, and the named values it returns.
pub type Arguments = BTreeMap<String, ArgValue>;

/// Builds [`Arguments`] from `(name, value)` pairs.
pub fn args<I, K, V>(pairs: I) -> Arguments
where
    I: IntoIterator<Item = (K, V)>,
    K: ToString,
    V: Into<ArgValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.into()))
        .collect()
}

/// The TR-064 service/action interface of the router.
pub trait RouterClient: Send + Sync {
    fn call_action(&self, service: &str, action: &str, args: &Arguments)
        -> ClientResult<Arguments>;

    /// Forces a new WAN connection.
    fn reconnect(&self) -> ClientResult<()>;

    /// Service names (e.g. `WLANConfiguration:3`) the router advertises.
    fn services(&self) -> BTreeSet<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDevice {
    /// Hostname as shown in the router's network overview.
    pub name: String,
    /// Id of the assigned profile.
    pub profile: String,
    /// Router internal device id, needed to change the assignment.
    pub id1: String,
}

/// Session against the router's web interface that manages device network
/// profiles. The `fetch_*` calls load data into the client, the getters read
/// what was loaded last.
pub trait ProfileClient: Send + Sync {
    fn fetch_profiles(&self) -> ClientResult<()>;
    fn fetch_devices(&self) -> ClientResult<()>;
    fn fetch_device_profiles(&self) -> ClientResult<()>;
    fn profiles(&self) -> Vec<Profile>;
    fn devices(&self) -> Vec<ProfileDevice>;
    /// Assigns profiles, given as `(device id, profile id)` pairs.
    fn set_profiles(&self, assignments: &[(String, String)]) -> ClientResult<()>;
}

/// Everything needed to open a connection to the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Applies to every single request. Some router actions take many
    /// seconds to answer.
    pub timeout: Duration,
}

impl ConnectionParams {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.host)
    }
}

/// Constructs protocol clients. Both calls block and may talk to the router.
pub trait Connector: Send + Sync {
    fn connect(&self, params: &ConnectionParams) -> ClientResult<Arc<dyn RouterClient>>;

    fn connect_profiles(
        &self,
        params: &ConnectionParams,
        group: &str,
    ) -> ClientResult<Arc<dyn ProfileClient>>;
}
