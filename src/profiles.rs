use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};

use crate::client::{Profile, ProfileClient, ProfileDevice};
use crate::error::{ClientResult, Error, Result};

/// Refreshing takes three round trips to the router's web interface, so it is
/// not done more often than this.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::seconds(5);

const NEVER: i64 = i64::MIN;

/// Profiles and devices as last loaded from the router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSnapshot {
    pub profiles: Vec<Profile>,
    pub devices: Vec<ProfileDevice>,
}

impl ProfileSnapshot {
    pub fn profile_id(&self, name: &str) -> Option<&str> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.id.as_str())
    }

    pub fn device(&self, hostname: &str) -> Option<&ProfileDevice> {
        self.devices.iter().find(|d| d.name == hostname)
    }

    /// Hostnames that are used by more than one device, sorted.
    pub fn duplicate_hostnames(&self) -> Vec<String> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for device in &self.devices {
            *counts.entry(device.name.as_str()).or_default() += 1;
        }
        counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// The snapshot was recent enough, or another caller is refreshing it.
    Fresh,
    Refreshed,
}

/// Rate limited cache of the profile data of one profile group.
pub struct ProfileCache {
    group: String,
    client: Arc<dyn ProfileClient>,
    snapshot: RwLock<Arc<ProfileSnapshot>>,
    /// Milliseconds since the epoch of the last refresh attempt.
    last_refresh: AtomicI64,
}

impl ProfileCache {
    pub fn new(group: impl ToString, client: Arc<dyn ProfileClient>) -> Self {
        Self {
            group: group.to_string(),
            client,
            snapshot: RwLock::new(Arc::new(ProfileSnapshot::default())),
            last_refresh: AtomicI64::new(NEVER),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn client(&self) -> &Arc<dyn ProfileClient> {
        &self.client
    }

    pub fn snapshot(&self) -> Arc<ProfileSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        match self.last_refresh.load(Ordering::Acquire) {
            NEVER => None,
            ms => DateTime::<Utc>::from_timestamp_millis(ms),
        }
    }

    /// Reloads the snapshot unless it was refreshed less than `min_interval`
    /// before `now`. The caller that wins the timestamp swap does the fetch,
    /// concurrent callers keep using the current snapshot.
    ///
    /// On failure the previous snapshot stays in place and
    /// [`Error::StaleSnapshot`] is returned. The next attempt waits for
    /// `min_interval` all the same.
    pub fn refresh_if_stale(&self, now: DateTime<Utc>, min_interval: Duration) -> Result<Refresh> {
        let now_ms = now.timestamp_millis();
        let last = self.last_refresh.load(Ordering::Acquire);
        if last != NEVER && now_ms.saturating_sub(last) < min_interval.num_milliseconds() {
            return Ok(Refresh::Fresh);
        }
        if self
            .last_refresh
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("profiles of {:?} are being refreshed already", self.group);
            return Ok(Refresh::Fresh);
        }

        debug!("refreshing profiles of {:?}", self.group);
        match self.fetch() {
            Ok(snapshot) => {
                *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
                Ok(Refresh::Refreshed)
            }
            Err(err) => {
                // the failed attempt counts against the interval
                warn!("refreshing profiles of {:?} failed: {err}", self.group);
                Err(Error::StaleSnapshot(err.to_string()))
            }
        }
    }

    fn fetch(&self) -> ClientResult<ProfileSnapshot> {
        self.client.fetch_profiles()?;
        self.client.fetch_devices()?;
        self.client.fetch_device_profiles()?;
        Ok(ProfileSnapshot {
            profiles: self.client.profiles(),
            devices: self.client.devices(),
        })
    }
}

impl std::fmt::Debug for ProfileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileCache")
            .field("group", &self.group)
            .field("last_refresh", &self.last_refresh())
            .finish()
    }
}
