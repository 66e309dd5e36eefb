//! The permission gate: local predicates plus a cached remote check.
//!
//! Synchronous predicates read the locally held [`PermissionSet`]. When a
//! decision can't be made locally, [`PermissionGate::check_permission`]
//! asks the server and caches the answer for the configured TTL.
//!
//! Every identity change, reload or explicit cache clear bumps a
//! generation counter. A remote check only writes its answer to the cache
//! if the generation is unchanged since the request was sent, so a check
//! that resolves after a reload can't re-populate the cleared cache with
//! a decision computed for the old permission list.
//!
//! Replacing the permission set bumps a separate identity epoch. A reload
//! only installs the list it fetched if no identity change happened while
//! the request was in flight, so a logout can't be undone by a slow reload.

use crate::cache::{CacheStats, PermissionCache};
use crate::client::PermissionClient;
use crate::config::GateConfig;
use crate::credentials::CredentialSource;
use crate::error::{GateError, Result};
use crate::permission::{build_permission, GateDecision, PermissionSet, Requirement};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Outcome of [`PermissionGate::check_permission`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub allowed: bool,
    /// Why access was denied, when known.
    pub reason: Option<String>,
    /// Answered from the cache without a round-trip.
    pub cached: bool,
}

impl CheckResult {
    fn from_cache(allowed: bool) -> Self {
        Self {
            allowed,
            reason: None,
            cached: true,
        }
    }

    fn denied(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            cached: false,
        }
    }
}

/// Marks a reload in flight for as long as it lives.
struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Authorization decisions for the current user.
pub struct PermissionGate {
    client: PermissionClient,
    permissions: RwLock<PermissionSet>,
    cache: Mutex<PermissionCache>,
    /// Bumped, under the cache lock, whenever cached decisions become invalid.
    generation: AtomicU64,
    /// Bumped, under the cache lock, whenever the permission set is replaced.
    identity_epoch: AtomicU64,
    reloads_in_flight: AtomicUsize,
    last_error: RwLock<Option<String>>,
}

impl PermissionGate {
    /// Create a gate with an empty permission set.
    pub fn new(config: &GateConfig, credentials: Arc<dyn CredentialSource>) -> Result<Self> {
        let client = PermissionClient::new(config, credentials)?;
        Ok(Self {
            client,
            permissions: RwLock::new(PermissionSet::new()),
            cache: Mutex::new(PermissionCache::new(config.cache_capacity, config.cache_ttl)),
            generation: AtomicU64::new(0),
            identity_epoch: AtomicU64::new(0),
            reloads_in_flight: AtomicUsize::new(0),
            last_error: RwLock::new(None),
        })
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.read().has(permission)
    }

    pub fn has_any_permission<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        self.permissions.read().has_any(permissions)
    }

    pub fn has_all_permissions<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        self.permissions.read().has_all(permissions)
    }

    pub fn evaluate(&self, requirement: &Requirement) -> bool {
        requirement.evaluate(&self.permissions.read())
    }

    /// What a conditional-rendering wrapper should show.
    pub fn decide(&self, requirement: &Requirement) -> GateDecision {
        if self.is_loading() {
            GateDecision::Loading
        } else if self.evaluate(requirement) {
            GateDecision::Allow
        } else {
            GateDecision::Deny
        }
    }

    /// Sorted snapshot of the current permissions.
    pub fn permissions(&self) -> Vec<String> {
        self.permissions.read().to_sorted_vec()
    }

    pub fn is_loading(&self) -> bool {
        self.reloads_in_flight.load(Ordering::SeqCst) > 0
    }

    /// Message from the most recent failed reload, cleared by a successful one.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Ask the server whether `action` on `resource` is allowed.
    ///
    /// Never fails: transport, status and credential errors come back as
    /// a denial with a reason and leave the cache untouched.
    pub async fn check_permission(&self, resource: &str, action: &str) -> CheckResult {
        let key = build_permission(resource, action);

        let cached = self.cache.lock().get(&key);
        if let Some(allowed) = cached {
            return CheckResult::from_cache(allowed);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        match self.client.check(resource, action).await {
            Ok(decision) => {
                self.record(&key, decision.allowed, generation);
                CheckResult {
                    allowed: decision.allowed,
                    reason: decision.reason,
                    cached: false,
                }
            }
            Err(e) => {
                warn!("Permission check for {} failed: {}", key, e);
                CheckResult::denied(e.to_string())
            }
        }
    }

    /// Cache a remote decision unless the permission epoch moved on.
    fn record(&self, key: &str, allowed: bool, generation: u64) -> bool {
        let mut cache = self.cache.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Discarding stale decision for {} (generation {})", key, generation);
            return false;
        }
        cache.insert(key, allowed);
        true
    }

    /// Re-fetch the user's permissions and drop every cached decision.
    ///
    /// On failure the previous permission set stays in place and the error
    /// is also exposed through [`last_error`](Self::last_error). If the
    /// identity changes while the request is in flight the response belongs
    /// to the previous identity; it is dropped and
    /// [`GateError::ReloadSuperseded`] is returned.
    pub async fn reload(&self) -> Result<()> {
        let _loading = LoadingGuard::enter(&self.reloads_in_flight);
        let epoch = self.identity_epoch.load(Ordering::SeqCst);

        match self.client.me().await {
            Ok(user) => {
                let count = user.permissions.len();
                if !self.replace_permissions(user.permissions.into_iter().collect(), Some(epoch)) {
                    debug!("Discarding reload result from identity epoch {}", epoch);
                    return Err(GateError::ReloadSuperseded);
                }
                *self.last_error.write() = None;
                info!("Reloaded {} permissions", count);
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                warn!("Permission reload failed: {}", message);
                *self.last_error.write() = Some(message);
                Err(GateError::ReloadFailed(Box::new(e)))
            }
        }
    }

    /// Replace the permission set after an identity change.
    pub fn set_permissions<I, S>(&self, permissions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: PermissionSet = permissions.into_iter().collect();
        debug!("Identity changed, {} permissions", set.len());
        self.replace_permissions(set, None);
    }

    /// Swap in `set` and drop every cached decision, as one step under the
    /// cache lock. With `expected_epoch`, nothing happens unless the
    /// identity epoch still matches.
    fn replace_permissions(&self, set: PermissionSet, expected_epoch: Option<u64>) -> bool {
        let mut cache = self.cache.lock();
        if let Some(epoch) = expected_epoch {
            if self.identity_epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
        }
        *self.permissions.write() = set;
        self.identity_epoch.fetch_add(1, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        cache.clear();
        true
    }

    /// Forget the current identity (logout).
    pub fn clear_identity(&self) {
        self.set_permissions(std::iter::empty::<String>());
    }

    /// Apply every permission list published on `identity`.
    ///
    /// The current value is applied immediately. The task ends when the
    /// sender is dropped.
    pub fn watch_identity(
        self: &Arc<Self>,
        mut identity: watch::Receiver<Vec<String>>,
    ) -> JoinHandle<()> {
        let gate = Arc::clone(self);
        tokio::spawn(async move {
            let initial = identity.borrow_and_update().clone();
            gate.set_permissions(initial);
            while identity.changed().await.is_ok() {
                let permissions = identity.borrow_and_update().clone();
                gate.set_permissions(permissions);
            }
            debug!("Identity source closed");
        })
    }

    /// Drop every cached decision and invalidate in-flight checks.
    pub fn clear_cache(&self) {
        let mut cache = self.cache.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        cache.clear();
    }

    /// Drop the cached decision for one `resource:action` pair.
    pub fn invalidate(&self, resource: &str, action: &str) -> bool {
        self.cache.lock().remove(&build_permission(resource, action))
    }

    /// Drop stale cache entries. Returns the number removed.
    pub fn prune_expired(&self) -> usize {
        self.cache.lock().prune_expired()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    pub fn client(&self) -> &PermissionClient {
        &self.client
    }
}
