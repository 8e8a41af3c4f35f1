//! Ownership Arbiter
//!
//! Sole gatekeeper of the single automation-controlled runtime. Grants,
//! denies, and force-transfers exclusive leases between internal clients.
//! Every lease mutation, including the out-of-band runtime-exit path,
//! serializes through one async mutex so concurrent acquire/release calls
//! never interleave.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::application::lifecycle::RuntimeLifecycle;
use crate::domain::errors::DomainResult;
use crate::domain::models::{LeaseHolder, LeaseTransition};

/// Capacity of the transition broadcast channel.
const TRANSITION_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct LeaseState {
    owner: Option<LeaseHolder>,
    held_since: Option<DateTime<Utc>>,
}

/// Arbiter over the exclusive runtime lease.
///
/// Constructed once and shared by reference with every requester; tests run
/// several instances in-process.
pub struct OwnershipArbiter {
    lifecycle: Arc<RuntimeLifecycle>,
    state: Mutex<LeaseState>,
    transitions: broadcast::Sender<LeaseTransition>,
}

impl OwnershipArbiter {
    pub fn new(lifecycle: Arc<RuntimeLifecycle>) -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        Self {
            lifecycle,
            state: Mutex::new(LeaseState::default()),
            transitions,
        }
    }

    /// Subscribe to ownership transitions. Delivery order matches the order
    /// of state transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<LeaseTransition> {
        self.transitions.subscribe()
    }

    /// Spawn the monitor task that folds out-of-band runtime exits into the
    /// lease state. Must be called once after construction when the arbiter
    /// is shared.
    pub fn spawn_exit_monitor(self: &Arc<Self>) {
        let arbiter = Arc::clone(self);
        let mut exits = self.lifecycle.subscribe_exits();
        tokio::spawn(async move {
            loop {
                match exits.recv().await {
                    Ok(handle_id) => {
                        debug!(%handle_id, "runtime exit observed");
                        arbiter.handle_runtime_exit().await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "exit notifications lagged, re-validating lease");
                        arbiter.handle_runtime_exit().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Try to take the lease for `requester`.
    ///
    /// - The current owner re-validates liveness; a runtime that died without
    ///   an explicit release is relaunched transparently and the lease
    ///   re-granted.
    /// - A non-owner is denied while another client holds the lease, unless
    ///   `force_release` is set, in which case the holder is released and its
    ///   runtime torn down before the new grant.
    /// - A launch failure leaves the lease vacant and returns `false`; the
    ///   arbiter never retries on its own.
    #[instrument(skip(self))]
    pub async fn acquire(
        &self,
        requester: LeaseHolder,
        headless: bool,
        force_release: bool,
    ) -> DomainResult<bool> {
        let mut state = self.state.lock().await;

        match state.owner {
            Some(owner) if owner == requester => {
                if self.lifecycle.is_alive().await {
                    debug!(%requester, "re-acquire by current owner, runtime live");
                    return Ok(true);
                }
                info!(%requester, "owner's runtime died without release, relaunching");
                match self.lifecycle.launch(headless).await {
                    Ok(_) => Ok(true),
                    Err(err) => {
                        error!(%requester, error = %err, "relaunch failed, vacating lease");
                        self.transition(&mut state, None);
                        Ok(false)
                    }
                }
            }
            Some(owner) => {
                if !force_release {
                    info!(%requester, holder = %owner, "lease denied, already held");
                    return Ok(false);
                }
                info!(%requester, evicted = %owner, "forcing lease release");
                self.lifecycle.close().await;
                self.transition(&mut state, None);
                self.grant(&mut state, requester, headless).await
            }
            None => self.grant(&mut state, requester, headless).await,
        }
    }

    /// Release the lease held by `requester`. A release by a non-owner is a
    /// logged no-op.
    #[instrument(skip(self))]
    pub async fn release(&self, requester: LeaseHolder) {
        let mut state = self.state.lock().await;
        match state.owner {
            Some(owner) if owner == requester => {
                info!(%requester, "releasing lease");
                self.lifecycle.close().await;
                self.transition(&mut state, None);
            }
            Some(owner) => {
                warn!(%requester, holder = %owner, "release ignored, not the owner");
            }
            None => {
                warn!(%requester, "release ignored, lease is vacant");
            }
        }
    }

    /// Release whoever holds the lease and tear the runtime down.
    #[instrument(skip(self))]
    pub async fn force_release_all(&self) {
        let mut state = self.state.lock().await;
        if let Some(owner) = state.owner {
            info!(evicted = %owner, "force-releasing lease");
        }
        self.lifecycle.close().await;
        if state.owner.is_some() {
            self.transition(&mut state, None);
        }
    }

    /// Whether `requester` could acquire the lease right now without forcing.
    pub async fn is_available_to(&self, requester: LeaseHolder) -> bool {
        let state = self.state.lock().await;
        state.owner.is_none() || state.owner == Some(requester)
    }

    /// Current owner, if any.
    pub async fn current_owner(&self) -> Option<LeaseHolder> {
        self.state.lock().await.owner
    }

    /// When the current lease was granted.
    pub async fn held_since(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.held_since
    }

    /// Fold an out-of-band runtime exit into the lease state.
    ///
    /// Runs under the same gate as `acquire`/`release`, so it cannot race an
    /// in-flight acquire: either the acquire completes first and this vacates
    /// the now-dead lease, or this runs first and the acquire finds the lease
    /// vacant. This is the only path that reverts ownership without an
    /// explicit request.
    pub async fn handle_runtime_exit(&self) {
        let mut state = self.state.lock().await;
        let Some(owner) = state.owner else { return };
        if self.lifecycle.is_alive().await {
            // A newer process is already live (e.g. relaunched under this
            // same gate before the notification drained).
            debug!("stale exit notification, runtime is live");
            return;
        }
        warn!(%owner, "runtime closed externally, vacating lease");
        self.lifecycle.close().await;
        self.transition(&mut state, None);
    }

    async fn grant(
        &self,
        state: &mut LeaseState,
        requester: LeaseHolder,
        headless: bool,
    ) -> DomainResult<bool> {
        match self.lifecycle.launch(headless).await {
            Ok(handle) => {
                info!(%requester, %handle, "lease granted");
                self.transition(state, Some(requester));
                Ok(true)
            }
            Err(err) => {
                error!(%requester, error = %err, "launch failed, lease stays vacant");
                Ok(false)
            }
        }
    }

    /// Apply and publish an ownership transition.
    fn transition(&self, state: &mut LeaseState, next: Option<LeaseHolder>) {
        let previous = state.owner;
        state.owner = next;
        state.held_since = next.map(|_| Utc::now());
        let _ = self.transitions.send(LeaseTransition::new(previous, next));
    }
}

impl std::fmt::Debug for OwnershipArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnershipArbiter").finish_non_exhaustive()
    }
}
